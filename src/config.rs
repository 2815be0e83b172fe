use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app_dirs::AppDirs;
use crate::cadence::CadenceConfig;
use crate::protocol::SessionId;

/// What happens when the countdown reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryPolicy {
    /// Input stays open and the send action turns into "Submit".
    #[default]
    SubmitMode,
    /// Lock input, log `viva_end`, navigate to the summary after a grace delay.
    Redirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackVisibility {
    #[default]
    Immediate,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryMode {
    /// One request per event, no response handling.
    Immediate,
    #[default]
    Batched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CadencePreset {
    Simple,
    #[default]
    Dashboard,
}

impl CadencePreset {
    pub fn config(&self) -> CadenceConfig {
        match self {
            CadencePreset::Simple => CadenceConfig::simple(),
            CadencePreset::Dashboard => CadenceConfig::dashboard(),
        }
    }
}

/// Per-category switches for behavioural logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingFlags {
    pub event_tracking: bool,
    pub keystroke_tracking: bool,
    pub arrhythmic_typing: bool,
}

impl Default for TrackingFlags {
    fn default() -> Self {
        Self {
            event_tracking: true,
            keystroke_tracking: false,
            arrhythmic_typing: true,
        }
    }
}

/// Client-side pacing constants, all in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    pub poll_interval_ms: u64,
    pub min_typing_ms: u64,
    pub grace_ms: u64,
    pub flush_delay_ms: u64,
    pub retry_flush_ms: u64,
    pub feedback_delay_ms: u64,
    pub feedback_poll_ms: u64,
    pub feedback_poll_attempts: u32,
    pub shutdown_flush_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 800,
            min_typing_ms: 3000,
            grace_ms: 800,
            flush_delay_ms: 800,
            retry_flush_ms: 1000,
            feedback_delay_ms: 900,
            feedback_poll_ms: 2000,
            feedback_poll_attempts: 10,
            shutdown_flush_ms: 2000,
        }
    }
}

impl Timings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn min_typing(&self) -> Duration {
        Duration::from_millis(self.min_typing_ms)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    pub fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.flush_delay_ms)
    }

    pub fn retry_flush(&self) -> Duration {
        Duration::from_millis(self.retry_flush_ms)
    }

    pub fn feedback_delay(&self) -> Duration {
        Duration::from_millis(self.feedback_delay_ms)
    }

    pub fn feedback_poll(&self) -> Duration {
        Duration::from_millis(self.feedback_poll_ms)
    }

    pub fn shutdown_flush(&self) -> Duration {
        Duration::from_millis(self.shutdown_flush_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub send_path: String,
    /// `{session}` is replaced by the session id.
    pub poll_path: String,
    pub log_path: String,
    pub summary_path: String,
    pub feedback_path: String,
    pub tracking: TrackingFlags,
    pub telemetry_mode: TelemetryMode,
    pub queue_cap: usize,
    pub batch_size: usize,
    pub cadence: CadencePreset,
    pub expiry_policy: ExpiryPolicy,
    pub feedback_visibility: FeedbackVisibility,
    pub allow_early_submit: bool,
    /// Let the examinee stop their own clock with the pause key.
    pub allow_pause: bool,
    pub intro_text: Option<String>,
    pub timings: Timings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            send_path: "/viva/send/".to_string(),
            poll_path: "/viva/session/{session}/?poll=1".to_string(),
            log_path: "/viva/log/".to_string(),
            summary_path: "/viva/summary/{session}/".to_string(),
            feedback_path: "/viva/summary/{session}/?poll=1".to_string(),
            tracking: TrackingFlags::default(),
            telemetry_mode: TelemetryMode::default(),
            queue_cap: 50,
            batch_size: 20,
            cadence: CadencePreset::default(),
            expiry_policy: ExpiryPolicy::default(),
            feedback_visibility: FeedbackVisibility::default(),
            allow_early_submit: false,
            allow_pause: false,
            intro_text: Some(
                "Before we begin: answer in your own words, keep replies concise, \
                 stay focused on your submission."
                    .to_string(),
            ),
            timings: Timings::default(),
        }
    }
}

impl Config {
    /// Join `base_url` with a path template, substituting the session id.
    pub fn endpoint(&self, path: &str, session: &SessionId) -> String {
        let path = path.replace("{session}", session.as_str());
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn summary_url(&self, session: &SessionId) -> String {
        self.endpoint(&self.summary_path, session)
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("viva_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        if let Ok(bytes) = fs::read(&self.path) {
            match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => return cfg,
                Err(err) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %err,
                        "ignoring unreadable config"
                    );
                }
            }
        }
        Config::default()
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).unwrap_or_default();
        fs::write(&self.path, data)
    }
}
