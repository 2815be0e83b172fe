//! Keystroke cadence heuristic.
//!
//! Flags typing rhythm that departs sharply from the typist's own recent
//! baseline. This is an advisory signal for a human reviewer; none of the
//! thresholds are validated against ground truth, so they all live in
//! [`CadenceConfig`].

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::util::{mean, median, std_dev};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum KeyKind {
    Char,
    Backspace,
    Delete,
    Enter,
    Modifier,
    Other,
}

impl KeyKind {
    pub fn is_text_producing(&self) -> bool {
        matches!(self, KeyKind::Char | KeyKind::Backspace | KeyKind::Delete)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistic {
    Mean,
    Median,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CadenceConfig {
    /// Number of inter-key intervals kept.
    pub window: usize,
    /// Intervals needed before anything is classified.
    pub min_samples: usize,
    pub statistic: Statistic,
    pub spike_factor: f64,
    pub spike_floor_ms: f64,
    pub rush_divisor: f64,
    /// Rushes only count when the baseline itself is slower than this.
    pub rush_baseline_ms: f64,
    pub consecutive_required: u32,
    pub cooldown: Duration,
    pub text_keys_only: bool,
}

impl CadenceConfig {
    pub fn simple() -> Self {
        Self {
            window: 8,
            min_samples: 6,
            statistic: Statistic::Mean,
            spike_factor: 3.0,
            spike_floor_ms: 1200.0,
            rush_divisor: 3.0,
            rush_baseline_ms: 120.0,
            consecutive_required: 1,
            cooldown: Duration::from_secs(15),
            text_keys_only: false,
        }
    }

    pub fn dashboard() -> Self {
        Self {
            window: 12,
            min_samples: 12,
            statistic: Statistic::Median,
            spike_factor: 4.0,
            spike_floor_ms: 2000.0,
            rush_divisor: 4.0,
            rush_baseline_ms: 200.0,
            consecutive_required: 2,
            cooldown: Duration::from_secs(30),
            text_keys_only: true,
        }
    }
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self::dashboard()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Anomaly {
    Spike,
    Rush,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CadenceSignal {
    Arrhythmic {
        kind: Anomaly,
        interval_ms: f64,
        baseline_ms: f64,
    },
    /// Emitted once per window's worth of fresh intervals.
    Summary {
        median_ms: f64,
        mean_ms: f64,
        std_dev_ms: f64,
        samples: usize,
    },
}

#[derive(Debug)]
pub struct CadenceMonitor {
    config: CadenceConfig,
    intervals: VecDeque<f64>,
    last_key: Option<Instant>,
    streak: u32,
    last_report: Option<Instant>,
    fresh: usize,
}

impl CadenceMonitor {
    pub fn new(config: CadenceConfig) -> Self {
        let window = config.window.max(1);
        Self {
            config: CadenceConfig {
                window,
                min_samples: config.min_samples.clamp(1, window),
                ..config
            },
            intervals: VecDeque::with_capacity(window),
            last_key: None,
            streak: 0,
            last_report: None,
            fresh: 0,
        }
    }

    pub fn config(&self) -> &CadenceConfig {
        &self.config
    }

    /// Feed one key-down. Returns any signals the key produced, in order.
    pub fn observe(&mut self, kind: KeyKind, at: Instant) -> Vec<CadenceSignal> {
        if kind == KeyKind::Modifier {
            return Vec::new();
        }
        if self.config.text_keys_only && !kind.is_text_producing() {
            return Vec::new();
        }

        let mut signals = Vec::new();
        if let Some(last) = self.last_key {
            let interval_ms = at.saturating_duration_since(last).as_micros() as f64 / 1000.0;

            self.intervals.push_back(interval_ms);
            if self.intervals.len() > self.config.window {
                self.intervals.pop_front();
            }

            // The baseline includes the interval being classified.
            if self.intervals.len() >= self.config.min_samples {
                if let Some(signal) = self.classify(interval_ms, at) {
                    signals.push(signal);
                }
            }
            self.fresh += 1;

            if self.fresh >= self.config.window && self.intervals.len() == self.config.window {
                self.fresh = 0;
                signals.push(self.summary());
            }
        }
        self.last_key = Some(at);
        signals
    }

    fn baseline(&self) -> Option<f64> {
        let (a, b) = self.intervals.as_slices();
        let data = [a, b].concat();
        match self.config.statistic {
            Statistic::Mean => mean(&data),
            Statistic::Median => median(&data),
        }
    }

    fn classify(&mut self, interval_ms: f64, at: Instant) -> Option<CadenceSignal> {
        let baseline_ms = self.baseline()?;
        let cfg = &self.config;

        let spike =
            interval_ms > baseline_ms * cfg.spike_factor && interval_ms > cfg.spike_floor_ms;
        let rush =
            interval_ms < baseline_ms / cfg.rush_divisor && baseline_ms > cfg.rush_baseline_ms;
        let kind = if spike {
            Some(Anomaly::Spike)
        } else if rush {
            Some(Anomaly::Rush)
        } else {
            None
        };

        let Some(kind) = kind else {
            self.streak = 0;
            return None;
        };

        self.streak += 1;
        if self.streak < cfg.consecutive_required {
            return None;
        }
        let cooled = self
            .last_report
            .map_or(true, |prev| at.saturating_duration_since(prev) >= cfg.cooldown);
        if !cooled {
            return None;
        }

        self.streak = 0;
        self.last_report = Some(at);
        Some(CadenceSignal::Arrhythmic {
            kind,
            interval_ms,
            baseline_ms,
        })
    }

    fn summary(&self) -> CadenceSignal {
        let (a, b) = self.intervals.as_slices();
        let data = [a, b].concat();
        CadenceSignal::Summary {
            median_ms: median(&data).unwrap_or_default(),
            mean_ms: mean(&data).unwrap_or_default(),
            std_dev_ms: std_dev(&data).unwrap_or_default(),
            samples: data.len(),
        }
    }
}
