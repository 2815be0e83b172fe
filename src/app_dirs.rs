use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "viva").map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// `~/.local/state/viva` when `HOME` is set, else the platform data dir.
    pub fn log_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(
                PathBuf::from(home)
                    .join(".local")
                    .join("state")
                    .join("viva"),
            )
        } else {
            ProjectDirs::from("", "", "viva").map(|dirs| dirs.data_local_dir().join("logs"))
        }
    }
}
