use chrono::Local;
use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

const APP_NAME: &str = "wingman";
const PLOVER_CONFIG_FILE: &str = "plover_websocket_server_config.json";

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    pub fn config_dir() -> PathBuf {
        ProjectDirs::from("", "", APP_NAME)
            .map(|pd| pd.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// `$HOME/.local/state/wingman` when `HOME` is set.
    pub fn state_dir() -> PathBuf {
        if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".local")
                .join("state")
                .join(APP_NAME)
        } else {
            ProjectDirs::from("", "", APP_NAME)
                .map(|pd| pd.data_local_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."))
        }
    }

    pub fn settings_path() -> PathBuf {
        Self::config_dir().join("settings.json")
    }

    pub fn history_path() -> PathBuf {
        Self::state_dir().join("results.log")
    }

    /// Fresh log file per run.
    pub fn log_path() -> PathBuf {
        Self::state_dir()
            .join("logs")
            .join(format!("log_{}.txt", Local::now().format("%Y%m%d_%H%M%S")))
    }

    pub fn plover_dir() -> Option<PathBuf> {
        if cfg!(windows) {
            BaseDirs::new().map(|b| b.data_local_dir().join("plover").join("plover"))
        } else {
            ProjectDirs::from("", "", "plover").map(|pd| pd.config_dir().to_path_buf())
        }
    }

    pub fn plover_config_path() -> Option<PathBuf> {
        Self::plover_dir().map(|d| d.join(PLOVER_CONFIG_FILE))
    }
}
