use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::app_dirs::AppDirs;
use crate::rate::RateStrategyKind;
use crate::session::DEFAULT_INACTIVITY_SECS;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("settings i/o: {0}")]
    Io(#[from] io::Error),
    #[error("invalid settings: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Seconds without input before the lesson clock pauses.
    pub inactivity_threshold_secs: f64,
    pub rate_strategy: RateStrategyKind,
    pub use_plover: bool,
    pub plover_config_path: Option<PathBuf>,
    pub dictionary_path: Option<PathBuf>,
    pub smooth_scroll: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            inactivity_threshold_secs: DEFAULT_INACTIVITY_SECS,
            rate_strategy: RateStrategyKind::Gross,
            use_plover: true,
            plover_config_path: None,
            dictionary_path: None,
            smooth_scroll: true,
        }
    }
}

impl Settings {
    pub fn plover_config_path(&self) -> Option<PathBuf> {
        self.plover_config_path
            .clone()
            .or_else(AppDirs::plover_config_path)
    }
}

pub trait ConfigStore {
    fn load(&self) -> Settings;
    fn save(&self, cfg: &Settings) -> Result<(), ConfigError>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            path: AppDirs::settings_path(),
        }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn try_load(&self) -> Result<Settings, ConfigError> {
        let bytes = fs::read(&self.path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Move an unreadable settings file aside as `.old`, `_1.old`, ...
    fn archive(&self) -> io::Result<PathBuf> {
        let mut version = 0;
        let target = loop {
            let suffix = if version == 0 {
                ".old".to_string()
            } else {
                format!("_{version}.old")
            };
            let mut candidate = self.path.clone().into_os_string();
            candidate.push(suffix);
            let candidate = PathBuf::from(candidate);
            if !candidate.exists() {
                break candidate;
            }
            version += 1;
        };
        fs::rename(&self.path, &target)?;
        Ok(target)
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Settings {
        match self.try_load() {
            Ok(cfg) => {
                log::info!("Loaded settings from {:?}", self.path);
                return cfg;
            }
            Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                log::info!("Creating settings file at {:?}", self.path);
            }
            Err(e) => {
                log::error!("Failed to load settings: {e}");
                match self.archive() {
                    Ok(old) => log::info!("Archived old settings file to {old:?}"),
                    Err(e) => log::error!("Failed to archive settings file: {e}"),
                }
            }
        }

        let cfg = Settings::default();
        if let Err(e) = self.save(&cfg) {
            log::error!("Failed to write settings: {e}");
        }
        cfg
    }

    fn save(&self, cfg: &Settings) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}
