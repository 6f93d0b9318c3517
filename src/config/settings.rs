use super::paths::{default_state_root_path, DEFAULT_DATABASE_FILE_NAME};
use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub data_root: PathBuf,
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub state_root: Option<PathBuf>,
    #[serde(default)]
    pub worker_service: Option<WorkerServiceConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerServiceConfig {
    pub url: String,
    #[serde(default = "default_worker_timeout_ms")]
    pub timeout_ms: u64,
}

impl WorkerServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_worker_timeout_ms() -> u64 {
    5_000
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.data_root.is_absolute() {
            return Err(ConfigError::Settings(
                "`data_root` must be an absolute path".to_string(),
            ));
        }
        if let Some(path) = &self.database_path {
            if !path.is_absolute() {
                return Err(ConfigError::Settings(
                    "`database_path` must be an absolute path".to_string(),
                ));
            }
        }
        if let Some(path) = &self.state_root {
            if !path.is_absolute() {
                return Err(ConfigError::Settings(
                    "`state_root` must be an absolute path".to_string(),
                ));
            }
        }
        if let Some(worker) = &self.worker_service {
            let url = worker.url.trim();
            if url.is_empty() {
                return Err(ConfigError::Settings(
                    "`worker_service.url` must be non-empty".to_string(),
                ));
            }
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Settings(format!(
                    "`worker_service.url` must be an http(s) url, got `{url}`"
                )));
            }
            if worker.timeout_ms == 0 {
                return Err(ConfigError::Settings(
                    "`worker_service.timeout_ms` must be greater than zero".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn resolve_database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.data_root.join(DEFAULT_DATABASE_FILE_NAME))
    }

    pub fn resolve_state_root(&self) -> Result<PathBuf, ConfigError> {
        match &self.state_root {
            Some(path) => Ok(path.clone()),
            None => default_state_root_path(),
        }
    }
}
