//! Engine configuration, loaded from a mounted YAML file with sane defaults
//! when the file is absent.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Namespace used to resolve secret and configmap references for checks
    /// that do not declare their own.
    pub namespace: String,
    /// Where delegated-process checks materialize their scratch files.
    pub scratch_dir: PathBuf,
    pub user_agent: String,
    /// Upper bound on one delegated process run, in seconds.
    pub process_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            scratch_dir: std::env::temp_dir(),
            user_agent: concat!("canary/", env!("CARGO_PKG_VERSION")).to_string(),
            process_timeout_secs: 300,
        }
    }
}

impl EngineConfig {
    /// Load from a mounted file, e.g. `/config/config.yaml`.
    pub fn from_mounted_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.is_empty() {
            return Err(ConfigError::Invalid("namespace must not be empty".to_string()));
        }
        if self.scratch_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("scratchDir must not be empty".to_string()));
        }
        if self.process_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "processTimeoutSecs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.process_timeout_secs)
    }
}
