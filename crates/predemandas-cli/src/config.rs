use std::fs;
use std::path::{Path, PathBuf};

use predemandas_core::{DispatchSettings, DuplicatePolicy};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("config file has no dispatch section")]
    MissingDispatch,
    #[error("environment variable {0} named by token_env is not set")]
    MissingToken(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub duplicates: Option<DuplicatePolicy>,
    #[serde(default)]
    pub dispatch: Option<DispatchConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    pub sender: String,
    #[serde(default)]
    pub copy_recipients: Vec<String>,
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, Deserialize, Eq, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    Outbox {
        dir: PathBuf,
    },
    Relay {
        endpoint: String,
        #[serde(default)]
        token_env: Option<String>,
        #[serde(default)]
        allow_missing_attachment: bool,
    },
}

impl AppConfig {
    /// Load a YAML config. A relative outbox directory is resolved against the
    /// config file's own directory.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(DispatchConfig {
            transport: TransportConfig::Outbox { dir },
            ..
        }) = config.dispatch.as_mut()
        {
            if dir.is_relative() {
                if let Some(base) = path.parent() {
                    *dir = base.join(&*dir);
                }
            }
        }
        Ok(config)
    }

    /// # Errors
    /// Returns [`ConfigError::MissingDispatch`] without a `dispatch` section.
    pub fn dispatch(&self) -> Result<&DispatchConfig, ConfigError> {
        self.dispatch.as_ref().ok_or(ConfigError::MissingDispatch)
    }
}

impl DispatchConfig {
    #[must_use]
    pub fn settings(&self) -> DispatchSettings {
        DispatchSettings {
            copy_recipients: self.copy_recipients.clone(),
        }
    }
}

/// Read the relay credential from the environment variable the config names.
///
/// # Errors
/// Returns [`ConfigError::MissingToken`] when the variable is named but unset.
pub fn relay_token(token_env: Option<&str>) -> Result<Option<String>, ConfigError> {
    match token_env {
        None => Ok(None),
        Some(name) => std::env::var(name)
            .map(Some)
            .map_err(|_| ConfigError::MissingToken(name.to_string())),
    }
}
