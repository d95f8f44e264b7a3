//! Shell configuration.
//!
//! # Responsibility
//! - Load `ShellConfig` from TOML with defaults for every field.
//! - Reject configurations the shell cannot run with.
//!
//! # Example
//! ```toml
//! preferences_path = "/home/me/.journal-shell/preferences.sqlite3"
//! log_dir = "/home/me/.journal-shell/logs"
//! log_level = "info"
//! worker_threads = 2
//! shutdown_load_grace_ms = 2000
//! author_label = "Demo Author"
//! ```

use crate::logging::{default_log_level, LogLevel};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_WORKER_THREADS: usize = 2;
pub const DEFAULT_SHUTDOWN_LOAD_GRACE_MS: u64 = 2_000;
pub const DEFAULT_AUTHOR_LABEL: &str = "Demo Author";

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(toml::de::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShellConfig {
    /// SQLite preference file; an in-memory store is used when absent.
    pub preferences_path: Option<PathBuf>,
    /// Log directory; logging stays uninitialized when absent.
    pub log_dir: Option<PathBuf>,
    pub log_level: String,
    pub worker_threads: usize,
    /// How long shutdown waits for an in-flight data-source load.
    pub shutdown_load_grace_ms: u64,
    /// Author recorded on journals opened without one.
    pub author_label: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            preferences_path: None,
            log_dir: None,
            log_level: default_log_level().to_string(),
            worker_threads: DEFAULT_WORKER_THREADS,
            shutdown_load_grace_ms: DEFAULT_SHUTDOWN_LOAD_GRACE_MS,
            author_label: DEFAULT_AUTHOR_LABEL.to_string(),
        }
    }
}

impl ShellConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_threads == 0 {
            return Err(ConfigError::Invalid(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        if self.author_label.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "author_label must not be blank".to_string(),
            ));
        }
        self.log_level
            .parse::<LogLevel>()
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        Ok(())
    }

    pub fn shutdown_load_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_load_grace_ms)
    }
}
