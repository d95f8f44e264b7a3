//! Primitive data layer contract.
//!
//! # Responsibility
//! - Describe the knowledge-base storage the shell loads, saves and stops.
//! - Provide a directory-backed implementation for headless runs.
//!
//! # Invariants
//! - Implementations are shared between the owning thread and load workers,
//!   so every method takes `&self`.
//! - `stop` is idempotent; `load` and `save` fail after `stop`.

use log::info;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Mutex;

/// Data source chosen on the select-data-source page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    pub name: String,
    pub location: PathBuf,
}

impl DataSource {
    pub fn new(name: impl Into<String>, location: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataLayerError {
    SourceUnavailable { source: String, reason: String },
    NotLoaded,
    Stopped,
    /// The load task panicked; carries the sanitized payload.
    Panicked(String),
}

impl Display for DataLayerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SourceUnavailable { source, reason } => {
                write!(f, "data source `{source}` unavailable: {reason}")
            }
            Self::NotLoaded => write!(f, "no data source is loaded"),
            Self::Stopped => write!(f, "data layer has been stopped"),
            Self::Panicked(payload) => write!(f, "data source load panicked: {payload}"),
        }
    }
}

impl Error for DataLayerError {}

/// Durable store behind the knowledge base.
pub trait PrimitiveDataLayer: Send + Sync {
    /// Loads `source`. Runs on a worker thread.
    fn load(&self, source: &DataSource) -> Result<(), DataLayerError>;
    /// Pushes in-flight writes to durable storage.
    fn save(&self) -> Result<(), DataLayerError>;
    /// Releases the data layer.
    fn stop(&self) -> Result<(), DataLayerError>;
}

#[derive(Debug, Default)]
struct DirectoryState {
    loaded: Option<DataSource>,
    entry_count: usize,
    stopped: bool,
}

/// Data layer whose sources are plain directories.
///
/// Loading checks that the directory is readable and counts its entries.
#[derive(Debug, Default)]
pub struct DirectoryDataLayer {
    state: Mutex<DirectoryState>,
}

impl DirectoryDataLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loaded_source(&self) -> Option<DataSource> {
        self.lock().loaded.clone()
    }

    pub fn entry_count(&self) -> usize {
        self.lock().entry_count
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DirectoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PrimitiveDataLayer for DirectoryDataLayer {
    fn load(&self, source: &DataSource) -> Result<(), DataLayerError> {
        if self.lock().stopped {
            return Err(DataLayerError::Stopped);
        }
        let unavailable = |reason: String| DataLayerError::SourceUnavailable {
            source: source.name.clone(),
            reason,
        };
        let entries = std::fs::read_dir(&source.location)
            .map_err(|err| unavailable(format!("{}: {err}", source.location.display())))?;
        let entry_count = entries.filter_map(Result::ok).count();

        let mut state = self.lock();
        if state.stopped {
            return Err(DataLayerError::Stopped);
        }
        state.loaded = Some(source.clone());
        state.entry_count = entry_count;
        info!(
            "event=data_load module=data status=ok source={} entries={entry_count}",
            source.name
        );
        Ok(())
    }

    fn save(&self) -> Result<(), DataLayerError> {
        let state = self.lock();
        if state.stopped {
            return Err(DataLayerError::Stopped);
        }
        let Some(source) = state.loaded.as_ref() else {
            return Err(DataLayerError::NotLoaded);
        };
        info!("event=data_save module=data status=ok source={}", source.name);
        Ok(())
    }

    fn stop(&self) -> Result<(), DataLayerError> {
        let mut state = self.lock();
        if !state.stopped {
            state.stopped = true;
            info!("event=data_stop module=data status=ok");
        }
        Ok(())
    }
}
