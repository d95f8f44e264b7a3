//! Data-source load task.
//!
//! # Invariants
//! - Every submitted load reports exactly one `LoadCompletion`, including
//!   when the data layer panics.
//! - Completions travel over a channel drained by the owning thread only.

use crate::data::{DataLayerError, DataSource, PrimitiveDataLayer};
use crate::lifecycle::worker::{WorkerPool, WorkerPoolError};
use crate::logging::sanitize_message;
use crossbeam_channel::Sender;
use log::{info, warn};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

/// Result of one data-source load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadCompletion {
    pub source: DataSource,
    pub outcome: Result<(), DataLayerError>,
}

/// Queues a load of `source` on `pool`; the completion is sent on `done`.
pub fn submit_load(
    pool: &WorkerPool,
    data_layer: Arc<dyn PrimitiveDataLayer>,
    source: DataSource,
    done: Sender<LoadCompletion>,
) -> Result<(), WorkerPoolError> {
    info!(
        "event=data_load module=lifecycle status=submitted source={}",
        source.name
    );
    pool.submit(move || {
        let started_at = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| data_layer.load(&source)))
            .unwrap_or_else(|payload| Err(DataLayerError::Panicked(panic_summary(&*payload))));
        info!(
            "event=data_load module=lifecycle status={} source={} duration_ms={}",
            if outcome.is_ok() { "ok" } else { "error" },
            source.name,
            started_at.elapsed().as_millis()
        );
        if done.send(LoadCompletion { source, outcome }).is_err() {
            warn!("event=data_load module=lifecycle status=dropped reason=shell_gone");
        }
    })
}

fn panic_summary(payload: &(dyn std::any::Any + Send)) -> String {
    let message = if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    };
    sanitize_message(&message, MAX_PANIC_PAYLOAD_CHARS)
}
