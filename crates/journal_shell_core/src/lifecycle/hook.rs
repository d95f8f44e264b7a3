//! Last-resort data-layer shutdown hook.
//!
//! # Invariants
//! - The hook fires at most once, from drop, from a Ctrl+C signal, or from
//!   an explicit `fire`, whichever comes first.
//! - A disarmed hook never touches the data layer.

use crate::data::{DataLayerError, PrimitiveDataLayer};
use log::{error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Exit code used when the signal handler terminates the process.
pub const SIGNAL_EXIT_CODE: i32 = 130;

/// Save-then-stop guard armed until normal shutdown stops the data layer.
pub struct ShutdownHook {
    data_layer: Arc<dyn PrimitiveDataLayer>,
    armed: Arc<AtomicBool>,
}

impl ShutdownHook {
    pub fn new(data_layer: Arc<dyn PrimitiveDataLayer>) -> Self {
        Self {
            data_layer,
            armed: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Marks the data layer as already stopped by the normal path.
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }

    /// Runs save-then-stop if still armed. Returns whether it ran.
    pub fn fire(&self) -> bool {
        if !self.armed.swap(false, Ordering::SeqCst) {
            return false;
        }
        run_last_resort(self.data_layer.as_ref());
        true
    }

    /// Installs a process-wide Ctrl+C handler that fires the hook and exits.
    ///
    /// Only one handler can be installed per process.
    pub fn install_signal_handler(&self) -> Result<(), ctrlc::Error> {
        let data_layer = Arc::clone(&self.data_layer);
        let armed = Arc::clone(&self.armed);
        ctrlc::set_handler(move || {
            info!("event=signal_received module=lifecycle status=start");
            if armed.swap(false, Ordering::SeqCst) {
                run_last_resort(data_layer.as_ref());
            }
            std::process::exit(SIGNAL_EXIT_CODE);
        })
    }
}

impl Drop for ShutdownHook {
    fn drop(&mut self) {
        self.fire();
    }
}

/// Saves then stops the data layer, logging failures.
///
/// A layer with nothing loaded has nothing to save; that is not a failure.
/// Returns whether both steps completed without error.
pub fn run_last_resort(data_layer: &dyn PrimitiveDataLayer) -> bool {
    info!("event=shutdown_hook module=lifecycle status=start");
    let mut clean = true;
    match data_layer.save() {
        Ok(()) => {}
        Err(DataLayerError::NotLoaded) => {
            info!("event=shutdown_hook module=lifecycle status=skipped step=save reason=not_loaded");
        }
        Err(err) => {
            clean = false;
            error!("event=shutdown_hook module=lifecycle status=error step=save error={err}");
        }
    }
    if let Err(err) = data_layer.stop() {
        clean = false;
        error!("event=shutdown_hook module=lifecycle status=error step=stop error={err}");
    }
    info!(
        "event=shutdown_hook module=lifecycle status={}",
        if clean { "ok" } else { "error" }
    );
    clean
}
