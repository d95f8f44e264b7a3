//! Orderly shutdown sequence.
//!
//! # Responsibility
//! - Close and persist every live session.
//! - Settle any in-flight load, then save and stop the data layer.
//! - Stop the preference store and exit the UI runtime.
//!
//! # Invariants
//! - The sequence runs at most once per coordinator.
//! - Sessions are persisted before the data layer stops, and the data layer
//!   stops before the UI exits.
//! - A failing step is recorded and later steps still run.

use crate::data::{DataLayerError, PrimitiveDataLayer};
use crate::prefs::PreferenceStore;
use crate::session::registry::{CloseOutcome, SessionRegistry};
use crate::ui::UiRuntime;
use log::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStep {
    CloseSessions,
    AwaitLoad,
    SaveDataLayer,
    StopDataLayer,
    StopPreferences,
    ExitUi,
}

/// What happened to a load that was in flight when shutdown began.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadDrain {
    Idle,
    Completed(Result<(), DataLayerError>),
    /// Grace period elapsed; the completion will be ignored.
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Steps in executed order.
    pub steps: Vec<ShutdownStep>,
    pub sessions_closed: usize,
    pub failed_session_writes: usize,
    pub load: LoadDrain,
    pub errors: Vec<(ShutdownStep, String)>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.failed_session_writes == 0
    }

    pub fn step_failed(&self, step: ShutdownStep) -> bool {
        self.errors.iter().any(|(failed, _)| *failed == step)
    }
}

#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    report: Option<ShutdownReport>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_run(&self) -> bool {
        self.report.is_some()
    }

    pub fn report(&self) -> Option<&ShutdownReport> {
        self.report.as_ref()
    }

    /// Runs the teardown sequence. Returns `None` when it already ran.
    pub fn run<S, U>(
        &mut self,
        registry: &mut SessionRegistry<S>,
        data_layer: &dyn PrimitiveDataLayer,
        ui: &mut U,
        await_load: impl FnOnce() -> LoadDrain,
    ) -> Option<&ShutdownReport>
    where
        S: PreferenceStore,
        U: UiRuntime + ?Sized,
    {
        if self.report.is_some() {
            warn!("event=shutdown module=lifecycle status=skipped reason=already_ran");
            return None;
        }
        info!("event=shutdown module=lifecycle status=start live_sessions={}", registry.len());

        let mut report = ShutdownReport {
            steps: Vec::new(),
            sessions_closed: 0,
            failed_session_writes: 0,
            load: LoadDrain::Idle,
            errors: Vec::new(),
        };

        report.steps.push(ShutdownStep::CloseSessions);
        for session in registry.list_live() {
            if let CloseOutcome::Closed { report: saved, .. } = registry.close(session.id) {
                report.sessions_closed += 1;
                report.failed_session_writes += saved.failed.len();
                if let Some(err) = saved.index_error {
                    report.errors.push((ShutdownStep::CloseSessions, err.to_string()));
                }
            }
        }

        report.steps.push(ShutdownStep::AwaitLoad);
        report.load = await_load();
        if report.load == LoadDrain::Abandoned {
            warn!("event=shutdown module=lifecycle status=load_abandoned");
        }

        report.steps.push(ShutdownStep::SaveDataLayer);
        match data_layer.save() {
            Ok(()) | Err(DataLayerError::NotLoaded) => {}
            Err(err) => record(&mut report, ShutdownStep::SaveDataLayer, err),
        }

        report.steps.push(ShutdownStep::StopDataLayer);
        if let Err(err) = data_layer.stop() {
            record(&mut report, ShutdownStep::StopDataLayer, err);
        }

        report.steps.push(ShutdownStep::StopPreferences);
        if let Err(err) = registry.persister_mut().store_mut().stop() {
            record(&mut report, ShutdownStep::StopPreferences, err);
        }

        report.steps.push(ShutdownStep::ExitUi);
        ui.exit();

        info!(
            "event=shutdown module=lifecycle status={} sessions_closed={} errors={}",
            if report.is_clean() { "ok" } else { "partial" },
            report.sessions_closed,
            report.errors.len()
        );
        self.report = Some(report);
        self.report.as_ref()
    }
}

fn record(report: &mut ShutdownReport, step: ShutdownStep, err: impl std::fmt::Display) {
    error!("event=shutdown module=lifecycle status=error step={step:?} error={err}");
    report.errors.push((step, err.to_string()));
}
