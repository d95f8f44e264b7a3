//! Journal shell service.
//!
//! # Responsibility
//! - Own the state machine, session registry, event bus and load workers
//!   for one application instance.
//! - Turn UI commands into registry calls and state requests.
//! - Run queued transition side effects serially from `pump`.
//!
//! # Invariants
//! - Only the owning thread touches the registry and the state machine;
//!   load workers report back through the completion channel.
//! - Any failing transition side effect forces `Shutdown`.
//! - The shutdown sequence runs at most once.

use crate::config::{ConfigError, ShellConfig};
use crate::data::{DataSource, PrimitiveDataLayer};
use crate::events::{EventBus, JournalTile, ShellEvent, Topic};
use crate::lifecycle::hook::ShutdownHook;
use crate::lifecycle::loader::{submit_load, LoadCompletion};
use crate::lifecycle::shutdown::{LoadDrain, ShutdownCoordinator, ShutdownReport, ShutdownStep};
use crate::lifecycle::state_machine::{AppStateMachine, Transition, TransitionError};
use crate::lifecycle::worker::{WorkerPool, WorkerPoolError};
use crate::model::app_state::AppState;
use crate::model::session::{SessionId, SessionSettings, WindowGeometry};
use crate::prefs::{PrefError, PreferenceStore};
use crate::session::persister::SaveReport;
use crate::session::registry::{CloseOutcome, OpenOutcome, RegistryError, SessionRegistry};
use crate::ui::{Route, UiRuntime};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Root preference flag set once the shell has started against a store.
pub const APP_INITIALIZED: &str = "app_initialized";

const LOAD_WORKER_NAME: &str = "data-load";

pub type ShellResult<T> = Result<T, ShellError>;

#[derive(Debug)]
pub enum ShellError {
    Config(ConfigError),
    Registry(RegistryError),
    Transition(TransitionError),
    Worker(WorkerPoolError),
    Prefs(PrefError),
    /// `SelectedDataSource` was dispatched without a chosen source.
    NoDataSourceSelected,
    /// Shutdown has started; new sessions are refused.
    ShuttingDown,
}

impl Display for ShellError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Registry(err) => write!(f, "{err}"),
            Self::Transition(err) => write!(f, "{err}"),
            Self::Worker(err) => write!(f, "{err}"),
            Self::Prefs(err) => write!(f, "{err}"),
            Self::NoDataSourceSelected => write!(f, "no data source selected"),
            Self::ShuttingDown => write!(f, "shell is shutting down"),
        }
    }
}

impl Error for ShellError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Registry(err) => Some(err),
            Self::Transition(err) => Some(err),
            Self::Worker(err) => Some(err),
            Self::Prefs(err) => Some(err),
            Self::NoDataSourceSelected | Self::ShuttingDown => None,
        }
    }
}

impl From<ConfigError> for ShellError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<RegistryError> for ShellError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}

impl From<TransitionError> for ShellError {
    fn from(value: TransitionError) -> Self {
        Self::Transition(value)
    }
}

impl From<WorkerPoolError> for ShellError {
    fn from(value: WorkerPoolError) -> Self {
        Self::Worker(value)
    }
}

impl From<PrefError> for ShellError {
    fn from(value: PrefError) -> Self {
        Self::Prefs(value)
    }
}

/// Requests a UI can send to the shell.
#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    /// Open (or focus) a journal by title, restoring stored settings.
    OpenJournal(String),
    /// Open (or focus) a journal with explicit settings.
    CreateJournal(SessionSettings),
    CloseJournal(SessionId),
    SelectDataSource(DataSource),
    Quit,
}

/// One application instance: state, sessions and their collaborators.
pub struct JournalShell<S: PreferenceStore, U: UiRuntime> {
    config: ShellConfig,
    machine: AppStateMachine,
    registry: SessionRegistry<S>,
    bus: EventBus,
    ui: U,
    data_layer: Arc<dyn PrimitiveDataLayer>,
    pool: WorkerPool,
    completion_tx: Sender<LoadCompletion>,
    completion_rx: Receiver<LoadCompletion>,
    selected_source: Option<DataSource>,
    load_in_flight: bool,
    coordinator: ShutdownCoordinator,
    hook: ShutdownHook,
    failure: Option<String>,
}

impl<S: PreferenceStore, U: UiRuntime> JournalShell<S, U> {
    pub fn new(
        config: ShellConfig,
        mut store: S,
        ui: U,
        data_layer: Arc<dyn PrimitiveDataLayer>,
    ) -> ShellResult<Self> {
        config.validate()?;
        mark_app_initialized(&mut store);

        let bus = EventBus::new();
        let registry = SessionRegistry::new(store, bus.clone(), config.author_label.clone());
        let pool = WorkerPool::new(config.worker_threads, LOAD_WORKER_NAME)?;
        let (completion_tx, completion_rx) = unbounded();
        let hook = ShutdownHook::new(Arc::clone(&data_layer));

        Ok(Self {
            config,
            machine: AppStateMachine::new(),
            registry,
            bus,
            ui,
            data_layer,
            pool,
            completion_tx,
            completion_rx,
            selected_source: None,
            load_in_flight: false,
            coordinator: ShutdownCoordinator::new(),
            hook,
            failure: None,
        })
    }

    /// Queues the initial state the first time the primary surface shows.
    pub fn on_primary_surface_shown(&mut self) -> bool {
        let started = self.machine.start();
        if started {
            info!("event=surface_shown module=shell status=ok");
        }
        started
    }

    /// Queues `SelectedDataSource` for `source`.
    pub fn select_data_source(&mut self, source: DataSource) -> ShellResult<()> {
        self.machine.request(AppState::SelectedDataSource)?;
        self.selected_source = Some(source);
        Ok(())
    }

    /// Queues `Shutdown`; the sequence runs on the next `pump`.
    pub fn request_quit(&mut self) -> ShellResult<()> {
        self.machine.request(AppState::Shutdown)?;
        Ok(())
    }

    pub fn handle(&mut self, command: ShellCommand) -> ShellResult<()> {
        match command {
            ShellCommand::OpenJournal(name) => self.open_journal(&name).map(|_| ()),
            ShellCommand::CreateJournal(settings) => self.create_journal(settings).map(|_| ()),
            ShellCommand::CloseJournal(id) => {
                self.close_journal(id);
                Ok(())
            }
            ShellCommand::SelectDataSource(source) => self.select_data_source(source),
            ShellCommand::Quit => self.request_quit(),
        }
    }

    /// Opens or focuses a journal by title, restoring stored settings.
    pub fn open_journal(&mut self, name: &str) -> ShellResult<OpenOutcome> {
        self.ensure_accepting()?;
        let outcome = self.registry.open_or_restore(name)?;
        self.present(outcome);
        Ok(outcome)
    }

    /// Opens or focuses a journal with explicit settings.
    pub fn create_journal(&mut self, settings: SessionSettings) -> ShellResult<OpenOutcome> {
        self.ensure_accepting()?;
        let title = settings.title.clone();
        let outcome = self.registry.open_or_focus(&title, Some(settings))?;
        self.present(outcome);
        Ok(outcome)
    }

    /// Closes a journal window; safe for handles that are already gone.
    pub fn close_journal(&mut self, id: SessionId) -> CloseOutcome {
        self.registry.close(id)
    }

    pub fn update_geometry(&mut self, id: SessionId, geometry: WindowGeometry) -> ShellResult<bool> {
        Ok(self.registry.update_geometry(id, geometry)?)
    }

    /// Persists every live journal without closing it.
    pub fn save_all(&mut self) -> SaveReport {
        self.registry.save_all()
    }

    pub fn known_journals(&self) -> ShellResult<Vec<JournalTile>> {
        Ok(self.registry.known_journals()?)
    }

    pub fn delete_journal(&mut self, folder: &str) -> ShellResult<()> {
        Ok(self.registry.delete_closed(folder)?)
    }

    /// Drains load completions, then dispatches queued transitions.
    ///
    /// Returns the number of transitions dispatched.
    pub fn pump(&mut self) -> usize {
        while let Ok(completion) = self.completion_rx.try_recv() {
            self.on_load_completed(completion);
        }
        self.dispatch_pending()
    }

    /// Like `pump`, but waits up to `timeout` for an in-flight load.
    pub fn pump_blocking(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut dispatched = self.pump();
        while self.load_in_flight && !self.coordinator.has_run() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.completion_rx.recv_timeout(remaining) {
                Ok(completion) => {
                    self.on_load_completed(completion);
                    dispatched += self.dispatch_pending();
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    self.fail("load completion channel disconnected".to_string());
                    dispatched += self.dispatch_pending();
                }
            }
        }
        dispatched
    }

    /// Forces `Shutdown` and runs the teardown sequence now.
    pub fn shutdown(&mut self) -> Option<&ShutdownReport> {
        if self.machine.force_shutdown() {
            info!("event=shutdown_requested module=shell status=ok");
        }
        self.dispatch_pending();
        self.coordinator.report()
    }

    pub fn state(&self) -> Option<AppState> {
        self.machine.state()
    }

    pub fn route(&self) -> Route {
        Route::for_state(self.machine.state())
    }

    pub fn is_terminated(&self) -> bool {
        self.coordinator.has_run()
    }

    /// `Some(0)` after a normal shutdown, `Some(1)` after a forced one.
    pub fn exit_status(&self) -> Option<i32> {
        if !self.coordinator.has_run() {
            return None;
        }
        Some(if self.failure.is_some() { 1 } else { 0 })
    }

    /// First failure that forced shutdown, if any.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn shutdown_report(&self) -> Option<&ShutdownReport> {
        self.coordinator.report()
    }

    pub fn is_loading(&self) -> bool {
        self.load_in_flight
    }

    pub fn registry(&self) -> &SessionRegistry<S> {
        &self.registry
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn ui(&self) -> &U {
        &self.ui
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub fn shutdown_hook(&self) -> &ShutdownHook {
        &self.hook
    }

    fn ensure_accepting(&self) -> ShellResult<()> {
        if self.machine.is_terminal() || self.coordinator.has_run() {
            return Err(ShellError::ShuttingDown);
        }
        Ok(())
    }

    fn present(&mut self, outcome: OpenOutcome) {
        let Some(session) = self.registry.get(outcome.id()) else {
            return;
        };
        match outcome {
            OpenOutcome::Created { layout, .. } => self.ui.show_session(session, layout),
            OpenOutcome::Focused { .. } => self.ui.bring_to_front(session),
        }
    }

    fn on_load_completed(&mut self, completion: LoadCompletion) {
        self.load_in_flight = false;
        if self.machine.shutdown_requested() {
            info!(
                "event=data_load module=shell status=ignored source={} reason=shutting_down ok={}",
                completion.source.name,
                completion.outcome.is_ok()
            );
            return;
        }

        match completion.outcome {
            Ok(()) => {
                if let Err(err) = self.machine.request(AppState::Running) {
                    self.fail(format!("cannot enter RUNNING after load: {err}"));
                }
            }
            Err(err) => self.fail(format!(
                "data source `{}` failed to load: {err}",
                completion.source.name
            )),
        }
    }

    fn dispatch_pending(&mut self) -> usize {
        let mut dispatched = 0;
        while let Some(Transition { from, to }) = self.machine.next_transition() {
            dispatched += 1;
            info!(
                "event=state_transition module=shell status=ok from={} to={to}",
                from.map_or("NONE", AppState::as_str)
            );
            self.bus
                .publish(Topic::AppState, &ShellEvent::AppStateChanged { from, to });
            if let Err(err) = self.enter(to) {
                self.fail(format!("transition to {to} failed: {err}"));
            }
        }
        dispatched
    }

    fn enter(&mut self, state: AppState) -> ShellResult<()> {
        match state {
            AppState::SelectDataSource => {
                self.ui.navigate(Route::SelectDataSource);
                Ok(())
            }
            AppState::SelectedDataSource => {
                let source = self
                    .selected_source
                    .clone()
                    .ok_or(ShellError::NoDataSourceSelected)?;
                if self.machine.shutdown_requested() {
                    info!(
                        "event=data_load module=shell status=skipped source={} reason=shutting_down",
                        source.name
                    );
                    return Ok(());
                }
                self.machine.request(AppState::LoadingDataSource)?;
                submit_load(
                    &self.pool,
                    Arc::clone(&self.data_layer),
                    source,
                    self.completion_tx.clone(),
                )?;
                self.load_in_flight = true;
                Ok(())
            }
            AppState::LoadingDataSource => Ok(()),
            AppState::Running => {
                self.ui.navigate(Route::Landing);
                Ok(())
            }
            AppState::Shutdown => {
                self.run_shutdown();
                Ok(())
            }
        }
    }

    fn run_shutdown(&mut self) {
        let grace = self.config.shutdown_load_grace();
        let load_in_flight = &mut self.load_in_flight;
        let completion_rx = &self.completion_rx;
        let report = self.coordinator.run(
            &mut self.registry,
            self.data_layer.as_ref(),
            &mut self.ui,
            || {
                if !*load_in_flight {
                    return LoadDrain::Idle;
                }
                match completion_rx.recv_timeout(grace) {
                    Ok(completion) => {
                        *load_in_flight = false;
                        LoadDrain::Completed(completion.outcome)
                    }
                    Err(_) => LoadDrain::Abandoned,
                }
            },
        );

        if let Some(report) = report {
            if !report.step_failed(ShutdownStep::StopDataLayer) {
                self.hook.disarm();
            }
        }
    }

    fn fail(&mut self, reason: String) {
        error!("event=shell_failure module=shell status=error reason={reason}");
        if self.failure.is_none() {
            self.failure = Some(reason);
        }
        self.machine.force_shutdown();
    }
}

fn mark_app_initialized<S: PreferenceStore>(store: &mut S) {
    match store.get_bool("", APP_INITIALIZED) {
        Ok(Some(true)) => info!("event=prefs_restore module=shell status=ok"),
        Ok(_) => {
            info!("event=prefs_create module=shell status=start");
            let marked = store
                .put_bool("", APP_INITIALIZED, true)
                .and_then(|()| store.flush(""));
            if let Err(err) = marked {
                warn!("event=prefs_create module=shell status=error error={err}");
            }
        }
        Err(err) => warn!("event=prefs_restore module=shell status=error error={err}"),
    }
}
