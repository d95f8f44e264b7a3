use journal_shell_core::{
    AppState, DataLayerError, DataSource, EventKind, HeadlessUi, JournalShell, LoadDrain,
    PreferenceStore, PrimitiveDataLayer, Route, ShellCommand, ShellConfig, ShellError,
    ShellEvent, ShutdownStep, SqlitePreferenceStore, Topic, TransitionError, UiAction,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const LOAD_WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct ScriptedLayer {
    loads: AtomicUsize,
    saves: AtomicUsize,
    stops: AtomicUsize,
    load_delay: Duration,
    fail_load: bool,
}

impl ScriptedLayer {
    fn failing() -> Self {
        Self {
            fail_load: true,
            ..Self::default()
        }
    }

    fn slow(load_delay: Duration) -> Self {
        Self {
            load_delay,
            ..Self::default()
        }
    }

    fn counts(&self) -> (usize, usize, usize) {
        (
            self.loads.load(Ordering::SeqCst),
            self.saves.load(Ordering::SeqCst),
            self.stops.load(Ordering::SeqCst),
        )
    }
}

impl PrimitiveDataLayer for ScriptedLayer {
    fn load(&self, source: &DataSource) -> Result<(), DataLayerError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.load_delay);
        if self.fail_load {
            return Err(DataLayerError::SourceUnavailable {
                source: source.name.clone(),
                reason: "missing index".to_string(),
            });
        }
        Ok(())
    }

    fn save(&self) -> Result<(), DataLayerError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), DataLayerError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

type TestShell = JournalShell<SqlitePreferenceStore, HeadlessUi>;

fn shell_with(layer: &Arc<ScriptedLayer>, grace_ms: u64) -> TestShell {
    let config = ShellConfig {
        shutdown_load_grace_ms: grace_ms,
        ..ShellConfig::default()
    };
    let data_layer: Arc<dyn PrimitiveDataLayer> = Arc::clone(layer) as Arc<dyn PrimitiveDataLayer>;
    JournalShell::new(
        config,
        SqlitePreferenceStore::open_in_memory().unwrap(),
        HeadlessUi::new(),
        data_layer,
    )
    .unwrap()
}

fn source() -> DataSource {
    DataSource::new("kb", "/tmp/kb")
}

fn record_states(shell: &TestShell) -> Rc<RefCell<Vec<AppState>>> {
    let states = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&states);
    shell
        .bus()
        .subscribe(Topic::AppState, EventKind::AppStateChanged, move |event| {
            if let ShellEvent::AppStateChanged { to, .. } = event {
                sink.borrow_mut().push(*to);
            }
        });
    states
}

#[test]
fn select_load_run_then_quit_walks_every_state_once() {
    let layer = Arc::new(ScriptedLayer::default());
    let mut shell = shell_with(&layer, 2_000);
    let states = record_states(&shell);

    assert_eq!(shell.state(), None);
    assert!(shell.on_primary_surface_shown());
    assert!(!shell.on_primary_surface_shown());
    shell.pump();
    assert_eq!(shell.state(), Some(AppState::SelectDataSource));
    assert_eq!(shell.route(), Route::SelectDataSource);

    shell.select_data_source(source()).unwrap();
    shell.pump_blocking(LOAD_WAIT);
    assert_eq!(shell.state(), Some(AppState::Running));
    assert_eq!(shell.route(), Route::Landing);
    assert!(!shell.is_loading());

    shell.open_journal("Demo").unwrap();
    shell.request_quit().unwrap();
    shell.pump();

    assert_eq!(
        *states.borrow(),
        vec![
            AppState::SelectDataSource,
            AppState::SelectedDataSource,
            AppState::LoadingDataSource,
            AppState::Running,
            AppState::Shutdown,
        ]
    );
    assert_eq!(shell.exit_status(), Some(0));
    assert_eq!(layer.counts(), (1, 1, 1));

    let report = shell.shutdown_report().unwrap();
    assert!(report.is_clean());
    assert_eq!(report.sessions_closed, 1);
    assert_eq!(report.load, LoadDrain::Idle);
    assert_eq!(
        report.steps,
        vec![
            ShutdownStep::CloseSessions,
            ShutdownStep::AwaitLoad,
            ShutdownStep::SaveDataLayer,
            ShutdownStep::StopDataLayer,
            ShutdownStep::StopPreferences,
            ShutdownStep::ExitUi,
        ]
    );

    let actions = shell.ui().actions();
    assert_eq!(actions.first(), Some(&UiAction::Navigate(Route::SelectDataSource)));
    assert!(actions.contains(&UiAction::Navigate(Route::Landing)));
    assert_eq!(actions.last(), Some(&UiAction::Exit));
    assert_eq!(shell.ui().exit_count(), 1);
    assert!(!shell.shutdown_hook().is_armed());
}

#[test]
fn failed_load_forces_shutdown_exactly_once() {
    let layer = Arc::new(ScriptedLayer::failing());
    let mut shell = shell_with(&layer, 2_000);
    let states = record_states(&shell);

    shell.on_primary_surface_shown();
    shell.pump();
    shell.open_journal("Demo").unwrap();
    shell.select_data_source(source()).unwrap();
    shell.pump_blocking(LOAD_WAIT);

    assert_eq!(shell.state(), Some(AppState::Shutdown));
    assert!(shell.failure().unwrap().contains("kb"));
    assert_eq!(shell.exit_status(), Some(1));
    assert_eq!(
        states.borrow().last().copied(),
        Some(AppState::Shutdown)
    );
    assert!(!states.borrow().contains(&AppState::Running));

    let report = shell.shutdown_report().unwrap().clone();
    assert_eq!(report.sessions_closed, 1);
    assert_eq!(layer.counts(), (1, 1, 1));
    assert_eq!(shell.ui().exit_count(), 1);

    let again = shell.shutdown().cloned();
    assert_eq!(again, Some(report));
    assert!(matches!(
        shell.request_quit(),
        Err(ShellError::Transition(TransitionError::Terminal))
    ));
    shell.pump();
    assert_eq!(layer.counts(), (1, 1, 1));
    assert_eq!(shell.ui().exit_count(), 1);
    assert_eq!(shell.state(), Some(AppState::Shutdown));

    let persisted = shell.known_journals();
    assert!(persisted.is_err(), "preference store is stopped");
}

#[test]
fn shutdown_abandons_a_load_that_outlives_the_grace_period() {
    let layer = Arc::new(ScriptedLayer::slow(Duration::from_millis(400)));
    let mut shell = shell_with(&layer, 20);

    shell.on_primary_surface_shown();
    shell.select_data_source(source()).unwrap();
    shell.pump();
    assert_eq!(shell.state(), Some(AppState::LoadingDataSource));
    assert!(shell.is_loading());

    let report = shell.shutdown().unwrap();
    assert_eq!(report.load, LoadDrain::Abandoned);
    assert_eq!(shell.exit_status(), Some(0));

    std::thread::sleep(Duration::from_millis(600));
    shell.pump();
    assert_eq!(shell.state(), Some(AppState::Shutdown));
    assert!(!shell.is_loading());
    assert_eq!(shell.ui().exit_count(), 1);
}

#[test]
fn shutdown_waits_for_a_load_that_finishes_within_the_grace_period() {
    let layer = Arc::new(ScriptedLayer::slow(Duration::from_millis(50)));
    let mut shell = shell_with(&layer, 2_000);

    shell.on_primary_surface_shown();
    shell.select_data_source(source()).unwrap();
    shell.pump();

    let report = shell.shutdown().unwrap();
    assert_eq!(report.load, LoadDrain::Completed(Ok(())));
    assert_eq!(shell.state(), Some(AppState::Shutdown));
    assert_eq!(layer.counts(), (1, 1, 1));
}

#[test]
fn shutdown_before_the_surface_shows_still_runs_the_sequence() {
    let layer = Arc::new(ScriptedLayer::default());
    let mut shell = shell_with(&layer, 2_000);

    assert!(shell.shutdown().is_some());
    assert_eq!(shell.state(), Some(AppState::Shutdown));
    assert_eq!(shell.ui().actions(), &[UiAction::Exit]);
    assert!(!shell.on_primary_surface_shown());
    assert_eq!(layer.counts(), (0, 1, 1));
}

#[test]
fn invalid_requests_are_rejected_without_changing_state() {
    let layer = Arc::new(ScriptedLayer::default());
    let mut shell = shell_with(&layer, 2_000);

    assert!(matches!(
        shell.select_data_source(source()),
        Err(ShellError::Transition(TransitionError::NotStarted))
    ));

    shell.on_primary_surface_shown();
    shell.pump();
    assert!(matches!(
        shell.handle(ShellCommand::Quit),
        Ok(())
    ));
    assert!(matches!(
        shell.select_data_source(source()),
        Err(ShellError::Transition(TransitionError::Terminal))
    ));
    shell.pump();
    assert_eq!(shell.state(), Some(AppState::Shutdown));
}

#[test]
fn journals_cannot_open_after_shutdown() {
    let layer = Arc::new(ScriptedLayer::default());
    let mut shell = shell_with(&layer, 2_000);
    shell.on_primary_surface_shown();
    shell.pump();

    shell
        .handle(ShellCommand::OpenJournal("Demo".to_string()))
        .unwrap();
    shell
        .handle(ShellCommand::OpenJournal("Demo".to_string()))
        .unwrap();
    let shown = shell
        .ui()
        .actions()
        .iter()
        .filter(|action| matches!(action, UiAction::Show { .. }))
        .count();
    let focused = shell
        .ui()
        .actions()
        .iter()
        .filter(|action| matches!(action, UiAction::Focus { .. }))
        .count();
    assert_eq!((shown, focused), (1, 1));

    shell.shutdown();
    assert!(matches!(
        shell.open_journal("Other"),
        Err(ShellError::ShuttingDown)
    ));
    assert!(shell.registry().is_empty());
}

#[test]
fn new_shell_marks_the_store_initialized() {
    let layer = Arc::new(ScriptedLayer::default());
    let shell = shell_with(&layer, 2_000);
    let store = shell.registry().persister().store();
    assert_eq!(store.get_bool("", "app_initialized").unwrap(), Some(true));
}

#[test]
fn dropping_a_running_shell_fires_the_last_resort_hook() {
    let layer = Arc::new(ScriptedLayer::default());
    {
        let mut shell = shell_with(&layer, 2_000);
        shell.on_primary_surface_shown();
        shell.select_data_source(source()).unwrap();
        shell.pump_blocking(LOAD_WAIT);
        assert_eq!(shell.state(), Some(AppState::Running));
        assert!(shell.shutdown_hook().is_armed());
    }
    assert_eq!(layer.counts(), (1, 1, 1));
}

#[test]
fn quit_queued_behind_a_selection_skips_the_load_and_exits_cleanly() {
    let layer = Arc::new(ScriptedLayer::default());
    let mut shell = shell_with(&layer, 2_000);

    shell.on_primary_surface_shown();
    shell.pump();
    shell.select_data_source(source()).unwrap();
    shell.request_quit().unwrap();
    shell.pump();

    assert_eq!(shell.state(), Some(AppState::Shutdown));
    assert_eq!(shell.failure(), None);
    assert_eq!(shell.exit_status(), Some(0));
    assert_eq!(shell.shutdown_report().unwrap().load, LoadDrain::Idle);
    assert_eq!(layer.counts(), (0, 1, 1));
}

#[test]
fn load_finishing_after_a_queued_quit_is_ignored() {
    let layer = Arc::new(ScriptedLayer::slow(Duration::from_millis(50)));
    let mut shell = shell_with(&layer, 2_000);

    shell.on_primary_surface_shown();
    shell.select_data_source(source()).unwrap();
    shell.pump();
    assert_eq!(shell.state(), Some(AppState::LoadingDataSource));

    shell.request_quit().unwrap();
    std::thread::sleep(Duration::from_millis(300));
    shell.pump();

    assert_eq!(shell.state(), Some(AppState::Shutdown));
    assert_eq!(shell.failure(), None);
    assert_eq!(shell.exit_status(), Some(0));
    assert!(!shell.is_loading());
    assert_eq!(layer.counts(), (1, 1, 1));
}
