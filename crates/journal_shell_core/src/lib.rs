//! Session lifecycle and persistence core for the journal shell.
//! This crate owns window sessions, application state and shutdown ordering.

pub mod config;
pub mod data;
pub mod db;
pub mod events;
pub mod lifecycle;
pub mod logging;
pub mod model;
pub mod prefs;
pub mod session;
pub mod shell;
pub mod ui;

pub use config::{ConfigError, ShellConfig};
pub use data::{DataLayerError, DataSource, DirectoryDataLayer, PrimitiveDataLayer};
pub use events::{EventBus, EventKind, JournalTile, ShellEvent, SubscriptionId, Topic};
pub use lifecycle::hook::ShutdownHook;
pub use lifecycle::shutdown::{LoadDrain, ShutdownReport, ShutdownStep};
pub use lifecycle::state_machine::{AppStateMachine, TransitionError};
pub use logging::{default_log_level, init_logging, LogLevel, LogSettings, LoggingError};
pub use model::app_state::AppState;
pub use model::session::{
    folder_name_for_title, Session, SessionId, SessionSettings, SessionValidationError,
    WindowGeometry, WindowLayout,
};
pub use prefs::{PrefError, PrefResult, PrefValue, PreferenceStore, SqlitePreferenceStore};
pub use session::persister::{SaveReport, WindowPreferencePersister};
pub use session::registry::{CloseOutcome, OpenOutcome, RegistryError, SessionRegistry};
pub use shell::{JournalShell, ShellCommand, ShellError, ShellResult};
pub use ui::{HeadlessUi, Route, UiAction, UiRuntime};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
