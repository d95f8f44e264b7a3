//! Application state lifecycle values.
//!
//! # Invariants
//! - The only implicit-free path is
//!   `SelectDataSource -> SelectedDataSource -> LoadingDataSource -> Running -> Shutdown`.
//! - Every state may move to `Shutdown`; nothing leaves `Shutdown`.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Top-level application state driving the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppState {
    SelectDataSource,
    SelectedDataSource,
    LoadingDataSource,
    Running,
    Shutdown,
}

impl AppState {
    /// Returns true when `self -> next` is an allowed transition.
    pub fn can_transition_to(self, next: AppState) -> bool {
        matches!(
            (self, next),
            (Self::SelectDataSource, Self::SelectedDataSource)
                | (Self::SelectedDataSource, Self::LoadingDataSource)
                | (Self::LoadingDataSource, Self::Running)
        ) || (next == Self::Shutdown && self != Self::Shutdown)
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Shutdown
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SelectDataSource => "SELECT_DATA_SOURCE",
            Self::SelectedDataSource => "SELECTED_DATA_SOURCE",
            Self::LoadingDataSource => "LOADING_DATA_SOURCE",
            Self::Running => "RUNNING",
            Self::Shutdown => "SHUTDOWN",
        }
    }
}

impl Display for AppState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::AppState;

    #[test]
    fn forward_path_is_allowed_and_skips_are_not() {
        assert!(AppState::SelectDataSource.can_transition_to(AppState::SelectedDataSource));
        assert!(AppState::SelectedDataSource.can_transition_to(AppState::LoadingDataSource));
        assert!(AppState::LoadingDataSource.can_transition_to(AppState::Running));
        assert!(!AppState::SelectDataSource.can_transition_to(AppState::Running));
        assert!(!AppState::Running.can_transition_to(AppState::SelectDataSource));
    }

    #[test]
    fn shutdown_is_reachable_from_everywhere_but_itself() {
        for state in [
            AppState::SelectDataSource,
            AppState::SelectedDataSource,
            AppState::LoadingDataSource,
            AppState::Running,
        ] {
            assert!(state.can_transition_to(AppState::Shutdown));
        }
        assert!(!AppState::Shutdown.can_transition_to(AppState::Shutdown));
        assert!(AppState::Shutdown.is_terminal());
    }
}
