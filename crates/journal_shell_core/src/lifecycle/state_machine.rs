//! Queued application state machine.
//!
//! # Responsibility
//! - Validate requested transitions against the state they will follow.
//! - Queue accepted transitions so side effects run later, one at a time.
//!
//! # Invariants
//! - The initial state is entered at most once (`start`).
//! - A request is checked against the last queued state, or the settled
//!   state when the queue is empty.
//! - Once `Shutdown` is queued or settled every further request is rejected
//!   and the settled state never changes again.

use crate::model::app_state::AppState;
use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Rejected transition requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    /// The primary surface has not been shown yet.
    NotStarted,
    Invalid { from: AppState, to: AppState },
    /// Shutdown is queued or settled.
    Terminal,
}

impl Display for TransitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "application state machine has not started"),
            Self::Invalid { from, to } => write!(f, "invalid state transition {from} -> {to}"),
            Self::Terminal => write!(f, "application is shutting down"),
        }
    }
}

impl Error for TransitionError {}

/// One dequeued transition, ready for its side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Option<AppState>,
    pub to: AppState,
}

#[derive(Debug, Default)]
pub struct AppStateMachine {
    settled: Option<AppState>,
    pending: VecDeque<AppState>,
    started: bool,
}

impl AppStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settled state; `None` before the initial state is dispatched.
    pub fn state(&self) -> Option<AppState> {
        self.settled
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// True once `Shutdown` is settled.
    pub fn is_terminal(&self) -> bool {
        self.settled == Some(AppState::Shutdown)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Queues the initial state. Returns `false` on every call after the first.
    pub fn start(&mut self) -> bool {
        if self.started {
            return false;
        }
        self.started = true;
        self.pending.push_back(AppState::SelectDataSource);
        true
    }

    /// Validates and queues `to`.
    pub fn request(&mut self, to: AppState) -> Result<(), TransitionError> {
        if self.shutdown_requested() {
            return Err(TransitionError::Terminal);
        }
        let from = self
            .pending
            .back()
            .copied()
            .or(self.settled)
            .ok_or(TransitionError::NotStarted)?;
        if !from.can_transition_to(to) {
            return Err(TransitionError::Invalid { from, to });
        }
        self.pending.push_back(to);
        Ok(())
    }

    /// Drops queued transitions and queues `Shutdown`.
    ///
    /// Returns `false` when shutdown is already queued or settled.
    pub fn force_shutdown(&mut self) -> bool {
        if self.shutdown_requested() {
            return false;
        }
        self.started = true;
        self.pending.clear();
        self.pending.push_back(AppState::Shutdown);
        true
    }

    /// Settles the next queued transition and hands it to the dispatcher.
    pub fn next_transition(&mut self) -> Option<Transition> {
        if self.is_terminal() {
            self.pending.clear();
            return None;
        }
        let to = self.pending.pop_front()?;
        let from = self.settled.replace(to);
        Some(Transition { from, to })
    }

    /// True once `Shutdown` is queued or settled.
    pub fn shutdown_requested(&self) -> bool {
        self.is_terminal() || self.pending.contains(&AppState::Shutdown)
    }
}

#[cfg(test)]
mod tests {
    use super::{AppStateMachine, Transition, TransitionError};
    use crate::model::app_state::AppState;

    #[test]
    fn start_is_one_shot() {
        let mut machine = AppStateMachine::new();
        assert_eq!(
            machine.request(AppState::SelectedDataSource),
            Err(TransitionError::NotStarted)
        );
        assert!(machine.start());
        assert!(!machine.start());
        assert_eq!(
            machine.next_transition(),
            Some(Transition {
                from: None,
                to: AppState::SelectDataSource
            })
        );
        assert_eq!(machine.next_transition(), None);
    }

    #[test]
    fn requests_validate_against_queued_state() {
        let mut machine = AppStateMachine::new();
        machine.start();
        machine.request(AppState::SelectedDataSource).unwrap();
        machine.request(AppState::LoadingDataSource).unwrap();
        assert_eq!(
            machine.request(AppState::SelectedDataSource),
            Err(TransitionError::Invalid {
                from: AppState::LoadingDataSource,
                to: AppState::SelectedDataSource
            })
        );
        assert_eq!(machine.state(), None);

        let mut settled = Vec::new();
        while let Some(transition) = machine.next_transition() {
            settled.push(transition.to);
        }
        assert_eq!(
            settled,
            vec![
                AppState::SelectDataSource,
                AppState::SelectedDataSource,
                AppState::LoadingDataSource
            ]
        );
    }

    #[test]
    fn shutdown_is_terminal() {
        let mut machine = AppStateMachine::new();
        machine.start();
        machine.request(AppState::SelectedDataSource).unwrap();
        assert!(machine.force_shutdown());
        assert!(!machine.force_shutdown());
        assert_eq!(
            machine.request(AppState::Running),
            Err(TransitionError::Terminal)
        );

        let transition = machine.next_transition().unwrap();
        assert_eq!(transition.to, AppState::Shutdown);
        assert!(machine.is_terminal());
        assert_eq!(machine.next_transition(), None);
        assert_eq!(machine.request(AppState::Shutdown), Err(TransitionError::Terminal));
        assert_eq!(machine.state(), Some(AppState::Shutdown));
    }

    #[test]
    fn queued_shutdown_counts_as_requested_before_it_settles() {
        let mut machine = AppStateMachine::new();
        machine.start();
        assert!(!machine.shutdown_requested());
        machine.request(AppState::Shutdown).unwrap();
        assert!(machine.shutdown_requested());
        assert!(!machine.is_terminal());
    }
}
