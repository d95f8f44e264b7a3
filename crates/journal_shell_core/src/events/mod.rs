//! Typed lifecycle events and the publish/subscribe bus.
//!
//! # Responsibility
//! - Enumerate every event the session core emits.
//! - Deliver events synchronously to subscribers of a topic.

mod bus;

pub use bus::{EventBus, SubscriptionId};

use crate::model::app_state::AppState;
use crate::model::session::SessionId;
use serde::Serialize;

/// Routing key for subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Journal,
    AppState,
}

/// Discriminant used to filter events within a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    JournalTileUpdated,
    JournalFocused,
    AppStateChanged,
}

/// Landing-page tile projection of one journal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JournalTile {
    pub folder: String,
    pub title: String,
    pub can_delete: bool,
    pub last_edited_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShellEvent {
    /// A journal was opened, closed or deleted; tiles should refresh.
    JournalTileUpdated(JournalTile),
    /// An open request resolved to an already live session.
    JournalFocused { session: SessionId, title: String },
    /// A state transition settled.
    AppStateChanged {
        from: Option<AppState>,
        to: AppState,
    },
}

impl ShellEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::JournalTileUpdated(_) => EventKind::JournalTileUpdated,
            Self::JournalFocused { .. } => EventKind::JournalFocused,
            Self::AppStateChanged { .. } => EventKind::AppStateChanged,
        }
    }
}
