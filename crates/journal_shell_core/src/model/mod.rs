//! Domain model for journal sessions and application state.
//!
//! # Invariants
//! - Sessions are identified by `SessionId` while live and by folder name
//!   once persisted.
//! - Closing is a soft delete: `can_delete` flips, records stay.

pub mod app_state;
pub mod session;
