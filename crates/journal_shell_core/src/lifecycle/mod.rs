//! Application lifecycle: state machine, background loading and shutdown.
//!
//! # Responsibility
//! - Own the transition rules and the serial dispatch queue.
//! - Run data-source loads off the owning thread.
//! - Tear the process down in a fixed order, once.

pub mod hook;
pub mod loader;
pub mod shutdown;
pub mod state_machine;
pub mod worker;
