//! Journal session lifecycle: live registry and preference persistence.
//!
//! # Responsibility
//! - Enforce one live session per logical name.
//! - Persist sessions through the `PreferenceStore` contract.
//!
//! # See also
//! - `crate::prefs` for the store contract.

pub mod persister;
pub mod registry;
