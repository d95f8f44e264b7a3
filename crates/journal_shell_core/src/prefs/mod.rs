//! Hierarchical preference store contract.
//!
//! # Responsibility
//! - Define the key-value contract the session core persists through.
//! - Keep storage details (SQLite) behind the `PreferenceStore` trait.
//!
//! # Invariants
//! - Node paths are slash-delimited; `""` is the root node.
//! - Writes are buffered until `flush` covers their node.
//! - Every operation after `stop` fails with `PrefError::Stopped`.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod sqlite_store;

pub use sqlite_store::SqlitePreferenceStore;

pub type PrefResult<T> = Result<T, PrefError>;

/// Scalar or list value held by one preference key.
#[derive(Debug, Clone, PartialEq)]
pub enum PrefValue {
    String(String),
    Double(f64),
    Boolean(bool),
    Long(i64),
    List(Vec<String>),
}

impl PrefValue {
    /// Stable kind name, also used as the persisted `value_kind` column.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Double(_) => "double",
            Self::Boolean(_) => "boolean",
            Self::Long(_) => "long",
            Self::List(_) => "list",
        }
    }
}

/// Errors raised by preference store implementations.
#[derive(Debug)]
pub enum PrefError {
    /// Flush, sync or read could not reach durable storage.
    BackingStoreUnavailable {
        operation: &'static str,
        reason: String,
    },
    /// Opening or migrating the backing database failed.
    Db(DbError),
    /// The store has been stopped.
    Stopped,
    /// Node path is not a valid slash-delimited path.
    InvalidPath(String),
    /// Key exists but holds another value kind.
    TypeMismatch {
        node: String,
        key: String,
        expected: &'static str,
        found: &'static str,
    },
    /// Persisted row cannot be decoded.
    CorruptEntry {
        node: String,
        key: String,
        message: String,
    },
}

impl PrefError {
    pub fn unavailable(operation: &'static str, reason: impl Display) -> Self {
        Self::BackingStoreUnavailable {
            operation,
            reason: reason.to_string(),
        }
    }

    /// True for errors caused by the durable layer rather than by the caller.
    pub fn is_backing_store_failure(&self) -> bool {
        matches!(
            self,
            Self::BackingStoreUnavailable { .. } | Self::Db(_) | Self::CorruptEntry { .. }
        )
    }
}

impl Display for PrefError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BackingStoreUnavailable { operation, reason } => write!(
                f,
                "preference backing store unavailable during {operation}: {reason}"
            ),
            Self::Db(err) => write!(f, "{err}"),
            Self::Stopped => write!(f, "preference store has been stopped"),
            Self::InvalidPath(path) => write!(f, "invalid preference node path `{path}`"),
            Self::TypeMismatch {
                node,
                key,
                expected,
                found,
            } => write!(
                f,
                "preference `{node}`/`{key}` holds {found}, expected {expected}"
            ),
            Self::CorruptEntry { node, key, message } => {
                write!(f, "corrupt preference `{node}`/`{key}`: {message}")
            }
        }
    }
}

impl Error for PrefError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for PrefError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

/// Durable hierarchical key-value store with explicit flush/sync.
///
/// Implementations are driven from a single owning thread; `&mut self` on
/// writes is the only serialization the core relies on.
pub trait PreferenceStore {
    fn get(&self, node: &str, key: &str) -> PrefResult<Option<PrefValue>>;
    fn put(&mut self, node: &str, key: &str, value: PrefValue) -> PrefResult<()>;
    /// Removes a node and its whole subtree. The root cannot be removed.
    fn remove_node(&mut self, node: &str) -> PrefResult<()>;
    /// Pushes pending writes under `node` (inclusive) to durable storage.
    fn flush(&mut self, node: &str) -> PrefResult<()>;
    /// Drops pending writes under `node` (inclusive), restoring the last
    /// flushed values.
    fn discard(&mut self, node: &str) -> PrefResult<()>;
    /// Flushes everything, then refreshes the in-memory view from storage.
    fn sync(&mut self) -> PrefResult<()>;
    /// Flushes and releases the backing store.
    fn stop(&mut self) -> PrefResult<()>;

    fn get_str(&self, node: &str, key: &str) -> PrefResult<Option<String>> {
        typed(node, key, self.get(node, key)?, "string", |value| match value {
            PrefValue::String(v) => Ok(v),
            other => Err(other),
        })
    }

    fn get_f64(&self, node: &str, key: &str) -> PrefResult<Option<f64>> {
        typed(node, key, self.get(node, key)?, "double", |value| match value {
            PrefValue::Double(v) => Ok(v),
            other => Err(other),
        })
    }

    fn get_bool(&self, node: &str, key: &str) -> PrefResult<Option<bool>> {
        typed(node, key, self.get(node, key)?, "boolean", |value| match value {
            PrefValue::Boolean(v) => Ok(v),
            other => Err(other),
        })
    }

    fn get_i64(&self, node: &str, key: &str) -> PrefResult<Option<i64>> {
        typed(node, key, self.get(node, key)?, "long", |value| match value {
            PrefValue::Long(v) => Ok(v),
            other => Err(other),
        })
    }

    /// Missing lists read as empty.
    fn get_list(&self, node: &str, key: &str) -> PrefResult<Vec<String>> {
        let list = typed(node, key, self.get(node, key)?, "list", |value| match value {
            PrefValue::List(v) => Ok(v),
            other => Err(other),
        })?;
        Ok(list.unwrap_or_default())
    }

    fn put_str(&mut self, node: &str, key: &str, value: &str) -> PrefResult<()> {
        self.put(node, key, PrefValue::String(value.to_string()))
    }

    fn put_f64(&mut self, node: &str, key: &str, value: f64) -> PrefResult<()> {
        self.put(node, key, PrefValue::Double(value))
    }

    fn put_bool(&mut self, node: &str, key: &str, value: bool) -> PrefResult<()> {
        self.put(node, key, PrefValue::Boolean(value))
    }

    fn put_i64(&mut self, node: &str, key: &str, value: i64) -> PrefResult<()> {
        self.put(node, key, PrefValue::Long(value))
    }

    fn put_list(&mut self, node: &str, key: &str, values: &[String]) -> PrefResult<()> {
        self.put(node, key, PrefValue::List(values.to_vec()))
    }
}

fn typed<T>(
    node: &str,
    key: &str,
    value: Option<PrefValue>,
    expected: &'static str,
    extract: impl FnOnce(PrefValue) -> Result<T, PrefValue>,
) -> PrefResult<Option<T>> {
    match value {
        None => Ok(None),
        Some(value) => extract(value).map(Some).map_err(|other| PrefError::TypeMismatch {
            node: node.to_string(),
            key: key.to_string(),
            expected,
            found: other.kind(),
        }),
    }
}

/// Validates a slash-delimited node path. The empty path is the root.
pub fn validate_node_path(path: &str) -> PrefResult<()> {
    if path.is_empty() {
        return Ok(());
    }
    let valid = path
        .split('/')
        .all(|segment| !segment.is_empty() && segment.trim() == segment);
    if valid {
        Ok(())
    } else {
        Err(PrefError::InvalidPath(path.to_string()))
    }
}

/// Joins a child segment onto a parent node path.
pub fn child_path(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{parent}/{child}")
    }
}

/// True when `node` is `root` itself or lives below it.
pub fn is_in_subtree(node: &str, root: &str) -> bool {
    root.is_empty()
        || node == root
        || (node.len() > root.len() && node.starts_with(root) && node[root.len()..].starts_with('/'))
}
