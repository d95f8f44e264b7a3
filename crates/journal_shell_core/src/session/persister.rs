//! Journal window preference persistence.
//!
//! # Responsibility
//! - Write live session geometry/metadata into per-journal preference nodes.
//! - Read persisted journal records back as `SessionSettings`.
//! - Maintain the known-folder index under `journal-window/journal_names`.
//!
//! # Invariants
//! - A save cycle never shrinks the known-folder index: previously known
//!   folders are kept, folders written in this cycle are appended.
//! - When the previous index cannot be read, it is left untouched.
//! - One session's flush failure does not stop the other sessions' writes.
//! - Geometry is stored as `f64` and read back without rounding.

use crate::model::session::{now_epoch_seconds, Session, SessionSettings, WindowGeometry};
use crate::prefs::{child_path, PrefError, PrefResult, PreferenceStore};
use log::{error, info, warn};

/// Group node holding every journal folder and the folder index.
pub const JOURNAL_WINDOW_NODE: &str = "journal-window";
/// List key of the known-folder index inside `JOURNAL_WINDOW_NODE`.
pub const JOURNAL_NAMES_KEY: &str = "journal_names";

pub const JOURNAL_TITLE: &str = "journal_title";
pub const JOURNAL_XPOS: &str = "journal_xpos";
pub const JOURNAL_YPOS: &str = "journal_ypos";
pub const JOURNAL_WIDTH: &str = "journal_width";
pub const JOURNAL_HEIGHT: &str = "journal_height";
pub const JOURNAL_AUTHOR: &str = "journal_author";
pub const JOURNAL_CREATED: &str = "journal_created";
pub const JOURNAL_LAST_EDIT: &str = "journal_last_edit";
pub const CAN_DELETE: &str = "can_delete";

/// Per-session write failure recorded by `save`.
#[derive(Debug)]
pub struct SessionWriteFailure {
    pub folder: String,
    pub error: PrefError,
}

/// Outcome of one save cycle.
#[derive(Debug, Default)]
pub struct SaveReport {
    /// Folders whose node was written and flushed.
    pub written: Vec<String>,
    /// Sessions whose write was lost for this cycle.
    pub failed: Vec<SessionWriteFailure>,
    /// Known-folder index after the cycle (empty when it could not be read).
    pub index: Vec<String>,
    pub index_error: Option<PrefError>,
}

impl SaveReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.index_error.is_none()
    }
}

/// Translates sessions to preference writes and back.
pub struct WindowPreferencePersister<S: PreferenceStore> {
    store: S,
}

impl<S: PreferenceStore> WindowPreferencePersister<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Persists every given session, then reconciles the folder index.
    ///
    /// # Side effects
    /// - Flushes each journal node, the group node and the root, then syncs.
    /// - A session whose write fails is discarded for this cycle and left out
    ///   of the index.
    /// - Failures are logged and reported, never returned as `Err`.
    pub fn save(&mut self, sessions: &[Session]) -> SaveReport {
        let mut report = SaveReport::default();
        let edited_at = now_epoch_seconds();

        for session in sessions {
            match self.write_session(session, edited_at) {
                Ok(()) => report.written.push(session.folder.clone()),
                Err(err) => {
                    error!(
                        "event=journal_save module=session status=error folder={} error={}",
                        session.folder, err
                    );
                    self.abort_session_write(&session.folder);
                    report.failed.push(SessionWriteFailure {
                        folder: session.folder.clone(),
                        error: err,
                    });
                }
            }
        }

        match self.reconcile_index(&report.written) {
            Ok(index) => report.index = index,
            Err(err) => {
                error!("event=journal_index_save module=session status=error error={err}");
                report.index_error = Some(err);
            }
        }

        info!(
            "event=journal_save module=session status={} written={} failed={} known={}",
            if report.is_clean() { "ok" } else { "partial" },
            report.written.len(),
            report.failed.len(),
            report.index.len()
        );
        report
    }

    /// Reads one journal record back.
    ///
    /// Absent, partial, mistyped or invalid geometry yields `geometry: None`
    /// (maximized layout). Only store failures are returned as errors.
    pub fn restore(&self, folder: &str) -> PrefResult<SessionSettings> {
        let node = journal_node(folder)?;

        let title = lenient(&node, JOURNAL_TITLE, self.store.get_str(&node, JOURNAL_TITLE))?
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| folder.to_string());

        let x = lenient(&node, JOURNAL_XPOS, self.store.get_f64(&node, JOURNAL_XPOS))?;
        let y = lenient(&node, JOURNAL_YPOS, self.store.get_f64(&node, JOURNAL_YPOS))?;
        let width = lenient(&node, JOURNAL_WIDTH, self.store.get_f64(&node, JOURNAL_WIDTH))?;
        let height = lenient(&node, JOURNAL_HEIGHT, self.store.get_f64(&node, JOURNAL_HEIGHT))?;
        let geometry = match (x, y, width, height) {
            (Some(x), Some(y), Some(width), Some(height)) => {
                let geometry = WindowGeometry::new(x, y, width, height);
                match geometry.validate() {
                    Ok(()) => Some(geometry),
                    Err(err) => {
                        warn!("event=journal_restore module=session status=fallback folder={folder} reason={err}");
                        None
                    }
                }
            }
            (None, None, None, None) => None,
            _ => {
                warn!("event=journal_restore module=session status=fallback folder={folder} reason=partial_geometry");
                None
            }
        };

        Ok(SessionSettings {
            title,
            geometry,
            author_label: lenient(&node, JOURNAL_AUTHOR, self.store.get_str(&node, JOURNAL_AUTHOR))?,
            created_at: lenient(&node, JOURNAL_CREATED, self.store.get_i64(&node, JOURNAL_CREATED))?,
            last_edited_at: lenient(
                &node,
                JOURNAL_LAST_EDIT,
                self.store.get_i64(&node, JOURNAL_LAST_EDIT),
            )?,
            can_delete: lenient(&node, CAN_DELETE, self.store.get_bool(&node, CAN_DELETE))?
                .unwrap_or(false),
        })
    }

    /// Returns the known-folder index in stored order.
    pub fn known_folders(&self) -> PrefResult<Vec<String>> {
        self.store.get_list(JOURNAL_WINDOW_NODE, JOURNAL_NAMES_KEY)
    }

    pub fn is_known(&self, folder: &str) -> PrefResult<bool> {
        Ok(self.known_folders()?.iter().any(|known| known == folder))
    }

    /// Restores every indexed journal, in index order.
    pub fn known_journals(&self) -> PrefResult<Vec<(String, SessionSettings)>> {
        self.known_folders()?
            .into_iter()
            .map(|folder| {
                let settings = self.restore(&folder)?;
                Ok((folder, settings))
            })
            .collect()
    }

    /// Removes a journal folder and its index entry.
    ///
    /// Returns `false` when the folder was not indexed. Callers enforce the
    /// `can_delete` gate; this is the only path that shrinks the index.
    pub fn delete_folder(&mut self, folder: &str) -> PrefResult<bool> {
        let node = journal_node(folder)?;
        let mut index = self.known_folders()?;
        let before = index.len();
        index.retain(|known| known != folder);
        if index.len() == before {
            return Ok(false);
        }

        self.store.remove_node(&node)?;
        self.store
            .put_list(JOURNAL_WINDOW_NODE, JOURNAL_NAMES_KEY, &index)?;
        self.store.flush(JOURNAL_WINDOW_NODE)?;
        info!("event=journal_delete module=session status=ok folder={folder}");
        Ok(true)
    }

    fn write_session(&mut self, session: &Session, edited_at: i64) -> PrefResult<()> {
        let node = journal_node(&session.folder)?;
        let store = &mut self.store;

        store.put_str(&node, JOURNAL_TITLE, &session.title)?;
        if let Some(geometry) = session.geometry {
            store.put_f64(&node, JOURNAL_XPOS, geometry.x)?;
            store.put_f64(&node, JOURNAL_YPOS, geometry.y)?;
            store.put_f64(&node, JOURNAL_WIDTH, geometry.width)?;
            store.put_f64(&node, JOURNAL_HEIGHT, geometry.height)?;
        }
        store.put_str(&node, JOURNAL_AUTHOR, &session.author_label)?;
        store.put_i64(&node, JOURNAL_CREATED, session.created_at)?;
        store.put_i64(&node, JOURNAL_LAST_EDIT, edited_at)?;
        store.put_bool(&node, CAN_DELETE, session.can_delete)?;
        store.flush(&node)
    }

    /// Drops the half-written record so a later group flush cannot persist
    /// it outside the index.
    fn abort_session_write(&mut self, folder: &str) {
        let Ok(node) = journal_node(folder) else {
            return;
        };
        if let Err(err) = self.store.discard(&node) {
            warn!("event=journal_save module=session status=discard_failed folder={folder} error={err}");
        }
    }

    fn reconcile_index(&mut self, written: &[String]) -> PrefResult<Vec<String>> {
        let mut index = self.known_folders()?;
        for folder in written {
            if !index.contains(folder) {
                index.push(folder.clone());
            }
        }

        self.store
            .put_list(JOURNAL_WINDOW_NODE, JOURNAL_NAMES_KEY, &index)?;
        self.store.flush(JOURNAL_WINDOW_NODE)?;
        self.store.flush("")?;
        self.store.sync()?;
        Ok(index)
    }
}

/// Preference node path of one journal folder.
pub fn journal_node(folder: &str) -> PrefResult<String> {
    if folder.is_empty() || folder.contains('/') || folder.trim() != folder {
        return Err(PrefError::InvalidPath(folder.to_string()));
    }
    Ok(child_path(JOURNAL_WINDOW_NODE, folder))
}

fn lenient<T>(node: &str, key: &str, value: PrefResult<Option<T>>) -> PrefResult<Option<T>> {
    match value {
        Err(err @ PrefError::TypeMismatch { .. }) => {
            warn!("event=journal_restore module=session status=fallback node={node} key={key} reason={err}");
            Ok(None)
        }
        other => other,
    }
}
