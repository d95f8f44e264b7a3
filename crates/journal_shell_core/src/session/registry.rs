//! Live journal session registry.
//!
//! # Responsibility
//! - Hold every live session, keyed by its logical title.
//! - Resolve open requests to "focus existing" or "create new".
//! - Persist and announce sessions as they open and close.
//!
//! # Invariants
//! - At most one live session per title; a second open for the same title
//!   always focuses the first and returns its handle.
//! - Closing persists before removal and never deletes the journal record.
//! - Closing a handle that is not live is a no-op.

use crate::events::{EventBus, JournalTile, ShellEvent, Topic};
use crate::model::session::{
    folder_name_for_title, now_epoch_seconds, Session, SessionId, SessionSettings,
    SessionValidationError, WindowGeometry, WindowLayout,
};
use crate::prefs::{PrefError, PrefResult, PreferenceStore};
use crate::session::persister::{SaveReport, WindowPreferencePersister};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors from registry operations.
#[derive(Debug)]
pub enum RegistryError {
    Validation(SessionValidationError),
    Prefs(PrefError),
    /// Journal folder belongs to a live session.
    JournalLive(String),
    /// Stored record does not allow deletion yet.
    NotDeletable(String),
    /// Folder is not in the known-folder index.
    UnknownJournal(String),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Prefs(err) => write!(f, "{err}"),
            Self::JournalLive(folder) => write!(f, "journal `{folder}` is still open"),
            Self::NotDeletable(folder) => write!(f, "journal `{folder}` is not deletable"),
            Self::UnknownJournal(folder) => write!(f, "journal `{folder}` is not known"),
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Prefs(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SessionValidationError> for RegistryError {
    fn from(value: SessionValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<PrefError> for RegistryError {
    fn from(value: PrefError) -> Self {
        Self::Prefs(value)
    }
}

/// Result of an open request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpenOutcome {
    /// A new session was created; the UI shows it with `layout`.
    Created { id: SessionId, layout: WindowLayout },
    /// A live session with the same title was brought to the foreground.
    Focused { id: SessionId },
}

impl OpenOutcome {
    pub fn id(&self) -> SessionId {
        match self {
            Self::Created { id, .. } | Self::Focused { id } => *id,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created { .. })
    }
}

/// Result of a close request.
#[derive(Debug)]
pub enum CloseOutcome {
    Closed { session: Session, report: SaveReport },
    NotLive,
}

/// In-memory catalog of live sessions.
pub struct SessionRegistry<S: PreferenceStore> {
    sessions: BTreeMap<String, Session>,
    persister: WindowPreferencePersister<S>,
    bus: EventBus,
    default_author: String,
    foreground: Option<SessionId>,
}

impl<S: PreferenceStore> SessionRegistry<S> {
    pub fn new(store: S, bus: EventBus, default_author: impl Into<String>) -> Self {
        Self {
            sessions: BTreeMap::new(),
            persister: WindowPreferencePersister::new(store),
            bus,
            default_author: default_author.into(),
            foreground: None,
        }
    }

    /// Focuses the live session named `name`, or creates one from `settings`.
    ///
    /// Without settings (first run) the new session uses the maximized layout.
    pub fn open_or_focus(
        &mut self,
        name: &str,
        settings: Option<SessionSettings>,
    ) -> RegistryResult<OpenOutcome> {
        let title = name.trim();
        if title.is_empty() {
            return Err(SessionValidationError::BlankTitle.into());
        }

        if let Some(existing) = self.sessions.get(title) {
            let id = existing.id;
            self.foreground = Some(id);
            debug!("event=journal_open module=session status=focused folder={}", existing.folder);
            self.bus.publish(
                Topic::Journal,
                &ShellEvent::JournalFocused {
                    session: id,
                    title: title.to_string(),
                },
            );
            return Ok(OpenOutcome::Focused { id });
        }

        let mut settings = settings.unwrap_or_else(|| SessionSettings::new(title));
        settings.title = title.to_string();
        let session = Session::from_settings(&settings, &self.default_author)?;
        let outcome = OpenOutcome::Created {
            id: session.id,
            layout: session.layout(),
        };

        info!(
            "event=journal_open module=session status=created folder={} layout={}",
            session.folder,
            match session.layout() {
                WindowLayout::Restored(_) => "restored",
                WindowLayout::Maximized => "maximized",
            }
        );
        self.bus.publish(
            Topic::Journal,
            &ShellEvent::JournalTileUpdated(tile_for(&session)),
        );
        self.foreground = Some(session.id);
        self.sessions.insert(session.title.clone(), session);
        Ok(outcome)
    }

    /// Opens `name`, restoring persisted settings when its folder is known.
    ///
    /// Unreadable settings degrade to the maximized layout instead of failing.
    pub fn open_or_restore(&mut self, name: &str) -> RegistryResult<OpenOutcome> {
        if self.sessions.contains_key(name.trim()) {
            return self.open_or_focus(name, None);
        }

        let folder = folder_name_for_title(name);
        let settings = match self.restore_known(&folder) {
            Ok(settings) => settings,
            Err(err) => {
                warn!("event=journal_restore module=session status=fallback folder={folder} error={err}");
                None
            }
        };
        self.open_or_focus(name, settings)
    }

    /// Closes a live session: persists it with `can_delete=true`, removes it
    /// and announces the tile update.
    pub fn close(&mut self, id: SessionId) -> CloseOutcome {
        let Some(title) = self
            .sessions
            .values()
            .find(|session| session.id == id)
            .map(|session| session.title.clone())
        else {
            debug!("event=journal_close module=session status=skipped reason=not_live");
            return CloseOutcome::NotLive;
        };

        if let Some(session) = self.sessions.get_mut(&title) {
            session.can_delete = true;
        }
        let live = self.list_live();
        let report = self.persister.save(&live);

        let Some(mut session) = self.sessions.remove(&title) else {
            return CloseOutcome::NotLive;
        };
        session.last_edited_at = now_epoch_seconds();
        if self.foreground == Some(id) {
            self.foreground = None;
        }

        info!(
            "event=journal_close module=session status={} folder={}",
            if report.is_clean() { "ok" } else { "partial" },
            session.folder
        );
        self.bus.publish(
            Topic::Journal,
            &ShellEvent::JournalTileUpdated(tile_for(&session)),
        );
        CloseOutcome::Closed { session, report }
    }

    /// Snapshot of every live session.
    pub fn list_live(&self) -> Vec<Session> {
        self.sessions.values().cloned().collect()
    }

    /// Persists every live session without closing any.
    pub fn save_all(&mut self) -> SaveReport {
        let live = self.list_live();
        self.persister.save(&live)
    }

    /// Records a UI-reported move or resize. Returns `false` for unknown handles.
    pub fn update_geometry(
        &mut self,
        id: SessionId,
        geometry: WindowGeometry,
    ) -> RegistryResult<bool> {
        geometry.validate()?;
        match self.sessions.values_mut().find(|session| session.id == id) {
            Some(session) => {
                session.geometry = Some(geometry);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.values().find(|session| session.id == id)
    }

    pub fn find_by_title(&self, title: &str) -> Option<&Session> {
        self.sessions.get(title.trim())
    }

    /// Handle most recently opened or focused, while still live.
    pub fn foreground(&self) -> Option<SessionId> {
        self.foreground
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Tiles for every persisted journal; live journals report `can_delete=false`.
    pub fn known_journals(&self) -> RegistryResult<Vec<JournalTile>> {
        let tiles = self
            .persister
            .known_journals()?
            .into_iter()
            .map(|(folder, settings)| {
                let live = self.sessions.values().any(|session| session.folder == folder);
                JournalTile {
                    folder,
                    title: settings.title,
                    can_delete: settings.can_delete && !live,
                    last_edited_at: settings.last_edited_at,
                }
            })
            .collect();
        Ok(tiles)
    }

    /// Permanently deletes a closed journal record.
    pub fn delete_closed(&mut self, folder: &str) -> RegistryResult<()> {
        if self.sessions.values().any(|session| session.folder == folder) {
            return Err(RegistryError::JournalLive(folder.to_string()));
        }
        if !self.persister.is_known(folder)? {
            return Err(RegistryError::UnknownJournal(folder.to_string()));
        }
        if !self.persister.restore(folder)?.can_delete {
            return Err(RegistryError::NotDeletable(folder.to_string()));
        }
        if !self.persister.delete_folder(folder)? {
            return Err(RegistryError::UnknownJournal(folder.to_string()));
        }
        Ok(())
    }

    pub fn persister(&self) -> &WindowPreferencePersister<S> {
        &self.persister
    }

    pub fn persister_mut(&mut self) -> &mut WindowPreferencePersister<S> {
        &mut self.persister
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    fn restore_known(&self, folder: &str) -> PrefResult<Option<SessionSettings>> {
        if !self.persister.is_known(folder)? {
            return Ok(None);
        }
        self.persister.restore(folder).map(Some)
    }
}

fn tile_for(session: &Session) -> JournalTile {
    JournalTile {
        folder: session.folder.clone(),
        title: session.title.clone(),
        can_delete: session.can_delete,
        last_edited_at: Some(session.last_edited_at),
    }
}
