//! Journal session domain model.
//!
//! # Responsibility
//! - Define the live `Session` record and the settings it is built from.
//! - Derive stable preference folder names from session titles.
//!
//! # Invariants
//! - `title` is non-blank; it is the logical name used for deduplication.
//! - `folder` is a pure function of `title` (see `folder_name_for_title`).
//! - `can_delete` is `false` while the session is live.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Handle for one live session. Never reused across opens.
pub type SessionId = Uuid;

const FOLDER_HASH_CHARS: usize = 8;

static UNSAFE_FOLDER_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]+").expect("valid folder char regex"));

/// Window position and size, in screen units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowGeometry {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl WindowGeometry {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Validates that every field is finite and the size is positive.
    pub fn validate(&self) -> Result<(), SessionValidationError> {
        let finite = [self.x, self.y, self.width, self.height]
            .iter()
            .all(|value| value.is_finite());
        if !finite || self.width <= 0.0 || self.height <= 0.0 {
            return Err(SessionValidationError::InvalidGeometry(*self));
        }
        Ok(())
    }
}

/// How a window should be laid out when it is shown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowLayout {
    /// Apply previously persisted geometry.
    Restored(WindowGeometry),
    /// No usable geometry; the UI maximizes the window.
    Maximized,
}

/// Settings a session is opened with, either requested by the UI or restored
/// from preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    pub title: String,
    pub geometry: Option<WindowGeometry>,
    pub author_label: Option<String>,
    /// Unix epoch seconds.
    pub created_at: Option<i64>,
    /// Unix epoch seconds.
    pub last_edited_at: Option<i64>,
    pub can_delete: bool,
}

impl SessionSettings {
    /// Settings for a brand new session with default layout.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            geometry: None,
            author_label: None,
            created_at: None,
            last_edited_at: None,
            can_delete: false,
        }
    }

    pub fn with_geometry(mut self, geometry: WindowGeometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Layout implied by these settings. Invalid geometry falls back to maximized.
    pub fn layout(&self) -> WindowLayout {
        match self.geometry {
            Some(geometry) if geometry.validate().is_ok() => WindowLayout::Restored(geometry),
            _ => WindowLayout::Maximized,
        }
    }

    /// Preference folder derived from the title.
    pub fn folder(&self) -> String {
        folder_name_for_title(&self.title)
    }
}

/// One live journal window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub title: String,
    pub folder: String,
    /// `None` until a geometry is restored or reported by the UI.
    pub geometry: Option<WindowGeometry>,
    pub created_at: i64,
    pub last_edited_at: i64,
    pub author_label: String,
    pub can_delete: bool,
}

impl Session {
    /// Builds a live session from settings, filling timestamps and author.
    pub fn from_settings(
        settings: &SessionSettings,
        default_author: &str,
    ) -> Result<Self, SessionValidationError> {
        let title = settings.title.trim();
        if title.is_empty() {
            return Err(SessionValidationError::BlankTitle);
        }
        let now = now_epoch_seconds();
        Ok(Self {
            id: Uuid::new_v4(),
            title: title.to_string(),
            folder: folder_name_for_title(title),
            geometry: match settings.layout() {
                WindowLayout::Restored(geometry) => Some(geometry),
                WindowLayout::Maximized => None,
            },
            created_at: settings.created_at.unwrap_or(now),
            last_edited_at: settings.last_edited_at.unwrap_or(now),
            author_label: settings
                .author_label
                .clone()
                .filter(|label| !label.trim().is_empty())
                .unwrap_or_else(|| default_author.to_string()),
            can_delete: false,
        })
    }

    pub fn layout(&self) -> WindowLayout {
        self.geometry
            .map_or(WindowLayout::Maximized, WindowLayout::Restored)
    }
}

/// Validation errors for session construction.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionValidationError {
    BlankTitle,
    InvalidGeometry(WindowGeometry),
}

impl Display for SessionValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankTitle => write!(f, "session title must not be blank"),
            Self::InvalidGeometry(geometry) => write!(
                f,
                "invalid window geometry x={} y={} width={} height={}",
                geometry.x, geometry.y, geometry.width, geometry.height
            ),
        }
    }
}

impl Error for SessionValidationError {}

/// Derives the preference folder name for a session title.
///
/// Titles made only of `[A-Za-z0-9_-]` are used as-is. Anything else is
/// sanitized and suffixed with a UUID v5 digest of the full title, so two
/// titles that sanitize alike still get distinct folders.
pub fn folder_name_for_title(title: &str) -> String {
    let title = title.trim();
    if !title.is_empty() && !UNSAFE_FOLDER_CHARS.is_match(title) {
        return title.to_string();
    }

    let sanitized = UNSAFE_FOLDER_CHARS.replace_all(title, "_");
    let sanitized = sanitized.trim_matches('_');
    let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, title.as_bytes()).simple().to_string();
    let digest = &digest[..FOLDER_HASH_CHARS];
    if sanitized.is_empty() {
        format!("journal-{digest}")
    } else {
        format!("{sanitized}-{digest}")
    }
}

/// Wall-clock seconds since the Unix epoch; 0 if the clock is before it.
pub fn now_epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}
