//! Shell logging bootstrap.
//!
//! # Responsibility
//! - Turn the `log_*` fields of `ShellConfig` into one rolling file logger.
//! - Capture panics (including load-worker panics) as log lines.
//!
//! # Invariants
//! - The logger starts at most once per process; a second start with the same
//!   settings is accepted, any other is rejected.
//! - A relative `log_dir` is anchored next to the preference file.
//! - Log lines are metadata-only: `event=... module=... status=...`.

use crate::config::ShellConfig;
use flexi_logger::{
    Cleanup, Criterion, FileSpec, FlexiLoggerError, Logger, LoggerHandle, Naming, WriteMode,
};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

const LOG_FILE_BASENAME: &str = "journal-shell";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();

struct ActiveLogger {
    settings: LogSettings,
    _handle: LoggerHandle,
}

/// Verbosity accepted in `ShellConfig::log_level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = LoggingError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(LoggingError::InvalidLevel(raw.to_string())),
        }
    }
}

#[derive(Debug)]
pub enum LoggingError {
    InvalidLevel(String),
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    Backend(FlexiLoggerError),
    /// A logger with other settings is already running.
    AlreadyStarted { active: PathBuf, requested: PathBuf },
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLevel(raw) => write!(
                f,
                "unsupported log level `{raw}`; expected trace|debug|info|warn|error"
            ),
            Self::CreateDir { path, source } => {
                write!(f, "failed to create log directory `{}`: {source}", path.display())
            }
            Self::Backend(err) => write!(f, "failed to start logger: {err}"),
            Self::AlreadyStarted { active, requested } => write!(
                f,
                "logging already started in `{}`; refusing to restart in `{}`",
                active.display(),
                requested.display()
            ),
        }
    }
}

impl Error for LoggingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CreateDir { source, .. } => Some(source),
            Self::Backend(err) => Some(err),
            _ => None,
        }
    }
}

/// Resolved logger settings for one shell configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LogLevel,
    pub dir: PathBuf,
}

impl LogSettings {
    /// Resolves settings from `config`; `None` when `log_dir` is unset.
    pub fn from_config(config: &ShellConfig) -> Result<Option<Self>, LoggingError> {
        let Some(log_dir) = config.log_dir.as_ref() else {
            return Ok(None);
        };
        Ok(Some(Self {
            level: config.log_level.parse()?,
            dir: anchor_log_dir(log_dir, config.preferences_path.as_deref()),
        }))
    }
}

/// Starts file logging as configured by `config`.
///
/// Returns `Ok(false)` when the config has no `log_dir` and logging stays off.
pub fn init_logging(config: &ShellConfig) -> Result<bool, LoggingError> {
    let Some(settings) = LogSettings::from_config(config)? else {
        return Ok(false);
    };

    let active = ACTIVE.get_or_try_init(|| start_logger(settings.clone(), config))?;
    if active.settings != settings {
        return Err(LoggingError::AlreadyStarted {
            active: active.settings.dir.clone(),
            requested: settings.dir,
        });
    }
    Ok(true)
}

/// Level used when the config does not name one.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        LogLevel::Debug.as_str()
    } else {
        LogLevel::Info.as_str()
    }
}

fn start_logger(settings: LogSettings, config: &ShellConfig) -> Result<ActiveLogger, LoggingError> {
    std::fs::create_dir_all(&settings.dir).map_err(|source| LoggingError::CreateDir {
        path: settings.dir.clone(),
        source,
    })?;

    let handle = Logger::try_with_str(settings.level.as_str())
        .map_err(LoggingError::Backend)?
        .log_to_file(
            FileSpec::default()
                .directory(settings.dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(LoggingError::Backend)?;

    install_panic_hook();
    info!(
        "event=shell_start module=logging status=ok version={} level={} prefs={} worker_threads={} grace_ms={}",
        env!("CARGO_PKG_VERSION"),
        settings.level.as_str(),
        if config.preferences_path.is_some() { "file" } else { "memory" },
        config.worker_threads,
        config.shutdown_load_grace_ms
    );

    Ok(ActiveLogger {
        settings,
        _handle: handle,
    })
}

fn anchor_log_dir(log_dir: &Path, preferences_path: Option<&Path>) -> PathBuf {
    if log_dir.is_absolute() {
        return log_dir.to_path_buf();
    }
    match preferences_path.and_then(Path::parent) {
        Some(base) => base.join(log_dir),
        None => log_dir.to_path_buf(),
    }
}

fn install_panic_hook() {
    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let thread = std::thread::current();
        let payload = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(
            "event=panic_captured module=logging status=error thread={} location={} payload={}",
            thread.name().unwrap_or("unnamed"),
            location,
            sanitize_message(&payload, MAX_PANIC_PAYLOAD_CHARS)
        );
        previous_hook(panic_info);
    }));
}

/// Flattens newlines and caps length; payloads may carry journal titles.
pub(crate) fn sanitize_message(value: &str, max_chars: usize) -> String {
    let normalized = value.replace(['\n', '\r'], " ");
    let mut truncated = normalized.chars().take(max_chars).collect::<String>();
    if normalized.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}
