//! journal-shell: headless driver for the journal session core.
//!
//! ## Subcommands
//!
//! - `demo`: run the whole lifecycle without a window system
//! - `journals`: print persisted journal records as JSON
//! - `version`: print the core version

use clap::{Parser, Subcommand};
use journal_shell_core::{
    init_logging, DataSource, DirectoryDataLayer, HeadlessUi, JournalShell, ShellConfig,
    SqlitePreferenceStore, UiAction, WindowPreferencePersister,
};
use log::{error, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const LOAD_WAIT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "journal-shell")]
#[command(about = "Headless driver for the journal session core")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run select -> load -> open journals -> shutdown headlessly
    Demo {
        /// TOML configuration file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// SQLite preference file (overrides the config)
        #[arg(long, value_name = "FILE")]
        prefs: Option<PathBuf>,

        /// Data-source directory to load
        #[arg(long, value_name = "DIR")]
        source: Option<PathBuf>,

        /// Journal titles to open; every one but the last is closed again
        #[arg(long = "journal", value_name = "TITLE")]
        journals: Vec<String>,
    },

    /// Print persisted journal records as JSON
    Journals {
        /// SQLite preference file
        #[arg(long, value_name = "FILE")]
        prefs: PathBuf,
    },

    /// Print the core version
    Version,
}

fn main() {
    let cli = Cli::parse();

    let status = match cli.command {
        Commands::Demo {
            config,
            prefs,
            source,
            journals,
        } => run_demo(config.as_deref(), prefs, source, &journals).unwrap_or_else(|err| {
            eprintln!("journal-shell demo failed: {err}");
            1
        }),
        Commands::Journals { prefs } => match print_journals(&prefs) {
            Ok(()) => 0,
            Err(err) => {
                eprintln!("journal-shell journals failed: {err}");
                1
            }
        },
        Commands::Version => {
            println!("journal_shell_core version={}", journal_shell_core::core_version());
            0
        }
    };
    std::process::exit(status);
}

fn run_demo(
    config_path: Option<&Path>,
    prefs: Option<PathBuf>,
    source: Option<PathBuf>,
    journals: &[String],
) -> Result<i32, String> {
    let mut config = match config_path {
        Some(path) => ShellConfig::load(path).map_err(|err| err.to_string())?,
        None => ShellConfig::default(),
    };
    if prefs.is_some() {
        config.preferences_path = prefs;
    }
    if let Err(err) = init_logging(&config) {
        eprintln!("journal-shell logging disabled: {err}");
    }

    let store = match config.preferences_path.as_ref() {
        Some(path) => SqlitePreferenceStore::open(path),
        None => SqlitePreferenceStore::open_in_memory(),
    }
    .map_err(|err| err.to_string())?;

    let data_layer = Arc::new(DirectoryDataLayer::new());
    let mut shell = JournalShell::new(config, store, HeadlessUi::new(), data_layer)
        .map_err(|err| err.to_string())?;
    if let Err(err) = shell.shutdown_hook().install_signal_handler() {
        warn!("event=signal_handler module=cli status=error error={err}");
    }

    shell.on_primary_surface_shown();
    shell.pump();

    if let Some(dir) = source {
        let name = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());
        shell
            .select_data_source(DataSource::new(name, dir))
            .map_err(|err| err.to_string())?;
        shell.pump_blocking(LOAD_WAIT);
    }

    let mut opened = Vec::new();
    for title in journals {
        match shell.open_journal(title) {
            Ok(outcome) => opened.push(outcome.id()),
            Err(err) => error!("event=journal_open module=cli status=error error={err}"),
        }
    }
    if let Some((_, closing)) = opened.split_last() {
        for id in closing {
            shell.close_journal(*id);
        }
    }

    if !shell.is_terminated() {
        if let Err(err) = shell.request_quit() {
            warn!("event=quit module=cli status=error error={err}");
        }
        shell.pump();
    }

    for action in shell.ui().actions() {
        match action {
            UiAction::Show { title, layout, .. } => println!("show {title} {layout:?}"),
            UiAction::Focus { session } => println!("focus {session}"),
            UiAction::Navigate(route) => println!("navigate {}", route.path()),
            UiAction::Exit => println!("exit"),
        }
    }
    if let Some(reason) = shell.failure() {
        println!("failure {reason}");
    }
    Ok(shell.exit_status().unwrap_or(1))
}

fn print_journals(prefs: &Path) -> Result<(), String> {
    let store = SqlitePreferenceStore::open(prefs).map_err(|err| err.to_string())?;
    let persister = WindowPreferencePersister::new(store);
    let records: Vec<serde_json::Value> = persister
        .known_journals()
        .map_err(|err| err.to_string())?
        .into_iter()
        .map(|(folder, settings)| serde_json::json!({ "folder": folder, "settings": settings }))
        .collect();
    let rendered = serde_json::to_string_pretty(&records).map_err(|err| err.to_string())?;
    println!("{rendered}");
    Ok(())
}
