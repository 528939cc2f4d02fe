//! # Keel CLI
//!
//! Command-line front end for a Keel-managed settings file.
//!
//! ## Commands
//!
//! - `keel show` - Load (creating if needed) and print the settings
//! - `keel set <value>` - Change `ASingleString` and save
//! - `keel add <items>...` - Append to `ListOfStrings` and save
//! - `keel toggle` - Flip `SomeBoolean` and save
//! - `keel watch` - Print the settings every time another process edits them
//! - `keel config [--save]` - Print or write the effective configuration
//! - `keel probe [path]` - Report read/write access to a file
//! - `keel idle <path>` - Wait until a file or directory is no longer held
//!
//! ## Example Usage
//!
//! ```bash
//! # First run writes the defaults
//! keel --location ./cfg show
//!
//! # In another terminal, follow edits
//! keel --location ./cfg watch
//!
//! # Edit from a script, without prompts
//! keel --location ./cfg --headless set "hello"
//! ```

mod app;
mod commands;
mod demo;
mod ui;

use clap::{Parser, Subcommand};
use keel_core::SessionMode;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Keel - typed settings files with live reload
#[derive(Parser)]
#[command(name = "keel")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the settings file
    #[arg(short, long, global = true, env = "KEEL_LOCATION")]
    location: Option<PathBuf>,

    /// Never prompt or show progress
    #[arg(long, global = true)]
    headless: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the current settings
    Show {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        output: OutputFormat,
    },

    /// Set the single string value
    Set {
        /// New value
        value: String,
    },

    /// Append items to the string list
    Add {
        /// Items to append
        items: Vec<String>,
    },

    /// Flip the boolean value
    Toggle,

    /// Follow external edits of the settings file
    Watch,

    /// Print the effective configuration, or write it out
    Config {
        /// Write to the --config path (or the default location)
        #[arg(long)]
        save: bool,
    },

    /// Check read/write access to a file (defaults to the settings file)
    Probe {
        /// File to check
        path: Option<PathBuf>,
    },

    /// Wait until a file or every file in a directory can be opened
    Idle {
        /// File or directory
        path: PathBuf,

        /// Give up after this many attempts
        #[arg(short, long)]
        attempts: Option<u32>,

        /// Linear backoff steps between attempts
        #[arg(short, long)]
        backoff: Option<u32>,

        /// Judge a directory by its last file only
        #[arg(long)]
        last_file: bool,
    },
}

#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config.clone();
    let mut config = match &cli.config {
        Some(path) => keel_core::Config::load_from(path)?,
        None => keel_core::Config::load()?,
    };
    if let Some(location) = cli.location {
        config.general.location = Some(location);
    }
    if cli.headless {
        config.session.mode = SessionMode::Headless;
    }

    // Setup logging
    let log_level = if cli.quiet {
        "error".to_string()
    } else {
        match cli.verbose {
            0 => config.general.log_level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();

    // Execute command
    match cli.command {
        Commands::Show { output } => commands::show::run(config, output),
        Commands::Set { value } => commands::set::run(config, value),
        Commands::Add { items } => commands::add::run(config, items),
        Commands::Toggle => commands::toggle::run(config),
        Commands::Watch => commands::watch::run(config),
        Commands::Config { save } => commands::config::run(config, config_path, save),
        Commands::Probe { path } => commands::probe::run(config, path),
        Commands::Idle {
            path,
            attempts,
            backoff,
            last_file,
        } => commands::idle::run(config, path, attempts, backoff, last_file),
    }
}
