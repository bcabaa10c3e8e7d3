//! Cadence CLI
//!
//! Command-line interface for Cadence - monthly content planning.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use cadence_core::{Config, Session};

mod commands;
mod logging;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Cadence - monthly content planner with autosave")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Work offline: edits are kept locally until the next sync
    #[arg(long, global = true)]
    offline: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Use a specific config file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the plan
    Show,
    /// Manage month sections
    Month {
        #[command(subcommand)]
        command: MonthCommands,
    },
    /// Edit weeks
    Week {
        #[command(subcommand)]
        command: WeekCommands,
    },
    /// Push the local backup to the remote store
    Sync,
    /// Show owner, remote and backup status
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum MonthCommands {
    /// Append a month
    #[command(alias = "create")]
    Add {
        /// Month title, e.g. "March"
        title: String,
        /// Goal for the month
        #[arg(short, long)]
        goal: Option<String>,
    },
    /// Remove a month
    #[command(alias = "rm")]
    Remove {
        /// Month number (1-based)
        number: usize,
    },
}

#[derive(Subcommand)]
enum WeekCommands {
    /// Set a field of one week
    Set {
        /// Month number (1-based)
        month: usize,
        /// Week number (1-4)
        week: usize,
        /// Field: theme, posts or notes
        field: String,
        /// New value
        value: String,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, remote_url, debounce_ms, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    // Config commands don't need a session
    if let Commands::Config { command } = &cli.command {
        logging::init(cli.verbose, None);
        return match command.clone() {
            Some(ConfigCommands::Show) | None => commands::config::show(config_path, &output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, config_path, &output)
            }
        };
    }

    let session = open_session(config_path, cli.verbose, !cli.offline).await?;

    match cli.command {
        Commands::Config { .. } => unreachable!(), // Handled above
        Commands::Show => commands::plan::show(&session, &output),
        Commands::Month { command } => match command {
            MonthCommands::Add { title, goal } => {
                commands::plan::month_add(&session, title, goal, &output).await
            }
            MonthCommands::Remove { number } => {
                commands::plan::month_remove(&session, number, &output).await
            }
        },
        Commands::Week { command } => match command {
            WeekCommands::Set {
                month,
                week,
                field,
                value,
            } => commands::plan::week_set(&session, month, week, field, value, &output).await,
        },
        Commands::Sync => commands::sync::sync(&session, &output).await,
        Commands::Status => commands::status::show(&session, &output),
    }
}

/// Load config, set up logging and open the owner's session
async fn open_session(config_path: Option<&PathBuf>, verbose: u8, online: bool) -> Result<Session> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    logging::init(verbose, config.log_file.as_deref());

    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    let owner = config.ensure_owner_id(&save_path)?;

    let session = Session::open(config, owner, online).await?;
    if let Some(e) = session.remote_error() {
        if e.is_auth() {
            eprintln!("⚠ Remote store rejected credentials: {}", e);
        } else {
            eprintln!("⚠ Remote store unavailable, using local data: {}", e);
        }
    }
    Ok(session)
}
