//! StudySync CLI
//!
//! Command-line interface for StudySync - study progress tracking with
//! sync through a GitHub Gist.

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use studysync_core::Config;

mod app;
mod commands;
mod output;
mod prompt;

use app::App;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "studysync")]
#[command(about = "StudySync - study progress tracking with gist-backed sync")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file to use instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enable sync with a GitHub token
    Setup {
        /// Token with the gist scope (or set STUDYSYNC_TOKEN)
        #[arg(long)]
        token: Option<String>,
    },
    /// Disable sync and forget the token
    Disable,
    /// Show sync status
    Status,
    /// Merge local and remote progress
    Sync,
    /// Replace remote progress with local progress
    Push,
    /// Replace local progress with remote progress
    Pull,
    /// Mark an item complete
    #[command(alias = "done")]
    Complete {
        /// Item ID
        id: String,
        /// Completion time (RFC 3339 or YYYY-MM-DD), defaults to now
        #[arg(long)]
        at: Option<String>,
    },
    /// List completed items
    #[command(alias = "ls")]
    List,
    /// Manage the remote document
    Remote {
        #[command(subcommand)]
        command: RemoteCommands,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum RemoteCommands {
    /// Delete the remote progress document
    #[command(alias = "rm")]
    Delete {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, api_url, auto_sync, ...)
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

    // Config commands don't need the state file
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), config_path, &output);
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    init_logging(&config);

    let app = App::open(config)?;

    match cli.command {
        Commands::Setup { token } => commands::setup::setup(&app, token, &output).await,
        Commands::Disable => commands::setup::disable(&app, &output),
        Commands::Status => commands::status::show(&app, &output),
        Commands::Sync => commands::sync::sync(&app, &output).await,
        Commands::Push => commands::sync::push(&app, &output).await,
        Commands::Pull => commands::sync::pull(&app, &output).await,
        Commands::Complete { id, at } => {
            let changed = commands::progress::complete(&app, id, at, &output)?;
            // Sync after write commands (to push changes)
            if changed {
                auto_sync(&app, &output).await;
            }
            Ok(())
        }
        Commands::List => commands::progress::list(&app, &output),
        Commands::Remote {
            command: RemoteCommands::Delete { yes },
        } => commands::remote::delete(&app, yes, &output).await,
        Commands::Config { .. } => Ok(()), // Handled above
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

/// Install a tracing subscriber when STUDYSYNC_LOG is set
///
/// Logs go to `log_file` when configured, stderr otherwise.
fn init_logging(config: &Config) {
    let Ok(log_level) = std::env::var("STUDYSYNC_LOG") else {
        return;
    };

    let env_filter = EnvFilter::new(format!(
        "studysync_core={},studysync_cli={}",
        log_level, log_level
    ));

    let result = match &config.log_file {
        Some(path) => match File::create(path) {
            Ok(file) => tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(file)
                .try_init(),
            Err(e) => {
                eprintln!("Warning: Could not create log file {:?}: {}", path, e);
                return;
            }
        },
        None => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init(),
    };

    // Ignore error if already initialized
    if result.is_ok() {
        info!("Logging initialized at level {}", log_level);
    }
}

/// Auto-sync if enabled; failures only warn
async fn auto_sync(app: &App, output: &Output) {
    if !app.config.auto_sync || !app.orchestrator.is_enabled() {
        debug!("Auto-sync skipped");
        return;
    }

    if let Err(e) = commands::sync::sync_quiet(app).await {
        output.warn(&format!("Auto-sync failed: {:#}", e));
    }
}
