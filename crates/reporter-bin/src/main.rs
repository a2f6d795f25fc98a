//! youtrack-reporter - files fuzzing crashes as YouTrack issues.

mod app;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use reporter_config_and_utils::{init_logging, Config};

/// youtrack-reporter command-line interface.
#[derive(Parser)]
#[command(name = "youtrack-reporter")]
#[command(about = "Relay crash reports from the message bus to YouTrack")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// JSON configuration file. Environment variables override its values.
    #[arg(short, long, env = "YOUTRACK_REPORTER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reporter service (default)
    Run,
    /// Manage tracker integrations
    #[command(subcommand)]
    Integration(IntegrationCommand),
}

#[derive(Subcommand)]
pub enum IntegrationCommand {
    /// Create an integration and request its verification
    Create(ConnectionArgs),
    /// Print one integration
    Show { id: String },
    /// Replace an integration's connection and request its verification
    Update {
        id: String,
        #[command(flatten)]
        connection: ConnectionArgs,
    },
    /// Delete an integration
    Delete { id: String },
    /// Print every integration
    List,
}

#[derive(Args)]
pub struct ConnectionArgs {
    /// YouTrack base URL
    #[arg(long)]
    pub url: String,
    /// Permanent token
    #[arg(long, env = "YOUTRACK_TOKEN", hide_env_values = true)]
    pub token: String,
    /// Project name
    #[arg(long)]
    pub project: String,
    /// Revision to tag this write with. Defaults to a fresh UUID on create.
    #[arg(long)]
    pub update_rev: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    config.validate()?;
    init_logging(&config)?;

    match cli.command {
        Some(Commands::Run) | None => app::run_service(config).await,
        Some(Commands::Integration(command)) => app::run_admin(config, command).await,
    }
}
