//! Lorekeeper CLI — the main entry point.
//!
//! Commands:
//! - `build`    — Activate lore and render the prompt for a scenario
//! - `activate` — Show which entries a scenario activates
//! - `config`   — Show, locate, validate or print the default config

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod runtime;
mod scenario;

#[derive(Parser)]
#[command(
    name = "lorekeeper",
    about = "Lorekeeper — lorebook activation and prompt building",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.lorekeeper/config.toml)
    #[arg(short, long, global = true, env = "LOREKEEPER_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the prompt for one turn of a scenario
    Build {
        /// Scenario JSON file
        #[arg(short, long)]
        scenario: PathBuf,

        /// Use this SQLite database instead of the configured store
        #[arg(long)]
        db: Option<PathBuf>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run activation only and list the entries that fire
    Activate {
        /// Scenario JSON file
        #[arg(short, long)]
        scenario: PathBuf,

        /// Use this SQLite database instead of the configured store
        #[arg(long)]
        db: Option<PathBuf>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Validate the configuration
    Validate,
    /// Print the default configuration as TOML
    Default,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Build { scenario, db, json } => {
            commands::build::run(config_path, &scenario, db.as_deref(), json).await?
        }
        Commands::Activate { scenario, db, json } => {
            commands::activate::run(config_path, &scenario, db.as_deref(), json).await?
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config_path).await?,
            ConfigAction::Path => commands::config_cmd::path(config_path).await?,
            ConfigAction::Validate => commands::config_cmd::validate(config_path).await?,
            ConfigAction::Default => commands::config_cmd::default().await?,
        },
    }

    Ok(())
}
