//! Insider threat detection CLI
//!
//! A command-line tool for inspecting configuration and model artifacts,
//! scoring sessions locally, and scoring them against a running server.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{config, init, models, predict};
use detect_lib::{config::Environment, ModelKind};
use std::path::PathBuf;

/// Insider threat detection CLI
#[derive(Parser)]
#[command(name = "insider-detect")]
#[command(author, version, about = "CLI for Insider Threat Detection", long_about = None)]
pub struct Cli {
    /// Server URL for remote scoring (can also be set via INSIDER_DETECT_API_URL env var)
    #[arg(long, env = "INSIDER_DETECT_API_URL", default_value = "http://localhost:8000")]
    pub api_url: String,

    /// Directory holding `<environment>.toml` settings files
    #[arg(long, default_value = "config")]
    pub config_dir: PathBuf,

    /// Environment to load settings for (defaults to ENVIRONMENT or development)
    #[arg(long, short)]
    pub env: Option<Environment>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable engine logging on stderr
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show version information
    Version,

    /// Create the model and config directories and write `<env>.toml`
    Init {
        /// Overwrite an existing settings file
        #[arg(long)]
        force: bool,
    },

    /// Inspect and validate configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Load and inspect model artifacts locally
    #[command(subcommand)]
    Models(ModelsCommands),

    /// Score a session file with locally loaded models
    Predict {
        /// Path to a session JSON document
        #[arg(long)]
        file: PathBuf,

        /// Model to score with (xgboost, lstm, hybrid)
        #[arg(long, short, default_value = "hybrid")]
        mode: ModelKind,
    },

    /// Score a session file against a running server
    Score {
        /// Path to a session JSON document
        #[arg(long)]
        file: PathBuf,

        /// Model to score with (xgboost, lstm, hybrid)
        #[arg(long, short, default_value = "hybrid")]
        mode: ModelKind,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Report configuration issues
    Validate,
}

#[derive(Subcommand)]
pub enum ModelsCommands {
    /// List loaded models and their metadata
    List,

    /// Show model service health after loading
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let environment = cli.env.unwrap_or_else(Environment::from_env);

    match cli.command {
        Commands::Version => {
            println!("insider-detect {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Init { force } => {
            init::init(&cli.config_dir, environment, force, cli.format)?;
        }
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Show => {
                config::show_config(&cli.config_dir, environment, cli.format)?;
            }
            ConfigCommands::Validate => {
                config::validate_config(&cli.config_dir, environment, cli.format)?;
            }
        },
        Commands::Models(models_cmd) => {
            let settings = config::load_settings(&cli.config_dir, environment, cli.verbose)?;
            match models_cmd {
                ModelsCommands::List => models::list_models(&settings, cli.format).await?,
                ModelsCommands::Health => models::show_health(&settings, cli.format).await?,
            }
        }
        Commands::Predict { file, mode } => {
            let settings = config::load_settings(&cli.config_dir, environment, cli.verbose)?;
            predict::predict_local(&settings, &file, mode, cli.format).await?;
        }
        Commands::Score { file, mode } => {
            let client = client::ApiClient::new(&cli.api_url)?;
            predict::score_remote(&client, &file, mode, cli.format).await?;
        }
    }

    Ok(())
}
