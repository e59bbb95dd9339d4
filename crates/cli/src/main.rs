//! ReplyForge CLI — the main entry point.
//!
//! Commands:
//! - `onboard`   — Write the default config file
//! - `turn`      — Run a JSON reply intent through the pipeline
//! - `generate`  — Generate a single reply from the command line
//! - `template`  — Manage versioned prompt templates
//! - `outcomes`  — Show recent generation outcomes
//! - `doctor`    — Diagnose configuration, providers and storage

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "replyforge",
    about = "ReplyForge — guarded LLM reply generation with provider failover",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Use this config file instead of ~/.replyforge/config.toml
    #[arg(short, long, global = true, env = "REPLYFORGE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    Onboard,

    /// Run one reply intent (JSON) through the pipeline and print the result
    Turn {
        /// Read the intent from this file instead of stdin
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Generate a single reply
    Generate {
        /// The user message
        #[arg(short, long)]
        message: String,

        /// Prior transcript lines, oldest first (repeatable)
        #[arg(long = "history")]
        history: Vec<String>,

        /// Template to render
        #[arg(short, long)]
        template: Option<String>,

        /// Phrasing constraint, e.g. NO_URLS (repeatable)
        #[arg(long = "constraint")]
        constraints: Vec<String>,

        /// Conversation the turn belongs to
        #[arg(long, default_value = "cli")]
        conversation: String,
    },

    /// Manage prompt templates
    Template {
        #[command(subcommand)]
        action: commands::template::TemplateAction,
    },

    /// Show recent generation outcomes
    Outcomes {
        /// How many rows to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Diagnose system health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing; logs go to stderr so stdout stays machine-readable
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Onboard => commands::onboard::run(config_path).await?,
        Commands::Turn { input } => commands::turn::run(config_path, input).await?,
        Commands::Generate {
            message,
            history,
            template,
            constraints,
            conversation,
        } => {
            commands::generate::run(
                config_path,
                commands::generate::GenerateArgs {
                    message,
                    history,
                    template,
                    constraints,
                    conversation,
                },
            )
            .await?
        }
        Commands::Template { action } => commands::template::run(config_path, action).await?,
        Commands::Outcomes { limit } => commands::outcomes::run(config_path, limit).await?,
        Commands::Doctor => commands::doctor::run(config_path).await?,
    }

    Ok(())
}
