//! naturalmaps CLI — the main entry point.
//!
//! Commands:
//! - `onboard` — Initialize config
//! - `ask`     — Answer one question about OpenStreetMap data
//! - `chat`    — Interactive multi-turn mode
//! - `runs`    — Inspect the persisted run log

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "naturalmaps",
    about = "naturalmaps — ask questions about OpenStreetMap in plain language",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration
    Onboard,

    /// Answer a single question
    Ask {
        /// The question, e.g. "Which parks in Kreuzberg have a playground?"
        question: String,

        /// Override the iteration budget
        #[arg(short, long)]
        iterations: Option<u32>,

        /// Override the number of candidates per completion
        #[arg(short, long)]
        candidates: Option<u32>,

        /// Override the sampling temperature
        #[arg(short, long)]
        temperature: Option<f32>,
    },

    /// Interactive multi-turn mode
    Chat,

    /// Inspect persisted runs
    Runs {
        #[command(subcommand)]
        action: RunsAction,
    },
}

#[derive(Subcommand)]
pub enum RunsAction {
    /// List every logged run
    List,

    /// Show the snapshots of one run
    Show {
        /// Run id as printed by `runs list`
        run_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Ask {
            question,
            iterations,
            candidates,
            temperature,
        } => {
            let overrides = commands::Overrides {
                iterations,
                candidates,
                temperature,
            };
            commands::ask::run(&question, overrides).await?
        }
        Commands::Chat => commands::chat::run().await?,
        Commands::Runs { action } => commands::runs::run(action).await?,
    }

    Ok(())
}
