//! `wayfinder` -- CLI binary for the wayfinder route predictor.
//!
//! Provides the following subcommands:
//!
//! - `wayfinder generate` -- Build (or top up) the cached routes and sessions.
//! - `wayfinder train` -- Train route engines and save them as models.
//! - `wayfinder predict` -- Rank routes for a free-text query.
//! - `wayfinder evaluate` -- Score an engine on held-out sessions.

use clap::{Parser, Subcommand};

mod commands;

/// wayfinder route prediction CLI.
#[derive(Parser)]
#[command(name = "wayfinder", about = "Predict application routes from free-text queries", version)]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (JSON). Defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Generate or top up the cached navigation dataset.
    Generate(commands::DatasetArgs),

    /// Train engines on the cached dataset and save them.
    Train(commands::train::TrainArgs),

    /// Rank routes for a query with a saved model.
    Predict(commands::predict::PredictArgs),

    /// Evaluate engines on held-out sessions.
    Evaluate(commands::evaluate::EvaluateArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Generate(args) => commands::generate::run(args, &config).await?,
        Commands::Train(args) => commands::train::run(args, &config).await?,
        Commands::Predict(args) => commands::predict::run(args, &config).await?,
        Commands::Evaluate(args) => commands::evaluate::run(args, &config).await?,
    }

    Ok(())
}
