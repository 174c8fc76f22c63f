//! `wayfinder train` -- train engines on the cached dataset and save them.
//!
//! Each engine kind is saved as `<kind>_model` in the models directory.

use clap::Args;

use wayfinder_core::EngineKind;
use wayfinder_types::Config;

use super::{DatasetArgs, build_pipeline};

/// Arguments for the `wayfinder train` subcommand.
#[derive(Args)]
pub struct TrainArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Engine kind to train (similarity, margin, neighbor). Repeatable.
    #[arg(short, long = "engine", default_values = ["margin", "neighbor"])]
    pub engines: Vec<EngineKind>,
}

pub async fn run(args: TrainArgs, config: &Config) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config);
    let saved = pipeline.run(&args.dataset.request(), &args.engines).await?;

    println!("Saved {} model(s) to {}", saved.len(), pipeline.store().dir().display());
    for name in &saved {
        println!("  {name}");
    }
    Ok(())
}
