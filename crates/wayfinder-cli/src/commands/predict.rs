//! `wayfinder predict` -- rank routes for a free-text query.
//!
//! ```text
//! wayfinder predict "refund a cancelled booking" --model neighbor_model --top 3
//! ```

use clap::Args;
use comfy_table::{Table, presets::UTF8_FULL};

use wayfinder_core::{ModelRegistry, ModelStore};
use wayfinder_types::{Config, RouteScored};

/// Arguments for the `wayfinder predict` subcommand.
#[derive(Args)]
pub struct PredictArgs {
    /// The query text.
    pub query: String,

    /// Saved model name.
    #[arg(short, long, default_value = "margin_model")]
    pub model: String,

    /// Number of routes to show.
    #[arg(short, long, default_value = "5")]
    pub top: usize,
}

pub async fn run(args: PredictArgs, config: &Config) -> anyhow::Result<()> {
    let registry = ModelRegistry::new(ModelStore::new(config.models.dir_path()));
    let engine = registry.get_or_load(&args.model).await?;

    let ranked = engine.predict_top(args.query.as_str(), args.top);
    if ranked.is_empty() {
        println!("No routes matched.");
        return Ok(());
    }
    println!("{}", ranking_table(&ranked));
    Ok(())
}

fn ranking_table(ranked: &[RouteScored]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(["RANK", "ID", "PATH", "SCORE"]);
    for (i, route) in ranked.iter().enumerate() {
        table.add_row([
            (i + 1).to_string(),
            route.id.clone(),
            route.path.clone(),
            format!("{:.4}", route.score),
        ]);
    }
    table
}
