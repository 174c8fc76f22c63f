//! `wayfinder generate` -- build or top up the cached dataset.
//!
//! ```text
//! wayfinder generate --description "flight booking admin panel" --routes 5 --sessions 20
//! ```

use wayfinder_types::Config;

use super::{DatasetArgs, build_pipeline};

pub async fn run(args: DatasetArgs, config: &Config) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config);
    let context = pipeline.build_context(&args.request()).await?;

    println!("Dataset: {}", args.description);
    println!("  Routes:   {}", context.routes().len());
    println!("  Sessions: {}", context.sessions().len());
    println!("  Cache:    {}", pipeline.cache().dir().display());
    Ok(())
}
