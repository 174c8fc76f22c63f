//! `wayfinder evaluate` -- score engines on held-out sessions.

use clap::Args;
use comfy_table::{Table, presets::UTF8_FULL};

use wayfinder_core::EngineKind;
use wayfinder_core::evaluation::{self, EvaluationReport};
use wayfinder_types::Config;

use super::{DatasetArgs, build_pipeline};

/// Arguments for the `wayfinder evaluate` subcommand.
#[derive(Args)]
pub struct EvaluateArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Engine kind to evaluate. Repeatable; defaults to every kind.
    #[arg(short, long = "engine")]
    pub engines: Vec<EngineKind>,

    /// Cutoff for top-k accuracy and NDCG.
    #[arg(short = 'k', long, default_value = "3")]
    pub top: usize,

    /// Print the reports as JSON.
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: EvaluateArgs, config: &Config) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config);
    let context = pipeline.build_context(&args.dataset.request()).await?;

    let kinds = if args.engines.is_empty() {
        EngineKind::ALL.to_vec()
    } else {
        args.engines.clone()
    };
    let reports = kinds
        .into_iter()
        .map(|kind| evaluation::evaluate(kind, &context, pipeline.vectorizer(), args.top))
        .collect::<Result<Vec<_>, _>>()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        println!("{}", report_table(&reports));
    }
    Ok(())
}

fn report_table(reports: &[EvaluationReport]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    let k = reports.first().map_or(0, |r| r.k);
    table.set_header([
        "ENGINE".to_string(),
        "TEST".to_string(),
        "ACCURACY".to_string(),
        format!("TOP-{k}"),
        format!("NDCG@{k}"),
        "MRR".to_string(),
        "LATENCY (us)".to_string(),
    ]);
    for r in reports {
        table.add_row([
            r.engine.to_string(),
            r.test_sessions.to_string(),
            format!("{:.3}", r.accuracy),
            format!("{:.3}", r.top_k_accuracy),
            format!("{:.3}", r.ndcg_at_k),
            format!("{:.3}", r.mrr),
            r.mean_latency_us.to_string(),
        ]);
    }
    table
}
