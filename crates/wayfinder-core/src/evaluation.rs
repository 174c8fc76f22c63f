//! Held-out evaluation of route engines.
//!
//! [`split`] holds out every fifth session of each route. [`evaluate`]
//! trains an engine on the rest, ranks each held-out session's context and
//! scores the rankings with the metric functions below.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use wayfinder_types::config::VectorizerConfig;
use wayfinder_types::{NavigationContext, Result, Session, WayfinderError};

use crate::engine::{EngineKind, RouteEngine};

/// Every `HOLDOUT_STRIDE`-th session of a route goes to the test set.
pub const HOLDOUT_STRIDE: usize = 5;

/// Deterministic train/test partition of a context's sessions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Split {
    pub train: Vec<Session>,
    pub test: Vec<Session>,
}

/// Hold out the 5th, 10th, ... session of each route, in stored order.
///
/// Orphaned sessions stay in the training set (the documentor drops them).
pub fn split(context: &NavigationContext) -> Split {
    let mut out = Split::default();
    let mut seen = std::collections::HashMap::<&str, usize>::new();
    for session in context.sessions() {
        let n = seen.entry(session.route_id.as_str()).or_default();
        *n += 1;
        if *n % HOLDOUT_STRIDE == 0 {
            out.test.push(session.clone());
        } else {
            out.train.push(session.clone());
        }
    }
    out
}

/// One ranked answer to a held-out query.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub expected_id: String,
    /// Route ids, best first.
    pub ranked_ids: Vec<String>,
    pub latency: Duration,
}

impl Prediction {
    /// 1-based rank of the expected route, if it was ranked at all.
    pub fn rank(&self) -> Option<usize> {
        self.ranked_ids
            .iter()
            .position(|id| *id == self.expected_id)
            .map(|p| p + 1)
    }
}

fn mean(predictions: &[Prediction], f: impl Fn(&Prediction) -> f64) -> f64 {
    if predictions.is_empty() {
        return 0.0;
    }
    predictions.iter().map(f).sum::<f64>() / predictions.len() as f64
}

pub fn accuracy(predictions: &[Prediction]) -> f64 {
    top_k_accuracy(predictions, 1)
}

pub fn top_k_accuracy(predictions: &[Prediction], k: usize) -> f64 {
    mean(predictions, |p| match p.rank() {
        Some(r) if r <= k => 1.0,
        _ => 0.0,
    })
}

/// NDCG@k with a single relevant route, so the ideal DCG is 1.
pub fn ndcg_at_k(predictions: &[Prediction], k: usize) -> f64 {
    mean(predictions, |p| match p.rank() {
        Some(r) if r <= k => 1.0 / ((r + 1) as f64).log2(),
        _ => 0.0,
    })
}

pub fn mean_reciprocal_rank(predictions: &[Prediction]) -> f64 {
    mean(predictions, |p| p.rank().map_or(0.0, |r| 1.0 / r as f64))
}

pub fn mean_latency(predictions: &[Prediction]) -> Duration {
    if predictions.is_empty() {
        return Duration::ZERO;
    }
    let total: Duration = predictions.iter().map(|p| p.latency).sum();
    total / predictions.len() as u32
}

/// Aggregate scores for one engine kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub engine: EngineKind,
    pub k: usize,
    pub train_sessions: usize,
    pub test_sessions: usize,
    pub accuracy: f64,
    pub top_k_accuracy: f64,
    pub ndcg_at_k: f64,
    pub mrr: f64,
    pub mean_latency_us: u128,
}

impl EvaluationReport {
    pub fn from_predictions(
        engine: EngineKind,
        k: usize,
        train_sessions: usize,
        predictions: &[Prediction],
    ) -> Self {
        Self {
            engine,
            k,
            train_sessions,
            test_sessions: predictions.len(),
            accuracy: accuracy(predictions),
            top_k_accuracy: top_k_accuracy(predictions, k),
            ndcg_at_k: ndcg_at_k(predictions, k),
            mrr: mean_reciprocal_rank(predictions),
            mean_latency_us: mean_latency(predictions).as_micros(),
        }
    }
}

/// Train a `kind` engine on the training split and score the held-out split.
pub fn evaluate(
    kind: EngineKind,
    context: &NavigationContext,
    vectorizer: &VectorizerConfig,
    k: usize,
) -> Result<EvaluationReport> {
    let Split { train, test } = split(context);
    if test.is_empty() {
        return Err(WayfinderError::InvalidTrainingData {
            reason: format!(
                "no held-out sessions: each route needs at least {HOLDOUT_STRIDE} sessions"
            ),
        });
    }

    let mut engine = RouteEngine::new(kind, vectorizer.clone());
    engine.train(context.routes(), &train)?;

    let predictions: Vec<Prediction> = test
        .iter()
        .map(|session| {
            let started = Instant::now();
            let ranked = engine.predict(session.context.as_str());
            Prediction {
                expected_id: session.route_id.clone(),
                ranked_ids: ranked.into_iter().map(|r| r.id).collect(),
                latency: started.elapsed(),
            }
        })
        .collect();

    let report = EvaluationReport::from_predictions(kind, k, train.len(), &predictions);
    info!(
        engine = %kind,
        test = report.test_sessions,
        accuracy = report.accuracy,
        mrr = report.mrr,
        "evaluation complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfinder_types::Route;

    fn pred(expected: &str, ranked: &[&str]) -> Prediction {
        Prediction {
            expected_id: expected.into(),
            ranked_ids: ranked.iter().map(|s| s.to_string()).collect(),
            latency: Duration::from_micros(10),
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn split_holds_out_every_fifth_per_route() {
        let routes = vec![Route::new("a", "/a", vec![]), Route::new("b", "/b", vec![])];
        let mut sessions = Vec::new();
        for i in 0..10 {
            sessions.push(Session::new(format!("a{i}"), "a", "x"));
            sessions.push(Session::new(format!("b{i}"), "b", "y"));
        }
        let ctx = NavigationContext::new(routes, sessions);
        let s = split(&ctx);
        let test_ids: Vec<&str> = s.test.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(test_ids, vec!["a4", "b4", "a9", "b9"]);
        assert_eq!(s.train.len(), 16);
    }

    #[test]
    fn rank_based_metrics() {
        let preds = vec![
            pred("a", &["a", "b", "c"]),
            pred("b", &["a", "b", "c"]),
            pred("c", &["a", "b", "c"]),
            pred("d", &["a", "b", "c"]),
        ];
        assert!(close(accuracy(&preds), 0.25));
        assert!(close(top_k_accuracy(&preds, 2), 0.5));
        assert!(close(mean_reciprocal_rank(&preds), (1.0 + 0.5 + 1.0 / 3.0) / 4.0));
        let ndcg = (1.0 + 1.0 / 3f64.log2()) / 4.0;
        assert!(close(ndcg_at_k(&preds, 2), ndcg));
        assert_eq!(mean_latency(&preds), Duration::from_micros(10));
    }

    #[test]
    fn empty_predictions_score_zero() {
        assert_eq!(accuracy(&[]), 0.0);
        assert_eq!(ndcg_at_k(&[], 3), 0.0);
        assert_eq!(mean_latency(&[]), Duration::ZERO);
    }

    #[test]
    fn evaluate_needs_held_out_sessions() {
        let ctx = NavigationContext::new(
            vec![Route::new("a", "/a", vec![])],
            vec![Session::new("1", "a", "hello there")],
        );
        let err = evaluate(EngineKind::Similarity, &ctx, &VectorizerConfig::default(), 3).unwrap_err();
        assert!(matches!(err, WayfinderError::InvalidTrainingData { .. }));
    }

    #[test]
    fn evaluate_separable_context() {
        let routes = vec![
            Route::new("f", "/flights", vec!["flights".into()]),
            Route::new("h", "/hotels", vec!["hotels".into()]),
        ];
        let mut sessions = Vec::new();
        for i in 0..5 {
            sessions.push(Session::new(format!("f{i}"), "f", "book cheap flights to paris"));
            sessions.push(Session::new(format!("h{i}"), "h", "reserve hotel room downtown"));
        }
        let ctx = NavigationContext::new(routes, sessions);
        for kind in EngineKind::ALL {
            let report = evaluate(kind, &ctx, &VectorizerConfig::default(), 2).unwrap();
            assert_eq!(report.test_sessions, 2);
            assert_eq!(report.train_sessions, 8);
            assert!(close(report.accuracy, 1.0), "{kind}: {report:?}");
            assert!(close(report.mrr, 1.0));
        }
    }
}
