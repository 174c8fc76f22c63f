//! Route ranking engines.
//!
//! A [`RouteEngine`] owns everything needed to answer a query: the
//! documentor (label space and route documents), the fitted vectorizer and
//! one fitted model. The three [`EngineKind`]s differ only in how they
//! produce one raw score per label; ranking is shared.
//!
//! ```rust,ignore
//! let mut engine = RouteEngine::new(EngineKind::Margin, VectorizerConfig::default());
//! engine.train(context.routes(), context.sessions())?;
//! let ranked = engine.predict("cancel my reservation");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use wayfinder_types::config::VectorizerConfig;
use wayfinder_types::{Result, Route, RouteScored, Session, WayfinderError};

use crate::classifier::{KNeighbors, LinearSvm, SvmParams};
use crate::documentor::RouteDocumentor;
use crate::vectorizer::{SparseVector, TfidfVectorizer, cosine_similarity};

/// Which scoring strategy an engine uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Cosine similarity between the query and each route document.
    Similarity,
    /// Linear SVM decision margin, squashed to (0, 1).
    Margin,
    /// Distance-weighted nearest-neighbor class probability.
    Neighbor,
}

impl EngineKind {
    pub const ALL: [EngineKind; 3] = [Self::Similarity, Self::Margin, Self::Neighbor];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Similarity => "similarity",
            Self::Margin => "margin",
            Self::Neighbor => "neighbor",
        }
    }

    /// Conventional model-store name for an engine of this kind.
    pub fn model_name(&self) -> String {
        format!("{}_model", self.as_str())
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = WayfinderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "similarity" | "tfidf" | "cosine" => Ok(Self::Similarity),
            "margin" | "svm" | "svc" => Ok(Self::Margin),
            "neighbor" | "neighbour" | "knn" => Ok(Self::Neighbor),
            other => Err(WayfinderError::ConfigInvalid {
                reason: format!(
                    "unknown engine kind '{other}' (expected similarity, margin or neighbor)"
                ),
            }),
        }
    }
}

/// Fitted model state per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum FittedModel {
    Similarity { routes: Vec<SparseVector> },
    Margin { svm: LinearSvm },
    Neighbor { knn: KNeighbors },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Trained {
    documentor: RouteDocumentor,
    vectorizer: TfidfVectorizer,
    model: FittedModel,
}

/// A trainable, serializable route ranker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteEngine {
    kind: EngineKind,
    vectorizer_config: VectorizerConfig,
    trained: Option<Trained>,
}

impl RouteEngine {
    pub fn new(kind: EngineKind, vectorizer_config: VectorizerConfig) -> Self {
        Self {
            kind,
            vectorizer_config,
            trained: None,
        }
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn is_trained(&self) -> bool {
        self.trained.is_some()
    }

    /// The documentor of the last successful training run.
    pub fn documentor(&self) -> Option<&RouteDocumentor> {
        self.trained.as_ref().map(|t| &t.documentor)
    }

    /// Build documents, fit the vectorizer and fit this engine's model.
    ///
    /// On error the previous trained state, if any, is kept.
    pub fn train(&mut self, routes: &[Route], sessions: &[Session]) -> Result<()> {
        let documentor = RouteDocumentor::fit(routes, sessions)?;
        let mut vectorizer = TfidfVectorizer::new(self.vectorizer_config.clone());
        let matrix = vectorizer.fit_transform(&documentor.texts())?;
        let labels = documentor.label_array();
        let n_classes = documentor.len();

        let model = match self.kind {
            EngineKind::Similarity => FittedModel::Similarity { routes: matrix },
            EngineKind::Margin => FittedModel::Margin {
                svm: LinearSvm::fit(
                    &matrix,
                    &labels,
                    n_classes,
                    vectorizer.n_features(),
                    SvmParams::default(),
                )?,
            },
            EngineKind::Neighbor => FittedModel::Neighbor {
                knn: KNeighbors::fit(&matrix, &labels, n_classes, KNeighbors::DEFAULT_K)?,
            },
        };

        info!(
            engine = %self.kind,
            routes = n_classes,
            sessions = sessions.len(),
            features = vectorizer.n_features(),
            "engine trained"
        );

        self.trained = Some(Trained {
            documentor,
            vectorizer,
            model,
        });
        Ok(())
    }

    /// Rank every route for `query`, best first.
    ///
    /// Missing or blank queries, and untrained engines, yield an empty list.
    pub fn predict<'q>(&self, query: impl Into<Option<&'q str>>) -> Vec<RouteScored> {
        let Some(trained) = &self.trained else {
            warn!(engine = %self.kind, "predict called on an untrained engine");
            return Vec::new();
        };
        let Some(vector) = trained.vectorizer.transform_query(query.into()) else {
            debug!(engine = %self.kind, "query is empty, nothing to rank");
            return Vec::new();
        };
        let scores = trained.model.scores(&vector);
        rank(&scores, &trained.documentor)
    }

    /// [`predict`](Self::predict) truncated to the best `k`.
    pub fn predict_top<'q>(&self, query: impl Into<Option<&'q str>>, k: usize) -> Vec<RouteScored> {
        let mut ranked = self.predict(query);
        ranked.truncate(k);
        ranked
    }
}

impl FittedModel {
    fn scores(&self, x: &SparseVector) -> Vec<f64> {
        match self {
            Self::Similarity { routes } => routes.iter().map(|r| cosine_similarity(x, r)).collect(),
            Self::Margin { svm } => svm.decision_function(x).into_iter().map(logistic).collect(),
            Self::Neighbor { knn } => knn.predict_proba(x),
        }
    }
}

fn logistic(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

/// Order label indices by descending score (ties keep label order) and
/// resolve each to its route document. Unresolvable labels are skipped.
pub fn rank(scores: &[f64], documentor: &RouteDocumentor) -> Vec<RouteScored> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    // sort_by is stable.
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order
        .into_iter()
        .filter_map(|label| {
            documentor
                .inverse_transform(label)
                .map(|doc| doc.with_score(scores[label]))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routes() -> Vec<Route> {
        vec![
            Route::new(
                "flight-search",
                "/flights/search",
                vec!["flights".into(), "search".into(), "departures".into()],
            ),
            Route::new(
                "booking-list",
                "/bookings/list",
                vec!["bookings".into(), "reservations".into(), "list".into()],
            ),
            Route::new(
                "user-admin",
                "/admin/users",
                vec!["users".into(), "accounts".into(), "permissions".into()],
            ),
        ]
    }

    fn sessions() -> Vec<Session> {
        vec![
            Session::new("1", "flight-search", "find cheap flights to Lisbon"),
            Session::new("2", "flight-search", "search departures tomorrow"),
            Session::new("3", "booking-list", "show all reservations for customer"),
            Session::new("4", "booking-list", "cancel a booking"),
            Session::new("5", "user-admin", "reset user password"),
            Session::new("6", "user-admin", "grant admin permissions to account"),
        ]
    }

    fn trained(kind: EngineKind) -> RouteEngine {
        let mut engine = RouteEngine::new(kind, VectorizerConfig::default());
        engine.train(&routes(), &sessions()).unwrap();
        engine
    }

    #[test]
    fn every_kind_ranks_obvious_query_first() {
        for kind in EngineKind::ALL {
            let engine = trained(kind);
            let ranked = engine.predict("cancel my booking reservation");
            assert_eq!(ranked.len(), 3, "{kind}");
            assert_eq!(ranked[0].id, "booking-list", "{kind}");
        }
    }

    #[test]
    fn own_document_ranks_itself_first() {
        for kind in EngineKind::ALL {
            let engine = trained(kind);
            let documentor = engine.documentor().unwrap();
            for doc in documentor.documents() {
                let ranked = engine.predict(doc.context.as_str());
                assert_eq!(ranked[0].id, doc.id, "{kind}");
            }
        }
    }

    #[test]
    fn blank_queries_are_empty_for_every_kind() {
        for kind in EngineKind::ALL {
            let engine = trained(kind);
            assert!(engine.predict("").is_empty());
            assert!(engine.predict(None).is_empty());
            assert!(engine.predict("   ").is_empty());
        }
    }

    #[test]
    fn untrained_engine_predicts_nothing() {
        let engine = RouteEngine::new(EngineKind::Similarity, VectorizerConfig::default());
        assert!(!engine.is_trained());
        assert!(engine.predict("flights").is_empty());
    }

    #[test]
    fn training_on_nothing_fails() {
        let mut engine = RouteEngine::new(EngineKind::Margin, VectorizerConfig::default());
        assert!(matches!(
            engine.train(&[], &sessions()),
            Err(WayfinderError::InvalidTrainingData { .. })
        ));
        assert!(engine.train(&routes(), &[]).is_err());
        assert!(!engine.is_trained());
    }

    #[test]
    fn margin_scores_are_probabilities() {
        let engine = trained(EngineKind::Margin);
        for scored in engine.predict("flights") {
            assert!(scored.score > 0.0 && scored.score < 1.0);
        }
    }

    #[test]
    fn scores_descend() {
        let engine = trained(EngineKind::Neighbor);
        let ranked = engine.predict("reset account permissions");
        for pair in ranked.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn predict_top_truncates() {
        let engine = trained(EngineKind::Similarity);
        assert_eq!(engine.predict_top("flights", 1).len(), 1);
        assert_eq!(engine.predict_top("flights", 10).len(), 3);
    }

    #[test]
    fn rank_is_stable_on_ties() {
        let routes = vec![
            Route::new("A", "/a", vec![]),
            Route::new("B", "/b", vec![]),
            Route::new("C", "/c", vec![]),
        ];
        let sessions = vec![Session::new("s", "A", "alpha")];
        let documentor = RouteDocumentor::fit(&routes, &sessions).unwrap();
        let ids: Vec<String> = rank(&[0.4, 0.9, 0.9], &documentor)
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["B", "C", "A"]);
        let ids: Vec<String> = rank(&[0.9, 0.9, 0.4], &documentor)
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }

    #[test]
    fn rank_skips_unresolvable_labels() {
        let routes = vec![Route::new("A", "/a", vec![])];
        let sessions = vec![Session::new("s", "A", "alpha")];
        let documentor = RouteDocumentor::fit(&routes, &sessions).unwrap();
        let ranked = rank(&[0.1, 0.8], &documentor);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, "A");
    }

    #[test]
    fn kind_parses_and_displays() {
        assert_eq!("margin".parse::<EngineKind>().unwrap(), EngineKind::Margin);
        assert_eq!("KNN".parse::<EngineKind>().unwrap(), EngineKind::Neighbor);
        assert_eq!("tfidf".parse::<EngineKind>().unwrap(), EngineKind::Similarity);
        assert!("forest".parse::<EngineKind>().is_err());
        assert_eq!(EngineKind::Neighbor.to_string(), "neighbor");
        assert_eq!(EngineKind::Margin.model_name(), "margin_model");
    }

    #[test]
    fn engine_survives_serde() {
        let engine = trained(EngineKind::Margin);
        let json = serde_json::to_string(&engine).unwrap();
        let back: RouteEngine = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back.predict("cancel booking")[0].id,
            engine.predict("cancel booking")[0].id
        );
    }
}
