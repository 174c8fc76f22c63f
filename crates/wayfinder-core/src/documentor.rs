//! Route documents and the label space.
//!
//! [`RouteDocumentor::fit`] turns routes plus sessions into one text
//! document per route and fixes a dense label index for each route id.
//! The documentor is owned by a trained engine and answers
//! label-to-route lookups at prediction time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use wayfinder_types::{Result, Route, RouteDocument, Session, WayfinderError};

use crate::nlp::{EnglishTokenizer, Tokenizer};

/// Bijection between route ids and dense label indices.
///
/// Indices follow first-seen input order, so label `i` is always the
/// `i`-th route handed to [`fit`](Self::fit).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct LabelEncoder {
    classes: Vec<String>,
    index: HashMap<String, usize>,
}

impl LabelEncoder {
    /// Build the label space. Duplicate ids are rejected.
    pub fn fit<I, S>(ids: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut encoder = Self::default();
        for id in ids {
            let id = id.into();
            if encoder.index.contains_key(&id) {
                return Err(WayfinderError::InvalidTrainingData {
                    reason: format!("duplicate route id '{id}'"),
                });
            }
            encoder.index.insert(id.clone(), encoder.classes.len());
            encoder.classes.push(id);
        }
        Ok(encoder)
    }

    pub fn transform(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn inverse_transform(&self, label: usize) -> Option<&str> {
        self.classes.get(label).map(String::as_str)
    }

    /// Ids in label order.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl TryFrom<Vec<String>> for LabelEncoder {
    type Error = String;

    fn try_from(classes: Vec<String>) -> std::result::Result<Self, Self::Error> {
        Self::fit(classes).map_err(|e| e.to_string())
    }
}

impl From<LabelEncoder> for Vec<String> {
    fn from(encoder: LabelEncoder) -> Self {
        encoder.classes
    }
}

/// Builds and holds one [`RouteDocument`] per route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDocumentor {
    encoder: LabelEncoder,
    documents: Vec<RouteDocument>,
}

impl RouteDocumentor {
    /// Fit with the built-in English tokenizer.
    pub fn fit(routes: &[Route], sessions: &[Session]) -> Result<Self> {
        Self::fit_with(&EnglishTokenizer, routes, sessions)
    }

    /// Fit with a caller-supplied tokenizer.
    ///
    /// Each route's document is its path segments, then its tags, then the
    /// content words of every session whose `route_id` matches it. Sessions
    /// referencing no route are dropped.
    pub fn fit_with(
        tokenizer: &dyn Tokenizer,
        routes: &[Route],
        sessions: &[Session],
    ) -> Result<Self> {
        if routes.is_empty() {
            return Err(WayfinderError::InvalidTrainingData {
                reason: "no routes to document".into(),
            });
        }
        if sessions.is_empty() {
            return Err(WayfinderError::InvalidTrainingData {
                reason: "no sessions to document".into(),
            });
        }

        let encoder = LabelEncoder::fit(routes.iter().map(|r| r.id.as_str()))?;

        let mut by_route: HashMap<&str, Vec<&str>> = HashMap::new();
        for session in sessions {
            by_route
                .entry(session.route_id.as_str())
                .or_default()
                .push(session.context.as_str());
        }

        let documents: Vec<RouteDocument> = routes
            .iter()
            .map(|route| {
                let contexts = by_route.remove(route.id.as_str()).unwrap_or_default();
                RouteDocument {
                    id: route.id.clone(),
                    path: route.path.clone(),
                    context: build_context(tokenizer, route, &contexts),
                }
            })
            .collect();

        if !by_route.is_empty() {
            let orphaned: usize = by_route.values().map(Vec::len).sum();
            debug!(orphaned, "dropped sessions with no matching route");
        }

        Ok(Self { encoder, documents })
    }

    /// Documents in label order.
    pub fn documents(&self) -> &[RouteDocument] {
        &self.documents
    }

    /// Document texts in label order, ready for vectorization.
    pub fn texts(&self) -> Vec<&str> {
        self.documents.iter().map(|d| d.context.as_str()).collect()
    }

    /// The label array: one dense index per document.
    pub fn label_array(&self) -> Vec<usize> {
        (0..self.documents.len()).collect()
    }

    /// Route ids in label order.
    pub fn labels(&self) -> &[String] {
        self.encoder.classes()
    }

    pub fn label_for(&self, route_id: &str) -> Option<usize> {
        self.encoder.transform(route_id)
    }

    pub fn inverse_transform(&self, label: usize) -> Option<&RouteDocument> {
        self.documents.get(label)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn build_context(tokenizer: &dyn Tokenizer, route: &Route, contexts: &[&str]) -> String {
    let mut parts: Vec<String> = path_segments(&route.path)
        .map(String::from)
        .collect();
    parts.extend(
        route
            .tags
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(String::from),
    );
    if !contexts.is_empty() {
        let words = tokenizer.content_words(&contexts.join(" "));
        if !words.is_empty() {
            parts.push(words.join(" "));
        }
    }
    parts.join(" ")
}

/// Path segments that carry at least one non-punctuation character.
fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/')
        .map(str::trim)
        .filter(|seg| !seg.is_empty() && !seg.chars().all(|c| c.is_ascii_punctuation()))
}
