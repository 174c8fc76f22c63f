//! TF-IDF text vectorization.
//!
//! [`TfidfVectorizer`] learns a vocabulary and inverse document
//! frequencies from the route documents, then projects any text into that
//! fixed feature space as an L2-normalized [`SparseVector`]. Terms never
//! seen at fit time are dropped.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use wayfinder_types::config::VectorizerConfig;
use wayfinder_types::{Result, WayfinderError};

use crate::nlp::is_stop_word;

static TERM_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w\w+\b").expect("static term pattern"));

/// A sparse feature vector: `(feature index, weight)` pairs sorted by index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    entries: Vec<(usize, f64)>,
}

impl SparseVector {
    /// Build from unordered pairs. Duplicate indices are summed; zeros dropped.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (usize, f64)>) -> Self {
        let mut merged: BTreeMap<usize, f64> = BTreeMap::new();
        for (idx, w) in pairs {
            *merged.entry(idx).or_insert(0.0) += w;
        }
        Self {
            entries: merged.into_iter().filter(|(_, w)| *w != 0.0).collect(),
        }
    }

    pub fn entries(&self) -> &[(usize, f64)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dot(&self, other: &SparseVector) -> f64 {
        let (mut i, mut j, mut sum) = (0, 0, 0.0);
        while i < self.entries.len() && j < other.entries.len() {
            let (a_idx, a_w) = self.entries[i];
            let (b_idx, b_w) = other.entries[j];
            match a_idx.cmp(&b_idx) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += a_w * b_w;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }

    /// Dot product with a dense weight vector. Out-of-range indices count as zero.
    pub fn dot_dense(&self, dense: &[f64]) -> f64 {
        self.entries
            .iter()
            .filter_map(|&(idx, w)| dense.get(idx).map(|d| d * w))
            .sum()
    }

    pub fn squared_norm(&self) -> f64 {
        self.entries.iter().map(|(_, w)| w * w).sum()
    }

    pub fn norm(&self) -> f64 {
        self.squared_norm().sqrt()
    }

    pub fn squared_distance(&self, other: &SparseVector) -> f64 {
        (self.squared_norm() + other.squared_norm() - 2.0 * self.dot(other)).max(0.0)
    }

    fn normalize(&mut self) {
        let norm = self.norm();
        if norm > 0.0 {
            for (_, w) in &mut self.entries {
                *w /= norm;
            }
        }
    }
}

/// Cosine similarity between two sparse vectors.
///
/// Returns 0.0 if either vector has zero norm.
pub fn cosine_similarity(a: &SparseVector, b: &SparseVector) -> f64 {
    let norm_a = a.norm();
    let norm_b = b.norm();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    a.dot(b) / (norm_a * norm_b)
}

/// TF-IDF vectorizer with document-frequency filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    config: VectorizerConfig,
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    pub fn new(config: VectorizerConfig) -> Self {
        Self {
            config,
            vocabulary: BTreeMap::new(),
            idf: Vec::new(),
        }
    }

    pub fn config(&self) -> &VectorizerConfig {
        &self.config
    }

    /// Number of features in the fitted space (0 before fitting).
    pub fn n_features(&self) -> usize {
        self.idf.len()
    }

    pub fn vocabulary(&self) -> &BTreeMap<String, usize> {
        &self.vocabulary
    }

    /// Lowercased terms of `text`, stop words removed when configured.
    pub fn analyze(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        TERM_PATTERN
            .find_iter(&lower)
            .map(|m| m.as_str())
            .filter(|t| !self.config.stop_words || !is_stop_word(t))
            .map(String::from)
            .collect()
    }

    /// Learn vocabulary and idf from `documents`.
    pub fn fit<S: AsRef<str>>(&mut self, documents: &[S]) -> Result<()> {
        let n_docs = documents.len();
        if n_docs == 0 {
            return Err(WayfinderError::InvalidTrainingData {
                reason: "cannot fit vectorizer on an empty corpus".into(),
            });
        }

        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut corpus_freq: HashMap<String, usize> = HashMap::new();
        for doc in documents {
            let terms = self.analyze(doc.as_ref());
            let mut seen: HashSet<&str> = HashSet::new();
            for term in &terms {
                *corpus_freq.entry(term.clone()).or_insert(0) += 1;
                if seen.insert(term.as_str()) {
                    *doc_freq.entry(term.clone()).or_insert(0) += 1;
                }
            }
        }

        let max_doc_count = self.config.max_df * n_docs as f64;
        let mut kept: Vec<(String, usize)> = doc_freq
            .into_iter()
            .filter(|(_, df)| *df >= self.config.min_df && (*df as f64) <= max_doc_count)
            .collect();

        if let Some(limit) = self.config.max_features
            && kept.len() > limit
        {
            kept.sort_by(|(a, _), (b, _)| {
                let fa = corpus_freq.get(a).copied().unwrap_or(0);
                let fb = corpus_freq.get(b).copied().unwrap_or(0);
                fb.cmp(&fa).then_with(|| a.cmp(b))
            });
            kept.truncate(limit);
        }

        if kept.is_empty() {
            return Err(WayfinderError::InvalidTrainingData {
                reason: "vocabulary is empty after document-frequency filtering".into(),
            });
        }

        kept.sort_by(|(a, _), (b, _)| a.cmp(b));
        self.vocabulary = kept
            .iter()
            .enumerate()
            .map(|(i, (term, _))| (term.clone(), i))
            .collect();
        self.idf = kept
            .iter()
            .map(|(_, df)| ((1.0 + n_docs as f64) / (1.0 + *df as f64)).ln() + 1.0)
            .collect();

        debug!(
            documents = n_docs,
            features = self.idf.len(),
            "fitted tf-idf vectorizer"
        );
        Ok(())
    }

    /// Fit, then transform the same documents.
    pub fn fit_transform<S: AsRef<str>>(&mut self, documents: &[S]) -> Result<Vec<SparseVector>> {
        self.fit(documents)?;
        Ok(documents.iter().map(|d| self.transform(d.as_ref())).collect())
    }

    /// Project `text` into the fitted feature space.
    pub fn transform(&self, text: &str) -> SparseVector {
        let pairs = self.analyze(text).into_iter().filter_map(|term| {
            self.vocabulary
                .get(&term)
                .and_then(|&idx| self.idf.get(idx).map(|&w| (idx, w)))
        });
        let mut vector = SparseVector::from_pairs(pairs);
        vector.normalize();
        vector
    }

    /// Project a user query; `None` when the query is missing or blank.
    pub fn transform_query(&self, query: Option<&str>) -> Option<SparseVector> {
        let query = query?.trim();
        if query.is_empty() {
            return None;
        }
        Some(self.transform(query))
    }
}
