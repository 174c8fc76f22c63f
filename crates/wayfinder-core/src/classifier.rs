//! Classifiers over sparse TF-IDF features.
//!
//! - [`LinearSvm`]: one-vs-rest linear SVM trained by dual coordinate
//!   descent on the hinge loss, exposing per-class decision margins.
//! - [`KNeighbors`]: distance-weighted k-nearest-neighbor classifier
//!   exposing per-class probabilities.
//!
//! Both take label indices `0..n_classes` and return one score per class.

use serde::{Deserialize, Serialize};
use tracing::debug;

use wayfinder_types::{Result, WayfinderError};

use crate::vectorizer::SparseVector;

/// Training parameters for [`LinearSvm`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SvmParams {
    /// Regularization strength (upper bound on each dual variable).
    pub c: f64,
    /// Scale each sample's bound by `n_samples / (n_classes * class_count)`.
    pub balanced: bool,
    /// Maximum passes over the data per binary problem.
    pub max_iter: usize,
    /// Stop once the projected-gradient spread falls below this.
    pub tol: f64,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            balanced: true,
            max_iter: 2000,
            tol: 1e-4,
        }
    }
}

/// One binary hyperplane `w·x + b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Hyperplane {
    weights: Vec<f64>,
    bias: f64,
}

/// One-vs-rest linear SVM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearSvm {
    params: SvmParams,
    planes: Vec<Hyperplane>,
}

impl LinearSvm {
    /// Train one hyperplane per class.
    pub fn fit(
        samples: &[SparseVector],
        labels: &[usize],
        n_classes: usize,
        n_features: usize,
        params: SvmParams,
    ) -> Result<Self> {
        check_training_shape(samples, labels, n_classes)?;

        let sample_c = sample_bounds(labels, n_classes, &params);
        // Bias is an implicit constant feature of value 1.
        let diag: Vec<f64> = samples.iter().map(|x| x.squared_norm() + 1.0).collect();

        let mut planes = Vec::with_capacity(n_classes);
        for class in 0..n_classes {
            let signs: Vec<f64> = labels
                .iter()
                .map(|&l| if l == class { 1.0 } else { -1.0 })
                .collect();
            let (plane, passes) =
                solve_binary(samples, &signs, &sample_c, &diag, n_features, &params);
            if passes == params.max_iter {
                debug!(class, passes, "svm solver hit max_iter before converging");
            }
            planes.push(plane);
        }

        Ok(Self { params, planes })
    }

    pub fn n_classes(&self) -> usize {
        self.planes.len()
    }

    /// Signed distance-like margin per class; higher means more confident.
    pub fn decision_function(&self, x: &SparseVector) -> Vec<f64> {
        self.planes
            .iter()
            .map(|p| x.dot_dense(&p.weights) + p.bias)
            .collect()
    }
}

fn sample_bounds(labels: &[usize], n_classes: usize, params: &SvmParams) -> Vec<f64> {
    if !params.balanced {
        return vec![params.c; labels.len()];
    }
    let mut counts = vec![0usize; n_classes];
    for &l in labels {
        counts[l] += 1;
    }
    let n = labels.len() as f64;
    labels
        .iter()
        .map(|&l| params.c * n / (n_classes as f64 * counts[l] as f64))
        .collect()
}

/// Dual coordinate descent for the L1-loss (hinge) SVM.
///
/// Returns the hyperplane and the number of passes made.
fn solve_binary(
    samples: &[SparseVector],
    signs: &[f64],
    upper: &[f64],
    diag: &[f64],
    n_features: usize,
    params: &SvmParams,
) -> (Hyperplane, usize) {
    let mut alpha = vec![0.0; samples.len()];
    let mut weights = vec![0.0; n_features];
    let mut bias = 0.0;

    let mut passes = 0;
    while passes < params.max_iter {
        passes += 1;
        let mut max_pg = f64::NEG_INFINITY;
        let mut min_pg = f64::INFINITY;

        for (i, x) in samples.iter().enumerate() {
            let y = signs[i];
            let g = y * (x.dot_dense(&weights) + bias) - 1.0;

            let pg = if alpha[i] <= 0.0 {
                g.min(0.0)
            } else if alpha[i] >= upper[i] {
                g.max(0.0)
            } else {
                g
            };
            max_pg = max_pg.max(pg);
            min_pg = min_pg.min(pg);

            if pg.abs() > 1e-12 {
                let old = alpha[i];
                alpha[i] = (old - g / diag[i]).clamp(0.0, upper[i]);
                let delta = (alpha[i] - old) * y;
                for &(idx, v) in x.entries() {
                    if let Some(w) = weights.get_mut(idx) {
                        *w += delta * v;
                    }
                }
                bias += delta;
            }
        }

        if max_pg - min_pg <= params.tol {
            break;
        }
    }

    (Hyperplane { weights, bias }, passes)
}

/// Distance-weighted k-nearest-neighbor classifier (Euclidean, weights `1/d`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KNeighbors {
    k: usize,
    n_classes: usize,
    samples: Vec<SparseVector>,
    labels: Vec<usize>,
}

impl KNeighbors {
    pub const DEFAULT_K: usize = 5;

    /// Store the training set. `k` is clamped to the number of samples.
    pub fn fit(
        samples: &[SparseVector],
        labels: &[usize],
        n_classes: usize,
        k: usize,
    ) -> Result<Self> {
        check_training_shape(samples, labels, n_classes)?;
        Ok(Self {
            k: k.clamp(1, samples.len()),
            n_classes,
            samples: samples.to_vec(),
            labels: labels.to_vec(),
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Class probabilities from the `k` nearest samples.
    ///
    /// Exact matches (distance zero) take all the weight.
    pub fn predict_proba(&self, x: &SparseVector) -> Vec<f64> {
        let mut neighbors: Vec<(usize, f64)> = self
            .samples
            .iter()
            .enumerate()
            .map(|(i, s)| (i, x.squared_distance(s).sqrt()))
            .collect();
        neighbors.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        neighbors.truncate(self.k);

        let exact = neighbors.iter().any(|&(_, d)| d == 0.0);
        let mut proba = vec![0.0; self.n_classes];
        for &(i, d) in &neighbors {
            let weight = match (exact, d == 0.0) {
                (true, true) => 1.0,
                (true, false) => 0.0,
                (false, _) => 1.0 / d,
            };
            if let Some(p) = proba.get_mut(self.labels[i]) {
                *p += weight;
            }
        }

        let total: f64 = proba.iter().sum();
        if total > 0.0 {
            for p in &mut proba {
                *p /= total;
            }
        }
        proba
    }
}

fn check_training_shape(samples: &[SparseVector], labels: &[usize], n_classes: usize) -> Result<()> {
    if samples.is_empty() {
        return Err(WayfinderError::InvalidTrainingData {
            reason: "classifier needs at least one sample".into(),
        });
    }
    if samples.len() != labels.len() {
        return Err(WayfinderError::InvalidTrainingData {
            reason: format!(
                "{} samples but {} labels",
                samples.len(),
                labels.len()
            ),
        });
    }
    if let Some(&bad) = labels.iter().find(|&&l| l >= n_classes) {
        return Err(WayfinderError::InvalidTrainingData {
            reason: format!("label {bad} out of range for {n_classes} classes"),
        });
    }
    Ok(())
}
