//! Linear classification machinery.
//!
//! Classifier-backed rankers and the reranker share this layer: sparse
//! [`FeatureVector`]s over interned feature names, [`LinearScorer`] /
//! [`MultiLabelScorer`] evaluation, and averaged-perceptron training in
//! both ranking (pick the correct candidate from a set) and multi-label
//! (pick the correct label for an instance) forms.

pub mod batch;

pub use batch::{BatchScorer, LinearBatchScorer, ProcessBatchScorer, ScoreConversion, ScoreRequest};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

/// Dense identifier for an interned feature name.
pub type FeatureId = u32;

/// Interning table for feature names.
///
/// Training grows the table through [`intern`](Self::intern); inference
/// uses [`id`](Self::id) and skips names the trained model never saw.
#[derive(Debug, Clone, Default)]
pub struct FeatureMapper {
    name_to_id: HashMap<String, FeatureId>,
    names: Vec<String>,
}

impl FeatureMapper {
    /// Creates an empty mapper.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a feature name, returning its id.
    pub fn intern(&mut self, name: &str) -> FeatureId {
        if let Some(&id) = self.name_to_id.get(name) {
            return id;
        }
        let id = self.names.len() as FeatureId;
        self.names.push(name.to_string());
        self.name_to_id.insert(name.to_string(), id);
        id
    }

    /// Looks up an already-interned feature name.
    pub fn id(&self, name: &str) -> Option<FeatureId> {
        self.name_to_id.get(name).copied()
    }

    /// The name of a feature id.
    pub fn name(&self, id: FeatureId) -> Option<&str> {
        self.names.get(id as usize).map(|s| s.as_str())
    }

    /// Number of distinct features interned.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no features have been interned.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A sparse feature vector: `(feature, value)` pairs.
#[derive(Debug, Clone, Default)]
pub struct FeatureVector {
    entries: Vec<(FeatureId, f64)>,
}

impl FeatureVector {
    /// Creates an empty vector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one feature. Duplicate ids are allowed and sum in dot
    /// products.
    pub fn push(&mut self, id: FeatureId, value: f64) {
        self.entries.push((id, value));
    }

    /// Dot product against a dense weight vector. Features beyond the
    /// weight vector contribute nothing.
    pub fn dot(&self, weights: &[f64]) -> f64 {
        self.entries
            .iter()
            .map(|&(id, value)| weights.get(id as usize).copied().unwrap_or(0.0) * value)
            .sum()
    }

    /// Iterates over the `(feature, value)` entries.
    pub fn iter(&self) -> impl Iterator<Item = &(FeatureId, f64)> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the vector has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Largest feature id present.
    pub fn max_feature_id(&self) -> Option<FeatureId> {
        self.entries.iter().map(|&(id, _)| id).max()
    }
}

/// A single dense weight vector over features.
#[derive(Debug, Clone)]
pub struct LinearScorer {
    weights: Vec<f64>,
}

impl LinearScorer {
    /// Wraps a trained weight vector.
    pub fn new(weights: Vec<f64>) -> Self {
        Self { weights }
    }

    /// Scores a feature vector.
    #[inline]
    pub fn score(&self, fv: &FeatureVector) -> f64 {
        fv.dot(&self.weights)
    }

    /// The weight vector.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}

/// One weight vector per label.
#[derive(Debug, Clone)]
pub struct MultiLabelScorer {
    weights: Vec<Vec<f64>>,
}

impl MultiLabelScorer {
    /// Wraps trained per-label weight vectors.
    pub fn new(weights: Vec<Vec<f64>>) -> Self {
        Self { weights }
    }

    /// Number of labels the scorer knows.
    #[inline]
    pub fn num_labels(&self) -> usize {
        self.weights.len()
    }

    /// Scores a feature vector against one label.
    ///
    /// # Panics
    /// If `label` is out of range.
    #[inline]
    pub fn score_label(&self, label: usize, fv: &FeatureVector) -> f64 {
        fv.dot(&self.weights[label])
    }

    /// Scores a feature vector against every label.
    pub fn score_all(&self, fv: &FeatureVector) -> Vec<f64> {
        self.weights.iter().map(|w| fv.dot(w)).collect()
    }
}

/// Averaged-perceptron trainer.
///
/// Instances are shuffled between epochs; a fixed seed makes training
/// reproducible. The returned weights are the running average over all
/// update steps, which dampens the oscillation of the plain perceptron.
#[derive(Debug, Clone)]
pub struct PerceptronTrainer {
    epochs: usize,
    learning_rate: f64,
    shuffle_seed: Option<u64>,
}

impl PerceptronTrainer {
    /// Creates a trainer.
    pub fn new(epochs: usize, learning_rate: f64, shuffle_seed: Option<u64>) -> Self {
        Self {
            epochs,
            learning_rate,
            shuffle_seed,
        }
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.shuffle_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    /// Trains a ranking model: each instance is a candidate set in which
    /// exactly the candidates flagged `true` are correct. The update pulls
    /// the correct candidate above the best-scoring incorrect one.
    ///
    /// Sets without a correct candidate, or with no incorrect one, are
    /// skipped.
    pub fn train_ranking(&self, sets: &[Vec<(FeatureVector, bool)>]) -> LinearScorer {
        let dim = sets
            .iter()
            .flatten()
            .filter_map(|(fv, _)| fv.max_feature_id())
            .max()
            .map_or(0, |id| id as usize + 1);
        let mut w = vec![0.0; dim];
        let mut u = vec![0.0; dim];
        let mut c = 1.0_f64;
        let mut rng = self.rng();
        let mut order: Vec<usize> = (0..sets.len()).collect();
        for _ in 0..self.epochs {
            order.shuffle(&mut rng);
            for &i in &order {
                let set = &sets[i];
                let correct = match set.iter().position(|(_, label)| *label) {
                    Some(idx) => idx,
                    None => continue,
                };
                let mut best_wrong: Option<(usize, f64)> = None;
                for (j, (fv, label)) in set.iter().enumerate() {
                    if *label {
                        continue;
                    }
                    let score = fv.dot(&w);
                    if best_wrong.map_or(true, |(_, best)| score > best) {
                        best_wrong = Some((j, score));
                    }
                }
                let (wrong, wrong_score) = match best_wrong {
                    Some(found) => found,
                    None => continue,
                };
                if set[correct].0.dot(&w) <= wrong_score {
                    for &(f, v) in set[correct].0.iter() {
                        w[f as usize] += self.learning_rate * v;
                        u[f as usize] += c * self.learning_rate * v;
                    }
                    for &(f, v) in set[wrong].0.iter() {
                        w[f as usize] -= self.learning_rate * v;
                        u[f as usize] -= c * self.learning_rate * v;
                    }
                }
                c += 1.0;
            }
        }
        for f in 0..dim {
            w[f] -= u[f] / c;
        }
        LinearScorer::new(w)
    }

    /// Trains a multi-label model from `(features, correct label)` pairs.
    ///
    /// # Panics
    /// If any label is not below `num_labels`.
    pub fn train_multilabel(
        &self,
        instances: &[(FeatureVector, usize)],
        num_labels: usize,
    ) -> MultiLabelScorer {
        let dim = instances
            .iter()
            .filter_map(|(fv, _)| fv.max_feature_id())
            .max()
            .map_or(0, |id| id as usize + 1);
        let mut w = vec![vec![0.0; dim]; num_labels];
        let mut u = vec![vec![0.0; dim]; num_labels];
        let mut c = 1.0_f64;
        let mut rng = self.rng();
        let mut order: Vec<usize> = (0..instances.len()).collect();
        for _ in 0..self.epochs {
            order.shuffle(&mut rng);
            for &i in &order {
                let (fv, label) = &instances[i];
                assert!(
                    *label < num_labels,
                    "training label {label} out of range for {num_labels} labels"
                );
                let mut pred = 0;
                let mut pred_score = f64::NEG_INFINITY;
                for (l, lw) in w.iter().enumerate() {
                    let score = fv.dot(lw);
                    if score > pred_score {
                        pred = l;
                        pred_score = score;
                    }
                }
                if pred != *label {
                    for &(f, v) in fv.iter() {
                        w[*label][f as usize] += self.learning_rate * v;
                        u[*label][f as usize] += c * self.learning_rate * v;
                        w[pred][f as usize] -= self.learning_rate * v;
                        u[pred][f as usize] -= c * self.learning_rate * v;
                    }
                }
                c += 1.0;
            }
        }
        for label in 0..num_labels {
            for f in 0..dim {
                w[label][f] -= u[label][f] / c;
            }
        }
        MultiLabelScorer::new(w)
    }
}
