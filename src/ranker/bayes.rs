//! Naive Bayes cell scoring.

use crate::coord::Coord;
use crate::doc::GeoDoc;
use crate::error::{GridLocateError, Result};
use crate::grid::{CellKey, Grid, GridCell, Tiling};
use std::collections::HashMap;

/// One pluggable log-likelihood term of the Naive Bayes score.
#[derive(Debug, Clone)]
pub enum BayesFeature {
    /// Log probability of the document's tokens under the cell's smoothed
    /// distribution.
    WordLogProb,
    /// Cached scores from a cheap first-pass ranker, keyed by document
    /// title and cell. Missing entries contribute 0.
    RoughRanker(HashMap<String, HashMap<CellKey, f64>>),
}

impl BayesFeature {
    fn value<C: Coord>(&self, doc: &GeoDoc<C>, cell: &GridCell<C>) -> f64 {
        match self {
            BayesFeature::WordLogProb => doc.lm().model_logprob(cell.lm()),
            BayesFeature::RoughRanker(cache) => cache
                .get(doc.title())
                .and_then(|per_cell| per_cell.get(&cell.key()))
                .copied()
                .unwrap_or(0.0),
        }
    }
}

/// Scores a cell by a convex combination of word likelihood and cell
/// prior: `(1 - bw) * log-likelihood + bw * log-prior`, with `bw` the
/// prior weight and the prior the cell's share of all placed documents.
///
/// A zero-weighted term is skipped outright rather than multiplied in, so
/// an infinite log-prior (an empty forced-in cell) cannot poison the
/// score. A NaN in any computed term is a fault and aborts with the
/// document and cell named.
#[derive(Debug, Clone)]
pub struct NaiveBayes {
    features: Vec<BayesFeature>,
    prior_weight: f64,
    total_prior: f64,
}

impl NaiveBayes {
    /// Creates the strategy with the default word-likelihood feature.
    pub fn new<T: Tiling>(grid: &Grid<T>, prior_weight: f64) -> Result<Self> {
        Self::with_features(grid, prior_weight, vec![BayesFeature::WordLogProb])
    }

    /// Creates the strategy with an explicit feature list.
    pub fn with_features<T: Tiling>(
        grid: &Grid<T>,
        prior_weight: f64,
        features: Vec<BayesFeature>,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&prior_weight) {
            return Err(GridLocateError::Config(format!(
                "naive-bayes prior weight must be in [0, 1], got {prior_weight}"
            )));
        }
        Ok(Self {
            features,
            prior_weight,
            total_prior: grid.total_prior_weight(false),
        })
    }

    pub(crate) fn score_cell<C: Coord>(&self, doc: &GeoDoc<C>, cell: &GridCell<C>) -> f64 {
        let word_weight = 1.0 - self.prior_weight;
        let mut score = 0.0;
        if word_weight > 0.0 {
            let likelihood: f64 = self.features.iter().map(|f| f.value(doc, cell)).sum();
            assert!(
                !likelihood.is_nan(),
                "NaN likelihood for document '{}' against {}",
                doc.title(),
                cell
            );
            score += word_weight * likelihood;
        }
        if self.prior_weight > 0.0 {
            let log_prior = (cell.prior_weight(false) / self.total_prior).ln();
            assert!(
                !log_prior.is_nan(),
                "NaN log-prior for {} ({} docs of {} total)",
                cell,
                cell.num_docs(),
                self.total_prior
            );
            score += self.prior_weight * log_prior;
        }
        score
    }
}
