//! Configuration for the gridlocate engine.

use serde::{Deserialize, Serialize};

/// Main configuration for the gridlocate engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Grid geometry configuration.
    pub grid: GridConfig,

    /// Language-model smoothing configuration.
    pub lm: LmConfig,

    /// Ranking-strategy configuration.
    pub ranker: RankerConfig,

    /// Reranker training configuration.
    pub rerank: RerankConfig,

    /// Evaluation configuration.
    pub eval: EvalConfig,
}

/// Which point stands in for a cell when measuring distances to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CenterMethod {
    /// The running average of the coordinates of the cell's documents.
    /// Falls back to the geometric center when the cell is empty.
    Centroid,
    /// The geometric center of the cell's region, ignoring its documents.
    TrueCenter,
}

/// Grid geometry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Cell width in coordinate units (degrees for the sphere tiling).
    /// Default: 1.0.
    pub cell_width: f64,

    /// How a cell's central point is chosen.
    /// Default: `Centroid`.
    pub center_method: CenterMethod,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cell_width: 1.0,
            center_method: CenterMethod::Centroid,
        }
    }
}

/// Language-model smoothing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LmConfig {
    /// Weight given to the corpus-global distribution when interpolating
    /// word probabilities (Jelinek-Mercer smoothing).
    /// Default: 0.3.
    pub interpolation_factor: f64,

    /// Pseudocount added to global word counts so that every word keeps
    /// nonzero probability mass.
    /// Default: 1.0.
    pub lidstone_alpha: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            interpolation_factor: 0.3,
            lidstone_alpha: 1.0,
        }
    }
}

/// Ranking-strategy configuration.
///
/// Individual rankers read only the fields relevant to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankerConfig {
    /// Score cells in parallel. Serial execution is required when per-cell
    /// debug tracing must come out in cell order.
    /// Default: false.
    pub parallel: bool,

    /// Restrict KL-divergence sums to words present in the document
    /// (the tractable approximation).
    /// Default: true.
    pub partial_kl: bool,

    /// Average the KL divergence over both directions.
    /// Default: false.
    pub symmetric_kl: bool,

    /// Restrict cosine similarity to words present in the document.
    /// Default: true.
    pub partial_cosine: bool,

    /// Use smoothed probabilities in the cosine computation.
    /// Default: false.
    pub smoothed_cosine: bool,

    /// Number of top cells to trace word-level KL contributions for
    /// (0 disables tracing; tracing forces serial scoring).
    /// Default: 0.
    pub kl_trace_cells: usize,

    /// Number of contributing words listed per traced cell.
    /// Default: 10.
    pub kl_trace_words: usize,

    /// Seed for the random baseline ranker. `None` draws from entropy.
    /// Default: None.
    pub random_seed: Option<u64>,

    /// Naive Bayes weight on the cell prior, in [0, 1]; the word-likelihood
    /// term gets the complementary weight.
    /// Default: 0.5.
    pub prior_weight: f64,

    /// Number of coarse cells kept between levels of the hierarchical
    /// classifier ranker.
    /// Default: 10.
    pub beam_size: usize,

    /// Weight on the background ranker when interpolating two rankers.
    /// Default: 0.5.
    pub interpolate_factor: f64,

    /// Kernel bandwidth, in physical distance units, for spreading a
    /// training document's mass over nearby cells in the
    /// average-cell-probability ranker.
    /// Default: 200.0.
    pub kernel_bandwidth: f64,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            partial_kl: true,
            symmetric_kl: false,
            partial_cosine: true,
            smoothed_cosine: false,
            kl_trace_cells: 0,
            kl_trace_words: 10,
            random_seed: None,
            prior_weight: 0.5,
            beam_size: 10,
            interpolate_factor: 0.5,
            kernel_bandwidth: 200.0,
        }
    }
}

/// Reranker training configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    /// Number of top candidates from the initial ranker to rescore.
    /// Default: 10.
    pub top_n: usize,

    /// Training epochs for the linear rescoring classifier.
    /// Default: 10.
    pub epochs: usize,

    /// Perceptron step size.
    /// Default: 1.0.
    pub learning_rate: f64,

    /// Seed for shuffling training instances between epochs.
    /// Default: Some(1).
    pub shuffle_seed: Option<u64>,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            top_n: 10,
            epochs: 10,
            learning_rate: 1.0,
            shuffle_seed: Some(1),
        }
    }
}

/// Evaluation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Rank cutoff for partial credit and the rank histogram.
    /// Default: 10.
    pub credit_rank: usize,

    /// Log a progress line every N evaluated documents (0 disables).
    /// Default: 100.
    pub log_every: usize,

    /// Emit one sub-report per statistics bucket in addition to the
    /// aggregate report.
    /// Default: false.
    pub report_buckets: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            credit_rank: 10,
            log_every: 100,
            report_buckets: false,
        }
    }
}
