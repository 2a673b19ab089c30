//! # GridLocate - Grid-Based Document Geolocation
//!
//! GridLocate predicts where a text document was written about by comparing
//! its word distribution against language models aggregated over a grid of
//! cells covering coordinate space.
//!
//! ## Overview
//!
//! Training documents with known coordinates are ingested into a [`Corpus`],
//! which builds an interpolated unigram model per document plus a corpus-wide
//! backoff distribution. A [`Grid`] then buckets the training documents into
//! cells and merges their models into one model per cell. At inference time a
//! ranking strategy scores every non-empty cell against a test document's
//! model, and the top cell's central point becomes the predicted location.
//!
//! ## Key Features
//!
//! - **Lazily populated cell grids** over spherical and one-dimensional
//!   temporal coordinate systems
//! - **A family of ranking strategies**: KL divergence, cosine similarity,
//!   naive Bayes, sum-frequency, average cell probability, trained linear
//!   classifiers, and hierarchical beam search over nested grids
//! - **Discriminative reranking** of the top-ranked candidates
//! - **Bucketed evaluation reports** with rank histograms, partial credit,
//!   and oracle error distances
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gridlocate::{
//!     Corpus, DocEvaluator, DocSplit, EvalConfig, Grid, GridConfig, GridRanker,
//!     LmConfig, RankerConfig, RankerKind, SphereTiling,
//! };
//!
//! // Ingest documents with known coordinates
//! let mut corpus = Corpus::new(LmConfig::default());
//! for raw in read_documents("corpus.tsv")? {
//!     corpus.add(raw);
//! }
//! corpus.finish();
//!
//! // Aggregate the training split into a 1-degree cell grid
//! let grid_config = GridConfig::default();
//! let tiling = SphereTiling::from_config(&grid_config)?;
//! let mut grid = Grid::new(tiling, grid_config, corpus.factory());
//! for doc in corpus.docs_in_split(DocSplit::Training) {
//!     grid.add_document(doc);
//! }
//! grid.finish();
//!
//! // Rank cells by KL divergence and evaluate the test split
//! let ranker = GridRanker::from_kind(&grid, RankerKind::KlDiv, &RankerConfig::default())?;
//! let mut evaluator = DocEvaluator::new(&grid, ranker, EvalConfig::default());
//! let test_docs: Vec<_> = corpus.docs_in_split(DocSplit::Test).collect();
//! let stats = evaluator.evaluate_all(&test_docs)?;
//! println!("{}", stats.report());
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`coord`] - Coordinate types and distance metrics
//! - [`doc`] - Document ingestion, corpora, and train/dev/test splits
//! - [`lm`] - Unigram language models, vocabulary, and smoothing
//! - [`grid`] - Cell grids over coordinate space
//! - [`ranker`] - Cell-ranking strategies
//! - [`classify`] - Linear classifiers, perceptron training, batch scoring
//! - [`rerank`] - Discriminative reranking of top candidates
//! - [`eval`] - Evaluation driver and grouped statistics
//!
//! ## Reranking the Initial Ranking
//!
//! ```rust,ignore
//! use gridlocate::{CandidateFeaturizer, Reranker, RerankConfig, WordFeature};
//!
//! let featurizer = CandidateFeaturizer::WordByWord {
//!     features: vec![WordFeature::KlContribution, WordFeature::BinaryMatch],
//! };
//! let config = RerankConfig::default();
//! let mut reranker = Reranker::new(initial, featurizer, corpus.factory().vocab(), &config);
//! reranker.train(&grid, corpus.docs_in_split(DocSplit::Dev))?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod classify;
pub mod config;
pub mod coord;
pub mod doc;
pub mod error;
pub mod eval;
pub mod grid;
pub mod lm;
pub mod ranker;
pub mod rerank;

// Re-export commonly used types
pub use classify::{FeatureVector, LinearScorer, MultiLabelScorer, PerceptronTrainer};
pub use config::{CenterMethod, Config, EvalConfig, GridConfig, LmConfig, RankerConfig, RerankConfig};
pub use coord::{Coord, SphereCoord, TimeCoord};
pub use doc::{Corpus, DocSplit, DocStatus, GeoDoc, RawDoc};
pub use error::{GridLocateError, Result};
pub use eval::{DocEvalResult, DocEvaluator, DocOutcome, EvalStats, GroupedEvalStats, NOT_FOUND_RANK};
pub use grid::{CellKey, Grid, GridCell, SphereTiling, Tiling, YearTiling};
pub use lm::{LangModelFactory, Unigram, Vocab, WordId};
pub use ranker::{GridRanker, Ranker, RankerKind, ScoreStrategy};
pub use rerank::{CandidateFeaturizer, Reranker, WordFeature};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_ranker_kind_round_trip() {
        let kind: RankerKind = "kl-div".parse().unwrap();
        assert_eq!(kind, RankerKind::KlDiv);
        assert_eq!(kind.to_string(), "kl-div");
    }
}
