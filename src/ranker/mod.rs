//! Cell-ranking strategies.
//!
//! Every ranker answers one question: given a document, in what order do
//! the grid's cells match it? Pointwise strategies (one score per cell,
//! independent of the others) are a closed [`ScoreStrategy`] set driven by
//! a single scoring loop in [`GridRanker`], serial or parallel. Rankers
//! with more structure live in their own types: [`RandomRanker`] shuffles,
//! [`BatchClassifierRanker`] scores the whole test set up front,
//! [`HierarchicalRanker`] beam-searches a grid pyramid, and
//! [`InterpolatingRanker`] blends two rankers.

mod baseline;
mod bayes;
mod cellprob;
mod classifier;
mod hierarchy;
mod interp;
mod pointwise;

pub use baseline::{MostPopular, RandomRanker};
pub use bayes::{BayesFeature, NaiveBayes};
pub use cellprob::AvgCellProb;
pub use classifier::{doc_features, BatchClassifierRanker, CellClassifier};
pub use hierarchy::{HierarchicalRanker, LevelTrace};
pub use interp::InterpolatingRanker;
pub use pointwise::{Cosine, KlDivergence, SumFrequency};

use crate::config::RankerConfig;
use crate::coord::Coord;
use crate::doc::GeoDoc;
use crate::error::{GridLocateError, Result};
use crate::grid::{Grid, GridCell, Tiling};
use crate::lm::Vocab;
use log::debug;
use rayon::prelude::*;
use std::fmt;
use std::str::FromStr;

/// A candidate cell with its score.
pub type CellScore<'a, C> = (&'a GridCell<C>, f64);

/// Produces ranked candidate cells for documents.
pub trait Ranker<C: Coord> {
    /// One-time batch precomputation over the full test set. Must complete
    /// before any document is scored; the default does nothing.
    fn initialize(&mut self, _test_docs: &[&GeoDoc<C>]) -> Result<()> {
        Ok(())
    }

    /// Ranks candidate cells for `doc`, best first.
    ///
    /// When `include_correct` is set, `correct` appears in the output even
    /// if its score is poor, so rank and oracle statistics can always find
    /// it. Ties keep the candidate iteration order.
    fn return_ranked_cells<'a>(
        &'a self,
        doc: &GeoDoc<C>,
        correct: Option<&'a GridCell<C>>,
        include_correct: bool,
    ) -> Vec<CellScore<'a, C>>;
}

/// Scores every candidate independently and sorts descending.
///
/// The one scoring loop shared by all pointwise strategies. Parallel
/// execution fans out over cells; both paths preserve candidate order on
/// ties (the sort is stable and the parallel map keeps input order).
pub(crate) fn score_and_sort<'a, C: Coord>(
    cells: Vec<&'a GridCell<C>>,
    parallel: bool,
    score: impl Fn(&'a GridCell<C>) -> f64 + Sync,
) -> Vec<CellScore<'a, C>> {
    let mut scored: Vec<CellScore<'a, C>> = if parallel {
        cells.par_iter().map(|&cell| (cell, score(cell))).collect()
    } else {
        cells.iter().map(|&cell| (cell, score(cell))).collect()
    };
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    scored
}

/// The closed set of pointwise scoring strategies.
#[derive(Debug, Clone)]
pub enum ScoreStrategy {
    /// Popularity baseline, ignoring the document entirely.
    MostPopular(MostPopular),
    /// Negated KL divergence from the document to the cell.
    KlDivergence(KlDivergence),
    /// Cosine similarity between the distributions.
    Cosine(Cosine),
    /// Summed cell frequency of the document's words.
    SumFrequency(SumFrequency),
    /// Word likelihood convexly combined with a cell prior.
    NaiveBayes(NaiveBayes),
    /// Kernel-smoothed per-word cell probabilities.
    AvgCellProb(AvgCellProb),
    /// A trained multi-label linear classifier over known cells.
    Classifier(CellClassifier),
}

impl ScoreStrategy {
    /// Scores one cell against one document.
    ///
    /// Every strategy must produce an orderable score; a NaN here would
    /// otherwise surface as a panic deep inside the rank sort.
    pub fn score_cell<C: Coord>(&self, doc: &GeoDoc<C>, cell: &GridCell<C>) -> f64 {
        let score = match self {
            ScoreStrategy::MostPopular(s) => s.score_cell(cell),
            ScoreStrategy::KlDivergence(s) => s.score_cell(doc, cell),
            ScoreStrategy::Cosine(s) => s.score_cell(doc, cell),
            ScoreStrategy::SumFrequency(s) => s.score_cell(doc, cell),
            ScoreStrategy::NaiveBayes(s) => s.score_cell(doc, cell),
            ScoreStrategy::AvgCellProb(s) => s.score_cell(doc, cell),
            ScoreStrategy::Classifier(s) => s.score_cell(doc, cell),
        };
        assert!(
            !score.is_nan(),
            "NaN score for document '{}' against {}",
            doc.title(),
            cell
        );
        score
    }
}

#[derive(Debug, Clone, Copy)]
struct KlTraceConfig {
    cells: usize,
    words: usize,
}

/// Pointwise ranker: one [`ScoreStrategy`] applied to every candidate.
#[derive(Debug)]
pub struct GridRanker<'g, T: Tiling> {
    grid: &'g Grid<T>,
    strategy: ScoreStrategy,
    parallel: bool,
    trace_vocab: Option<&'g Vocab>,
    trace: Option<KlTraceConfig>,
}

impl<'g, T: Tiling> GridRanker<'g, T> {
    /// Creates a ranker over `grid` with the given strategy.
    pub fn new(grid: &'g Grid<T>, strategy: ScoreStrategy, parallel: bool) -> Self {
        Self {
            grid,
            strategy,
            parallel,
            trace_vocab: None,
            trace: None,
        }
    }

    /// Builds a pointwise ranker for one of the [`ScoreStrategy`] kinds
    /// expressible from configuration alone.
    ///
    /// Classifier, hierarchical, interpolating and average-cell-probability
    /// ranking need trained models, grid pyramids or training documents and
    /// are constructed through their own types; the random baseline is a
    /// shuffle, not a strategy. The module-level
    /// [`from_kind`](crate::ranker::from_kind) dispatches over all the
    /// configuration-only kinds including random.
    pub fn from_kind(grid: &'g Grid<T>, kind: RankerKind, config: &RankerConfig) -> Result<Self> {
        let strategy = match kind {
            RankerKind::MostPopular => ScoreStrategy::MostPopular(MostPopular::new(false)),
            RankerKind::KlDiv => ScoreStrategy::KlDivergence(KlDivergence::new(
                config.partial_kl,
                config.symmetric_kl,
            )),
            RankerKind::PartialKlDiv => {
                ScoreStrategy::KlDivergence(KlDivergence::new(true, config.symmetric_kl))
            }
            RankerKind::SymmetricKlDiv => {
                ScoreStrategy::KlDivergence(KlDivergence::new(config.partial_kl, true))
            }
            RankerKind::CosineSimilarity => ScoreStrategy::Cosine(Cosine::new(
                config.partial_cosine,
                config.smoothed_cosine,
            )),
            RankerKind::SumFrequency => ScoreStrategy::SumFrequency(SumFrequency),
            RankerKind::NaiveBayes => {
                ScoreStrategy::NaiveBayes(NaiveBayes::new(grid, config.prior_weight)?)
            }
            other => {
                return Err(GridLocateError::Config(format!(
                    "ranker '{other}' is built through its own constructor"
                )))
            }
        };
        Ok(Self::new(grid, strategy, config.parallel))
    }

    /// Enables word-level KL contribution traces for the top
    /// `config.kl_trace_cells` candidates, listing `config.kl_trace_words`
    /// words each. A zero cell count leaves tracing off. Tracing forces
    /// serial scoring so the trace comes out in rank order.
    pub fn with_kl_trace(mut self, vocab: &'g Vocab, config: &RankerConfig) -> Self {
        if config.kl_trace_cells == 0 {
            return self;
        }
        self.trace_vocab = Some(vocab);
        self.trace = Some(KlTraceConfig {
            cells: config.kl_trace_cells,
            words: config.kl_trace_words,
        });
        self
    }

    /// The grid this ranker scores against.
    pub fn grid(&self) -> &'g Grid<T> {
        self.grid
    }

    /// The strategy in use.
    pub fn strategy(&self) -> &ScoreStrategy {
        &self.strategy
    }

    fn log_kl_trace(&self, doc: &GeoDoc<T::Coord>, ranked: &[CellScore<'_, T::Coord>]) {
        let (vocab, trace) = match (self.trace_vocab, self.trace) {
            (Some(v), Some(t)) => (v, t),
            _ => return,
        };
        if !matches!(self.strategy, ScoreStrategy::KlDivergence(_)) {
            return;
        }
        for &(cell, score) in ranked.iter().take(trace.cells) {
            let contribs = doc.lm().kl_contributions(cell.lm());
            let listed: Vec<String> = contribs
                .iter()
                .take(trace.words)
                .map(|&(word, c)| format!("{}={c:+.5}", vocab.word(word).unwrap_or("?")))
                .collect();
            debug!(
                "KL trace for '{}' vs {} (score {score:.5}): {}",
                doc.title(),
                cell.describe(),
                listed.join(" ")
            );
        }
    }
}

impl<'g, T: Tiling> Ranker<T::Coord> for GridRanker<'g, T> {
    fn return_ranked_cells<'a>(
        &'a self,
        doc: &GeoDoc<T::Coord>,
        correct: Option<&'a GridCell<T::Coord>>,
        include_correct: bool,
    ) -> Vec<CellScore<'a, T::Coord>> {
        let include = if include_correct { correct } else { None };
        let cells = self.grid.nonempty_cells_including(include);
        let parallel = self.parallel && self.trace.is_none();
        let ranked = score_and_sort(cells, parallel, |cell| self.strategy.score_cell(doc, cell));
        self.log_kl_trace(doc, &ranked);
        ranked
    }
}

/// Ranking-strategy names accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankerKind {
    /// KL divergence with configured partial/symmetric flags.
    KlDiv,
    /// KL divergence restricted to the document's words.
    PartialKlDiv,
    /// KL divergence averaged over both directions.
    SymmetricKlDiv,
    /// Cosine similarity.
    CosineSimilarity,
    /// Summed cell frequency of document words.
    SumFrequency,
    /// Naive Bayes.
    NaiveBayes,
    /// Random shuffle baseline.
    Random,
    /// Popularity baseline.
    MostPopular,
    /// Kernel-smoothed average cell probability.
    AvgCellProb,
    /// Trained linear classifier over cells.
    Classifier,
    /// Coarse-to-fine beam search over a grid pyramid.
    Hierarchical,
    /// Blend of a foreground and a background ranker.
    Interpolate,
}

impl FromStr for RankerKind {
    type Err = GridLocateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "kl-div" => Ok(RankerKind::KlDiv),
            "partial-kl-div" => Ok(RankerKind::PartialKlDiv),
            "symmetric-kl-div" => Ok(RankerKind::SymmetricKlDiv),
            "cosine-similarity" => Ok(RankerKind::CosineSimilarity),
            "sum-frequency" => Ok(RankerKind::SumFrequency),
            "naive-bayes" => Ok(RankerKind::NaiveBayes),
            "random" => Ok(RankerKind::Random),
            "most-popular" => Ok(RankerKind::MostPopular),
            "avg-cell-prob" => Ok(RankerKind::AvgCellProb),
            "classifier" => Ok(RankerKind::Classifier),
            "hierarchical" => Ok(RankerKind::Hierarchical),
            "interpolate" => Ok(RankerKind::Interpolate),
            other => Err(GridLocateError::Config(format!(
                "unknown ranking strategy '{other}'"
            ))),
        }
    }
}

impl fmt::Display for RankerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RankerKind::KlDiv => "kl-div",
            RankerKind::PartialKlDiv => "partial-kl-div",
            RankerKind::SymmetricKlDiv => "symmetric-kl-div",
            RankerKind::CosineSimilarity => "cosine-similarity",
            RankerKind::SumFrequency => "sum-frequency",
            RankerKind::NaiveBayes => "naive-bayes",
            RankerKind::Random => "random",
            RankerKind::MostPopular => "most-popular",
            RankerKind::AvgCellProb => "avg-cell-prob",
            RankerKind::Classifier => "classifier",
            RankerKind::Hierarchical => "hierarchical",
            RankerKind::Interpolate => "interpolate",
        };
        write!(f, "{name}")
    }
}

/// Builds a boxed ranker from a parsed kind name.
///
/// Covers the kinds that need nothing beyond the grid and configuration:
/// every pointwise [`ScoreStrategy`] plus the random baseline, which draws
/// its seed from `config.random_seed`. Model-backed kinds (classifier,
/// hierarchical, interpolating, average-cell-probability) are constructed
/// through their own types.
pub fn from_kind<'g, T: Tiling>(
    grid: &'g Grid<T>,
    kind: RankerKind,
    config: &RankerConfig,
) -> Result<Box<dyn Ranker<T::Coord> + 'g>> {
    if kind == RankerKind::Random {
        return Ok(Box::new(RandomRanker::new(grid, config)));
    }
    Ok(Box::new(GridRanker::from_kind(grid, kind, config)?))
}

#[cfg(test)]
pub(crate) mod testutil {
    use crate::config::{GridConfig, LmConfig};
    use crate::coord::SphereCoord;
    use crate::doc::{Corpus, DocSplit, RawDoc};
    use crate::grid::{Grid, SphereTiling};

    /// Two training documents saying "paris" around (1,1), one saying
    /// "london" around (3,3), on a 2-degree grid. The standard small
    /// fixture for ranker tests.
    pub(crate) fn paris_fixture() -> (Corpus<SphereCoord>, Grid<SphereTiling>) {
        let mut corpus = Corpus::new(LmConfig::default());
        let doc = |title: &str, lat: f64, long: f64, salience: f64,
                   split: DocSplit,
                   words: Vec<(&str, f64)>| RawDoc {
            title: title.to_string(),
            coord: Some(SphereCoord::new(lat, long).unwrap()),
            salience,
            split,
            word_counts: words.into_iter().map(|(w, c)| (w.to_string(), c)).collect(),
        };
        corpus.add(doc(
            "paris-1",
            1.0,
            1.0,
            10.0,
            DocSplit::Training,
            vec![("paris", 10.0)],
        ));
        corpus.add(doc(
            "paris-2",
            1.2,
            0.8,
            3.0,
            DocSplit::Training,
            vec![("paris", 10.0)],
        ));
        corpus.add(doc(
            "london",
            3.0,
            3.0,
            5.0,
            DocSplit::Training,
            vec![("london", 5.0)],
        ));
        corpus.add(doc(
            "test-paris",
            1.1,
            1.1,
            0.0,
            DocSplit::Test,
            vec![("paris", 3.0)],
        ));
        corpus.finish();
        let mut grid = Grid::new(
            SphereTiling::new(2.0).unwrap(),
            GridConfig::default(),
            corpus.factory(),
        );
        grid.add_training_documents(corpus.docs_in_split(DocSplit::Training));
        grid.finish();
        (corpus, grid)
    }

    /// The test document of the fixture.
    pub(crate) fn test_doc(
        corpus: &Corpus<SphereCoord>,
    ) -> &crate::doc::GeoDoc<SphereCoord> {
        corpus
            .docs_in_split(DocSplit::Test)
            .next()
            .expect("fixture has a test document")
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::{paris_fixture, test_doc};
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!(
            "partial-kl-div".parse::<RankerKind>().unwrap(),
            RankerKind::PartialKlDiv
        );
        assert_eq!(
            "most-popular".parse::<RankerKind>().unwrap(),
            RankerKind::MostPopular
        );
        assert!("nearest-neighbor".parse::<RankerKind>().is_err());
        assert_eq!(RankerKind::AvgCellProb.to_string(), "avg-cell-prob");
    }

    #[test]
    fn test_from_kind_rejects_model_backed_strategies() {
        let (_corpus, grid) = paris_fixture();
        let config = RankerConfig::default();
        assert!(GridRanker::from_kind(&grid, RankerKind::KlDiv, &config).is_ok());
        assert!(GridRanker::from_kind(&grid, RankerKind::Classifier, &config).is_err());
        assert!(GridRanker::from_kind(&grid, RankerKind::Hierarchical, &config).is_err());
        assert!(from_kind(&grid, RankerKind::Classifier, &config).is_err());
    }

    #[test]
    fn test_from_kind_builds_seeded_random_ranker() {
        let (corpus, grid) = paris_fixture();
        let config = RankerConfig {
            random_seed: Some(11),
            ..Default::default()
        };
        let keys = |ranker: &dyn Ranker<crate::coord::SphereCoord>| {
            ranker
                .return_ranked_cells(test_doc(&corpus), None, false)
                .iter()
                .map(|(cell, _)| cell.key())
                .collect::<Vec<_>>()
        };
        let first = from_kind(&grid, RankerKind::Random, &config).unwrap();
        let second = from_kind(&grid, RankerKind::Random, &config).unwrap();
        assert_eq!(keys(first.as_ref()), keys(second.as_ref()));
        assert_eq!(keys(first.as_ref()).len(), grid.num_nonempty_cells());
    }

    #[test]
    fn test_ranking_sorted_descending() {
        let (corpus, grid) = paris_fixture();
        let config = RankerConfig::default();
        for kind in [
            RankerKind::KlDiv,
            RankerKind::CosineSimilarity,
            RankerKind::SumFrequency,
            RankerKind::NaiveBayes,
            RankerKind::MostPopular,
        ] {
            let ranker = GridRanker::from_kind(&grid, kind, &config).unwrap();
            let ranked = ranker.return_ranked_cells(test_doc(&corpus), None, false);
            assert_eq!(ranked.len(), grid.num_nonempty_cells(), "{kind}");
            for pair in ranked.windows(2) {
                assert!(pair[0].1 >= pair[1].1, "{kind} not sorted");
            }
        }
    }

    #[test]
    fn test_parallel_matches_serial() {
        let (corpus, grid) = paris_fixture();
        let mut config = RankerConfig::default();
        let serial = GridRanker::from_kind(&grid, RankerKind::KlDiv, &config).unwrap();
        config.parallel = true;
        let parallel = GridRanker::from_kind(&grid, RankerKind::KlDiv, &config).unwrap();
        let doc = test_doc(&corpus);
        let a = serial.return_ranked_cells(doc, None, false);
        let b = parallel.return_ranked_cells(doc, None, false);
        assert_eq!(a.len(), b.len());
        for ((ca, sa), (cb, sb)) in a.iter().zip(&b) {
            assert!(std::ptr::eq(*ca, *cb));
            assert!((sa - sb).abs() < 1e-12);
        }
    }

    #[test]
    fn test_kl_trace_follows_config() {
        let (corpus, grid) = paris_fixture();
        let mut config = RankerConfig::default();
        config.parallel = true;

        // The default trace cell count of zero leaves tracing off.
        let untraced = GridRanker::from_kind(&grid, RankerKind::KlDiv, &config)
            .unwrap()
            .with_kl_trace(corpus.factory().vocab(), &config);
        assert!(untraced.trace.is_none());

        config.kl_trace_cells = 2;
        config.kl_trace_words = 3;
        let traced = GridRanker::from_kind(&grid, RankerKind::KlDiv, &config)
            .unwrap()
            .with_kl_trace(corpus.factory().vocab(), &config);
        let trace = traced.trace.unwrap();
        assert_eq!(trace.cells, 2);
        assert_eq!(trace.words, 3);

        // Tracing forces serial scoring without changing the ranking.
        let doc = test_doc(&corpus);
        let plain = untraced.return_ranked_cells(doc, None, false);
        let logged = traced.return_ranked_cells(doc, None, false);
        assert_eq!(plain.len(), logged.len());
        for ((ca, sa), (cb, sb)) in plain.iter().zip(&logged) {
            assert!(std::ptr::eq(*ca, *cb));
            assert!((sa - sb).abs() < 1e-12);
        }
    }

    #[test]
    fn test_forced_inclusion_of_unrecorded_cell() {
        let (corpus, grid) = paris_fixture();
        let lonely = crate::coord::SphereCoord::new(-40.0, 100.0).unwrap();
        let transient = grid.find_best_cell_for_coord(lonely, true).unwrap();
        let ranker =
            GridRanker::from_kind(&grid, RankerKind::KlDiv, &RankerConfig::default()).unwrap();
        let ranked =
            ranker.return_ranked_cells(test_doc(&corpus), Some(transient.as_ref()), true);
        assert_eq!(ranked.len(), grid.num_nonempty_cells() + 1);
        let found = ranked
            .iter()
            .filter(|(c, _)| std::ptr::eq(*c, transient.as_ref()))
            .count();
        assert_eq!(found, 1);
    }

    #[test]
    #[should_panic(expected = "NaN score for document")]
    fn test_nan_score_panics_with_document_context() {
        use crate::config::{GridConfig, LmConfig};
        use crate::doc::{Corpus, DocSplit, RawDoc};
        use crate::grid::SphereTiling;

        let mut corpus = Corpus::new(LmConfig::default());
        let doc = |title: &str, salience: f64, split: DocSplit| RawDoc {
            title: title.to_string(),
            coord: Some(crate::coord::SphereCoord::new(1.0, 1.0).unwrap()),
            salience,
            split,
            word_counts: vec![("paris".to_string(), 2.0)],
        };
        corpus.add(doc("bad-salience", f64::NAN, DocSplit::Training));
        corpus.add(doc("query", 1.0, DocSplit::Test));
        corpus.finish();
        let mut grid = Grid::new(
            SphereTiling::new(2.0).unwrap(),
            GridConfig::default(),
            corpus.factory(),
        );
        grid.add_training_documents(corpus.docs_in_split(DocSplit::Training));
        grid.finish();

        // Salience sums absorb the NaN silently; the scoring path is the
        // first place it can be pinned to a document and cell.
        let ranker = GridRanker::new(
            &grid,
            ScoreStrategy::MostPopular(MostPopular::new(true)),
            false,
        );
        let query: Vec<_> = corpus.docs_in_split(DocSplit::Test).collect();
        ranker.return_ranked_cells(query[0], None, false);
    }
}
