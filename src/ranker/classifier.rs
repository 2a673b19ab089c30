//! Classifier-backed rankers.
//!
//! [`CellClassifier`] is an in-process multi-label perceptron over grid
//! cells, usable directly as a pointwise strategy. [`BatchClassifierRanker`]
//! instead collects the whole test set up front, sends per-candidate
//! feature vectors through a [`BatchScorer`], and answers later ranking
//! calls from the cached scores.

use crate::classify::{
    BatchScorer, FeatureVector, MultiLabelScorer, PerceptronTrainer, ScoreConversion, ScoreRequest,
};
use crate::coord::Coord;
use crate::doc::GeoDoc;
use crate::error::{GridLocateError, Result};
use crate::grid::{CellKey, Grid, GridCell, Tiling};
use crate::lm::Unigram;
use crate::ranker::{score_and_sort, CellScore, Ranker};
use log::{debug, info};
use std::collections::HashMap;

/// Relative-frequency feature vector of a document's words.
///
/// Word ids double as feature ids, so every model trained against one
/// corpus factory stays aligned with documents from the same factory. An
/// empty distribution yields an empty vector.
pub fn doc_features<C: Coord>(doc: &GeoDoc<C>) -> FeatureVector {
    let mut fv = FeatureVector::new();
    let total = doc.lm().total_tokens();
    if total == 0.0 {
        return fv;
    }
    for (word, count) in doc.lm().iter_counts() {
        fv.push(word, count / total);
    }
    fv
}

/// Per-candidate feature vector for batch scoring: each document word
/// contributes its count times the candidate cell's unsmoothed probability
/// of that word.
fn candidate_features<C: Coord>(doc_lm: &Unigram, cell: &GridCell<C>) -> FeatureVector {
    let mut fv = FeatureVector::new();
    for (word, count) in doc_lm.iter_counts() {
        fv.push(word, count * cell.lm().unsmoothed_prob(word));
    }
    fv
}

/// Multi-label linear model assigning documents to a fixed set of cells.
#[derive(Debug, Clone)]
pub struct CellClassifier {
    scorer: MultiLabelScorer,
    label_of: HashMap<CellKey, usize>,
}

impl CellClassifier {
    /// Trains over the grid's non-empty cells as the label set.
    pub fn train<'a, T: Tiling>(
        grid: &Grid<T>,
        docs: impl IntoIterator<Item = &'a GeoDoc<T::Coord>>,
        trainer: &PerceptronTrainer,
    ) -> Result<Self> {
        let keys: Vec<CellKey> = grid.iter_nonempty_cells().map(|cell| cell.key()).collect();
        Self::train_with_labels(grid.tiling(), keys, docs, trainer)
    }

    /// Trains with an explicit label set, one label per cell key in the
    /// given order.
    ///
    /// The hierarchical ranker trains per-parent classifiers this way,
    /// listing every child key whether populated or not. Documents whose
    /// coordinate falls outside the label set are skipped.
    pub fn train_with_labels<'a, T: Tiling>(
        tiling: &T,
        label_keys: Vec<CellKey>,
        docs: impl IntoIterator<Item = &'a GeoDoc<T::Coord>>,
        trainer: &PerceptronTrainer,
    ) -> Result<Self> {
        if label_keys.is_empty() {
            return Err(GridLocateError::Training(
                "no cells available as classifier labels".to_string(),
            ));
        }
        let label_of: HashMap<CellKey, usize> = label_keys
            .iter()
            .enumerate()
            .map(|(label, &key)| (key, label))
            .collect();
        let mut instances = Vec::new();
        for doc in docs {
            let key = match doc.coord().and_then(|c| tiling.key_for_coord(c)) {
                Some(key) => key,
                None => continue,
            };
            let label = match label_of.get(&key) {
                Some(&label) => label,
                None => continue,
            };
            let fv = doc_features(doc);
            if fv.is_empty() {
                debug!(
                    "skipping wordless document '{}' in cell classifier training",
                    doc.title()
                );
                continue;
            }
            instances.push((fv, label));
        }
        if instances.is_empty() {
            return Err(GridLocateError::Training(
                "no usable documents for cell classifier training".to_string(),
            ));
        }
        debug!(
            "training cell classifier: {} instances over {} labels",
            instances.len(),
            label_keys.len()
        );
        let scorer = trainer.train_multilabel(&instances, label_keys.len());
        Ok(Self { scorer, label_of })
    }

    /// Number of labels the model was trained over.
    pub fn num_labels(&self) -> usize {
        self.scorer.num_labels()
    }

    /// Scores one cell key for a prebuilt feature vector. `None` when the
    /// key was not part of the label set.
    pub(crate) fn score_key(&self, fv: &FeatureVector, key: CellKey) -> Option<f64> {
        self.label_of.get(&key).map(|&label| self.scorer.score_label(label, fv))
    }

    pub(crate) fn score_cell<C: Coord>(&self, doc: &GeoDoc<C>, cell: &GridCell<C>) -> f64 {
        let fv = doc_features(doc);
        self.score_key(&fv, cell.key()).unwrap_or(f64::NEG_INFINITY)
    }
}

/// Ranker that scores the whole test set in one batch through a
/// [`BatchScorer`], then ranks from the cached per-cell log-probabilities.
///
/// Candidate order inside each request follows the grid's non-empty cell
/// order, so cached score vectors index directly by cell label.
pub struct BatchClassifierRanker<'g, T: Tiling, S: BatchScorer> {
    grid: &'g Grid<T>,
    label_of: HashMap<CellKey, usize>,
    scorer: S,
    conversion: ScoreConversion,
    cache: HashMap<String, Vec<f64>>,
    parallel: bool,
    initialized: bool,
}

impl<'g, T: Tiling, S: BatchScorer> BatchClassifierRanker<'g, T, S> {
    /// Creates a batch ranker over `grid` deferring scores to `scorer`.
    pub fn new(grid: &'g Grid<T>, scorer: S, conversion: ScoreConversion, parallel: bool) -> Self {
        let label_of = grid
            .iter_nonempty_cells()
            .enumerate()
            .map(|(label, cell)| (cell.key(), label))
            .collect();
        Self {
            grid,
            label_of,
            scorer,
            conversion,
            cache: HashMap::new(),
            parallel,
            initialized: false,
        }
    }
}

impl<'g, T: Tiling, S: BatchScorer + Sync> Ranker<T::Coord> for BatchClassifierRanker<'g, T, S> {
    fn initialize(&mut self, test_docs: &[&GeoDoc<T::Coord>]) -> Result<()> {
        let requests: Vec<ScoreRequest> = test_docs
            .iter()
            .map(|doc| ScoreRequest {
                title: doc.title().to_string(),
                candidates: self
                    .grid
                    .iter_nonempty_cells()
                    .map(|cell| candidate_features(doc.lm(), cell))
                    .collect(),
            })
            .collect();
        info!(
            "batch-scoring {} documents against {} cells",
            requests.len(),
            self.label_of.len()
        );
        let raw = self.scorer.score_batch(&requests)?;
        for (doc, scores) in test_docs.iter().zip(raw) {
            let log_probs = self.conversion.to_log_probs(&scores);
            for &lp in &log_probs {
                assert!(
                    !lp.is_nan(),
                    "NaN batch score for document '{}'",
                    doc.title()
                );
            }
            self.cache.insert(doc.title().to_string(), log_probs);
        }
        self.initialized = true;
        Ok(())
    }

    fn return_ranked_cells<'a>(
        &'a self,
        doc: &GeoDoc<T::Coord>,
        correct: Option<&'a GridCell<T::Coord>>,
        include_correct: bool,
    ) -> Vec<CellScore<'a, T::Coord>> {
        assert!(
            self.initialized,
            "return_ranked_cells() before initialize() on the batch classifier ranker"
        );
        let scores = match self.cache.get(doc.title()) {
            Some(scores) => scores,
            None => panic!(
                "document '{}' was not part of the batch-scored test set",
                doc.title()
            ),
        };
        let include = if include_correct { correct } else { None };
        let cells = self.grid.nonempty_cells_including(include);
        score_and_sort(cells, self.parallel, |cell| {
            match self.label_of.get(&cell.key()) {
                Some(&label) => scores[label],
                None => f64::NEG_INFINITY,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{LinearBatchScorer, LinearScorer};
    use crate::doc::DocSplit;
    use crate::ranker::testutil::{paris_fixture, test_doc};
    use crate::ranker::{GridRanker, ScoreStrategy};

    fn trainer() -> PerceptronTrainer {
        PerceptronTrainer::new(10, 1.0, Some(7))
    }

    #[test]
    fn test_doc_features_relative_frequencies() {
        let (corpus, _grid) = paris_fixture();
        let fv = doc_features(test_doc(&corpus));
        assert_eq!(fv.len(), 1);
        let total: f64 = fv.iter().map(|&(_, v)| v).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cell_classifier_separates_fixture() {
        let (corpus, grid) = paris_fixture();
        let clf =
            CellClassifier::train(&grid, corpus.docs_in_split(DocSplit::Training), &trainer())
                .unwrap();
        assert_eq!(clf.num_labels(), 2);
        let ranker = GridRanker::new(&grid, ScoreStrategy::Classifier(clf), false);
        let ranked = ranker.return_ranked_cells(test_doc(&corpus), None, false);
        let paris_id = corpus.factory().word_id("paris").unwrap();
        assert!(ranked[0].0.lm().count(paris_id) > 0.0);
        assert!(ranked[0].1 > ranked[1].1);
    }

    #[test]
    fn test_cell_classifier_unknown_key_scores_lowest() {
        use crate::coord::SphereCoord;

        let (corpus, grid) = paris_fixture();
        let clf =
            CellClassifier::train(&grid, corpus.docs_in_split(DocSplit::Training), &trainer())
                .unwrap();
        let far = SphereCoord::new(-40.0, -100.0).unwrap();
        let transient = grid.find_best_cell_for_coord(far, true).unwrap();
        let score = clf.score_cell(test_doc(&corpus), &transient);
        assert_eq!(score, f64::NEG_INFINITY);
    }

    #[test]
    fn test_cell_classifier_requires_labels() {
        use crate::config::{GridConfig, LmConfig};
        use crate::doc::Corpus;
        use crate::grid::{Grid, SphereTiling};

        let mut corpus = Corpus::<crate::coord::SphereCoord>::new(LmConfig::default());
        corpus.finish();
        let tiling = SphereTiling::new(2.0).unwrap();
        let mut grid = Grid::new(tiling, GridConfig::default(), corpus.factory());
        grid.finish();
        let err = CellClassifier::train(&grid, corpus.docs(), &trainer());
        assert!(matches!(err, Err(GridLocateError::Training(_))));
    }

    #[test]
    fn test_batch_ranker_ranks_from_cached_scores() {
        let (corpus, grid) = paris_fixture();
        let vocab_len = corpus.factory().vocab().len();
        // Uniform positive weights make each candidate's raw score the
        // count-weighted overlap with the cell, so the paris cell wins.
        let scorer = LinearBatchScorer::new(LinearScorer::new(vec![1.0; vocab_len]));
        let mut ranker = BatchClassifierRanker::new(
            &grid,
            scorer,
            ScoreConversion::Logistic { renormalize: true },
            false,
        );
        let docs: Vec<&GeoDoc<_>> = corpus.docs_in_split(DocSplit::Test).collect();
        ranker.initialize(&docs).unwrap();
        let ranked = ranker.return_ranked_cells(test_doc(&corpus), None, false);
        assert_eq!(ranked.len(), 2);
        let paris_id = corpus.factory().word_id("paris").unwrap();
        assert!(ranked[0].0.lm().count(paris_id) > 0.0);
        assert!(ranked[0].1 > ranked[1].1);
    }

    #[test]
    fn test_batch_ranker_parallel_matches_serial() {
        let (corpus, grid) = paris_fixture();
        let vocab_len = corpus.factory().vocab().len();
        let docs: Vec<&GeoDoc<_>> = corpus.docs_in_split(DocSplit::Test).collect();
        let rank = |parallel: bool| {
            let scorer = LinearBatchScorer::new(LinearScorer::new(vec![1.0; vocab_len]));
            let mut ranker = BatchClassifierRanker::new(
                &grid,
                scorer,
                ScoreConversion::Logistic { renormalize: true },
                parallel,
            );
            ranker.initialize(&docs).unwrap();
            ranker
                .return_ranked_cells(test_doc(&corpus), None, false)
                .iter()
                .map(|&(cell, score)| (cell.key(), score))
                .collect::<Vec<_>>()
        };
        assert_eq!(rank(false), rank(true));
    }

    #[test]
    fn test_batch_ranker_forced_cell_scores_lowest() {
        use crate::coord::SphereCoord;

        let (corpus, grid) = paris_fixture();
        let vocab_len = corpus.factory().vocab().len();
        let scorer = LinearBatchScorer::new(LinearScorer::new(vec![1.0; vocab_len]));
        let mut ranker = BatchClassifierRanker::new(
            &grid,
            scorer,
            ScoreConversion::default(),
            false,
        );
        let docs: Vec<&GeoDoc<_>> = corpus.docs_in_split(DocSplit::Test).collect();
        ranker.initialize(&docs).unwrap();
        let far = SphereCoord::new(-40.0, -100.0).unwrap();
        let transient = grid.find_best_cell_for_coord(far, true).unwrap();
        let ranked = ranker.return_ranked_cells(test_doc(&corpus), Some(&transient), true);
        assert_eq!(ranked.len(), 3);
        assert!(std::ptr::eq(ranked[2].0, &*transient));
        assert_eq!(ranked[2].1, f64::NEG_INFINITY);
    }

    #[test]
    #[should_panic(expected = "before initialize()")]
    fn test_batch_ranker_requires_initialize() {
        let (corpus, grid) = paris_fixture();
        let scorer = LinearBatchScorer::new(LinearScorer::new(vec![1.0]));
        let ranker =
            BatchClassifierRanker::new(&grid, scorer, ScoreConversion::default(), false);
        ranker.return_ranked_cells(test_doc(&corpus), None, false);
    }
}
