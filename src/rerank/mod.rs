//! Discriminative reranking of an initial ranker's top candidates.
//!
//! A [`Reranker`] wraps any [`Ranker`], featurizes the document/cell pairs
//! in its top N, and rescores them with an averaged perceptron trained in
//! ranking mode. Candidates past the top N keep their initial scores and
//! order.

use crate::classify::{FeatureMapper, FeatureVector, LinearScorer, PerceptronTrainer};
use crate::config::RerankConfig;
use crate::coord::Coord;
use crate::doc::GeoDoc;
use crate::error::{GridLocateError, Result};
use crate::grid::{Grid, GridCell, Tiling};
use crate::lm::Vocab;
use crate::ranker::{CellScore, Ranker};
use log::{debug, info};

/// Per-word candidate features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordFeature {
    /// The word's signed contribution to `KL(doc || cell)`.
    KlContribution,
    /// 1 when the cell has seen the word at all.
    BinaryMatch,
    /// Document count times cell count.
    CountProduct,
    /// Document relative frequency times cell relative frequency.
    ProbProduct,
}

/// How a document/cell candidate becomes a feature vector.
///
/// Every variant carries the candidate's initial score as the
/// `initial-score` feature, so the trained model can fall back to the
/// initial ranking when word evidence is thin.
#[derive(Debug, Clone)]
pub enum CandidateFeaturizer {
    /// Only the initial score.
    Trivial,
    /// The initial score plus the chosen per-word features, one feature
    /// per document word, named through the corpus vocabulary.
    WordByWord {
        /// Word features to emit.
        features: Vec<WordFeature>,
    },
}

impl CandidateFeaturizer {
    fn emit<C: Coord>(
        &self,
        doc: &GeoDoc<C>,
        cell: &GridCell<C>,
        initial_score: f64,
        vocab: &Vocab,
        add: &mut dyn FnMut(String, f64),
    ) {
        add("initial-score".to_string(), initial_score);
        let features = match self {
            CandidateFeaturizer::Trivial => return,
            CandidateFeaturizer::WordByWord { features } => features,
        };
        for feature in features {
            match feature {
                WordFeature::KlContribution => {
                    for (word, contrib) in doc.lm().kl_contributions(cell.lm()) {
                        let name = vocab.word(word).unwrap_or("?");
                        add(format!("kl:{name}"), contrib);
                    }
                }
                WordFeature::BinaryMatch => {
                    for (word, _) in doc.lm().iter_counts() {
                        if cell.lm().count(word) > 0.0 {
                            let name = vocab.word(word).unwrap_or("?");
                            add(format!("match:{name}"), 1.0);
                        }
                    }
                }
                WordFeature::CountProduct => {
                    for (word, count) in doc.lm().iter_counts() {
                        let name = vocab.word(word).unwrap_or("?");
                        add(format!("countprod:{name}"), count * cell.lm().count(word));
                    }
                }
                WordFeature::ProbProduct => {
                    for (word, _) in doc.lm().iter_counts() {
                        let name = vocab.word(word).unwrap_or("?");
                        add(
                            format!("probprod:{name}"),
                            doc.lm().unsmoothed_prob(word) * cell.lm().unsmoothed_prob(word),
                        );
                    }
                }
            }
        }
    }
}

/// Rescores an initial ranker's top candidates with a trained linear
/// model.
///
/// Training needs the grid to locate each document's correct cell; the
/// initial ranker is asked to force that cell into its output so every
/// candidate set contains exactly one positive. Until [`train`]
/// (Self::train) has run, ranking is a fatal contract violation.
pub struct Reranker<'v, R> {
    initial: R,
    featurizer: CandidateFeaturizer,
    vocab: &'v Vocab,
    top_n: usize,
    trainer: PerceptronTrainer,
    mapper: FeatureMapper,
    scorer: Option<LinearScorer>,
}

impl<'v, R> Reranker<'v, R> {
    /// Wraps `initial`, rescoring its top `config.top_n` candidates with
    /// a perceptron trained per the configured epochs, step size and
    /// shuffle seed.
    pub fn new(
        initial: R,
        featurizer: CandidateFeaturizer,
        vocab: &'v Vocab,
        config: &RerankConfig,
    ) -> Self {
        Self {
            initial,
            featurizer,
            vocab,
            top_n: config.top_n,
            trainer: PerceptronTrainer::new(
                config.epochs,
                config.learning_rate,
                config.shuffle_seed,
            ),
            mapper: FeatureMapper::new(),
            scorer: None,
        }
    }

    /// Whether [`train`](Self::train) has produced a model.
    pub fn is_trained(&self) -> bool {
        self.scorer.is_some()
    }

    /// Number of distinct feature names seen in training.
    pub fn num_features(&self) -> usize {
        self.mapper.len()
    }

    /// Trains the rescoring model from documents with known cells.
    ///
    /// Documents without a coordinate, with an empty distribution, or
    /// whose cell the grid never recorded are skipped. New feature names
    /// are interned here; inference later drops names unseen in training.
    pub fn train<'a, T: Tiling>(
        &mut self,
        grid: &Grid<T>,
        docs: impl IntoIterator<Item = &'a GeoDoc<T::Coord>>,
    ) -> Result<()>
    where
        R: Ranker<T::Coord>,
    {
        let mut sets: Vec<Vec<(FeatureVector, bool)>> = Vec::new();
        for doc in docs {
            let coord = match doc.coord() {
                Some(c) => c,
                None => continue,
            };
            if doc.lm().is_empty() {
                continue;
            }
            let correct = match grid.find_best_cell_for_coord(coord, false) {
                Some(cell) => cell,
                None => {
                    debug!(
                        "skipping '{}' in reranker training: cell never recorded",
                        doc.title()
                    );
                    continue;
                }
            };
            let ranked = self.initial.return_ranked_cells(doc, Some(&correct), true);
            let correct_entry = match ranked
                .iter()
                .find(|&&(cell, _)| std::ptr::eq(cell, &*correct))
            {
                Some(&entry) => entry,
                None => panic!(
                    "initial ranker dropped the forced correct cell for '{}'",
                    doc.title()
                ),
            };
            let mut candidates: Vec<CellScore<'_, T::Coord>> =
                ranked.into_iter().take(self.top_n).collect();
            if !candidates
                .iter()
                .any(|&(cell, _)| std::ptr::eq(cell, correct_entry.0))
            {
                candidates.push(correct_entry);
            }
            let mut set = Vec::with_capacity(candidates.len());
            for &(cell, score) in &candidates {
                let mut fv = FeatureVector::new();
                {
                    let mapper = &mut self.mapper;
                    let mut add =
                        |name: String, value: f64| fv.push(mapper.intern(&name), value);
                    self.featurizer.emit(doc, cell, score, self.vocab, &mut add);
                }
                set.push((fv, std::ptr::eq(cell, correct_entry.0)));
            }
            sets.push(set);
        }
        if sets.is_empty() {
            return Err(GridLocateError::Training(
                "no usable documents for reranker training".to_string(),
            ));
        }
        info!(
            "training reranker on {} candidate sets, {} features",
            sets.len(),
            self.mapper.len()
        );
        self.scorer = Some(self.trainer.train_ranking(&sets));
        Ok(())
    }
}

impl<'v, C: Coord, R: Ranker<C>> Ranker<C> for Reranker<'v, R> {
    fn initialize(&mut self, test_docs: &[&GeoDoc<C>]) -> Result<()> {
        self.initial.initialize(test_docs)
    }

    fn return_ranked_cells<'a>(
        &'a self,
        doc: &GeoDoc<C>,
        correct: Option<&'a GridCell<C>>,
        include_correct: bool,
    ) -> Vec<CellScore<'a, C>> {
        let scorer = match &self.scorer {
            Some(scorer) => scorer,
            None => panic!("return_ranked_cells() before train() on the reranker"),
        };
        let ranked = self.initial.return_ranked_cells(doc, correct, include_correct);
        if ranked.len() <= 1 {
            return ranked;
        }
        let n = self.top_n.min(ranked.len());
        let mut head: Vec<CellScore<'a, C>> = ranked[..n]
            .iter()
            .map(|&(cell, score)| {
                let mut fv = FeatureVector::new();
                {
                    let mapper = &self.mapper;
                    let mut add = |name: String, value: f64| {
                        if let Some(id) = mapper.id(&name) {
                            fv.push(id, value);
                        }
                    };
                    self.featurizer.emit(doc, cell, score, self.vocab, &mut add);
                }
                (cell, scorer.score(&fv))
            })
            .collect();
        head.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        head.extend_from_slice(&ranked[n..]);
        head
    }
}
