//! Beam search over a pyramid of successively finer grids.

use crate::classify::{FeatureVector, PerceptronTrainer};
use crate::config::RankerConfig;
use crate::coord::SphereCoord;
use crate::doc::GeoDoc;
use crate::error::{GridLocateError, Result};
use crate::grid::{CellKey, Grid, GridCell, SphereTiling, Tiling};
use crate::ranker::classifier::{doc_features, CellClassifier};
use crate::ranker::{CellScore, Ranker};
use log::debug;
use std::collections::{HashMap, HashSet};

/// Log-probabilities of a candidate set under a max-shifted softmax.
///
/// Falls back to uniform when every raw score is negative infinity, so a
/// degenerate candidate set still chains multiplicatively.
fn log_softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return vec![-(scores.len() as f64).ln(); scores.len()];
    }
    let lse = max + scores.iter().map(|s| (s - max).exp()).sum::<f64>().ln();
    scores.iter().map(|s| s - lse).collect()
}

/// One level's complete ranking during a hierarchical descent.
#[derive(Debug, Clone)]
pub struct LevelTrace {
    /// Pyramid level, 0 for the coarsest grid.
    pub level: usize,
    /// The beam entry whose children were ranked. `None` for the level-0
    /// ranking over the whole coarse grid.
    pub parent: Option<CellKey>,
    /// Every candidate with its log-probability, best first. Entries at
    /// levels past 0 are conditional on their parent.
    pub ranking: Vec<(CellKey, f64)>,
}

/// Coarse-to-fine classifier ranker.
///
/// Level 0 classifies over every non-empty cell of the coarsest grid and
/// keeps a beam of the most probable ones. Each following level descends
/// through a per-parent classifier over that parent's subdivided children,
/// keeping the single best populated child per beam entry and chaining the
/// per-level log-probabilities additively. Scores coming out are therefore
/// joint log-probabilities of the root-to-leaf path.
pub struct HierarchicalRanker<'g> {
    grids: &'g [Grid<SphereTiling>],
    factors: Vec<u32>,
    level0: CellClassifier,
    children: Vec<HashMap<CellKey, CellClassifier>>,
    beam_size: usize,
    debug_titles: HashSet<String>,
}

impl<'g> HierarchicalRanker<'g> {
    /// Trains classifiers for every level of `grids`, coarsest first.
    ///
    /// Adjacent grids must differ by an integer subdivision factor of at
    /// least 2; each parent cell with training documents gets its own
    /// child classifier labeled over all of its subdivided keys.
    /// `config.beam_size` entries survive each level of the descent.
    pub fn train<'a>(
        grids: &'g [Grid<SphereTiling>],
        docs: impl IntoIterator<Item = &'a GeoDoc<SphereCoord>>,
        trainer: &PerceptronTrainer,
        config: &RankerConfig,
    ) -> Result<Self> {
        if grids.is_empty() {
            return Err(GridLocateError::Config(
                "hierarchical ranker needs at least one grid level".to_string(),
            ));
        }
        if config.beam_size == 0 {
            return Err(GridLocateError::Config(
                "hierarchical beam size must be at least 1".to_string(),
            ));
        }
        let mut factors = Vec::with_capacity(grids.len().saturating_sub(1));
        for pair in grids.windows(2) {
            let coarse = pair[0].tiling().width();
            let fine = pair[1].tiling().width();
            let factor = (coarse / fine).round();
            if factor < 2.0 || (fine * factor - coarse).abs() > coarse * 1e-9 {
                return Err(GridLocateError::Config(format!(
                    "grid widths {coarse} and {fine} are not an integer subdivision"
                )));
            }
            factors.push(factor as u32);
        }

        let docs: Vec<&GeoDoc<SphereCoord>> = docs.into_iter().collect();
        let level0 = CellClassifier::train(&grids[0], docs.iter().copied(), trainer)?;

        let mut children = Vec::with_capacity(factors.len());
        for (k, &factor) in factors.iter().enumerate() {
            let coarse = &grids[k];
            let fine = &grids[k + 1];
            let mut grouped: HashMap<CellKey, Vec<&GeoDoc<SphereCoord>>> = HashMap::new();
            for &doc in &docs {
                let key = match doc.coord().and_then(|c| coarse.tiling().key_for_coord(c)) {
                    Some(key) => key,
                    None => continue,
                };
                if coarse.cell_at(key).is_some() {
                    grouped.entry(key).or_default().push(doc);
                }
            }
            let mut per_parent = HashMap::with_capacity(grouped.len());
            for (parent, group) in grouped {
                let labels = coarse.tiling().children_of(parent, factor);
                match CellClassifier::train_with_labels(
                    fine.tiling(),
                    labels,
                    group.iter().copied(),
                    trainer,
                ) {
                    Ok(clf) => {
                        per_parent.insert(parent, clf);
                    }
                    Err(GridLocateError::Training(reason)) => {
                        debug!("no child classifier for parent {parent} at level {k}: {reason}");
                    }
                    Err(e) => return Err(e),
                }
            }
            debug!(
                "hierarchy level {}: {} child classifiers over factor-{} subdivision",
                k + 1,
                per_parent.len(),
                factor
            );
            children.push(per_parent);
        }

        Ok(Self {
            grids,
            factors,
            level0,
            children,
            beam_size: config.beam_size,
            debug_titles: HashSet::new(),
        })
    }

    /// Dumps the complete ranking at every descent level, at debug level,
    /// for the named documents.
    pub fn with_debug_titles(mut self, titles: impl IntoIterator<Item = String>) -> Self {
        self.debug_titles = titles.into_iter().collect();
        self
    }

    fn finest(&self) -> &'g Grid<SphereTiling> {
        &self.grids[self.grids.len() - 1]
    }

    /// The full level-0 ranking: every non-empty coarse cell with its
    /// log-probability, best first.
    fn level0_ranking(&self, fv: &FeatureVector) -> Vec<(CellKey, f64)> {
        let keys: Vec<CellKey> = self.grids[0]
            .iter_nonempty_cells()
            .map(|cell| cell.key())
            .collect();
        let raw: Vec<f64> = keys
            .iter()
            .map(|&key| self.level0.score_key(fv, key).unwrap_or(f64::NEG_INFINITY))
            .collect();
        let lps = log_softmax(&raw);
        let mut ranking: Vec<(CellKey, f64)> = keys.into_iter().zip(lps).collect();
        ranking.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        ranking
    }

    /// The conditional ranking over `parent`'s populated children at level
    /// `k`, best first. Empty when no child cell holds training documents.
    fn child_ranking(
        &self,
        k: usize,
        parent: CellKey,
        clf: &CellClassifier,
        fv: &FeatureVector,
    ) -> Vec<(CellKey, f64)> {
        let child_keys: Vec<CellKey> = self.grids[k - 1]
            .tiling()
            .children_of(parent, self.factors[k - 1])
            .into_iter()
            .filter(|&ck| self.grids[k].cell_at(ck).is_some())
            .collect();
        if child_keys.is_empty() {
            return Vec::new();
        }
        let raw: Vec<f64> = child_keys
            .iter()
            .map(|&ck| clf.score_key(fv, ck).unwrap_or(f64::NEG_INFINITY))
            .collect();
        let lps = log_softmax(&raw);
        let mut ranking: Vec<(CellKey, f64)> = child_keys.into_iter().zip(lps).collect();
        ranking.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        ranking
    }

    /// Runs the beam descent, optionally recording the complete ranking
    /// produced at every level before any beam cutoff.
    fn descend(
        &self,
        title: &str,
        fv: &FeatureVector,
        mut levels: Option<&mut Vec<LevelTrace>>,
    ) -> Vec<(CellKey, f64)> {
        let full = self.level0_ranking(fv);
        if let Some(levels) = levels.as_deref_mut() {
            levels.push(LevelTrace {
                level: 0,
                parent: None,
                ranking: full.clone(),
            });
        }
        let mut beam = full;
        beam.truncate(self.beam_size);

        for k in 1..self.grids.len() {
            let mut next = Vec::with_capacity(beam.len());
            for &(parent, acc) in &beam {
                let clf = match self.children[k - 1].get(&parent) {
                    Some(clf) => clf,
                    None => {
                        debug!(
                            "'{title}' dropping beam entry {parent}: untrained parent at level {k}"
                        );
                        continue;
                    }
                };
                let kids = self.child_ranking(k, parent, clf, fv);
                if kids.is_empty() {
                    debug!(
                        "'{title}' dropping beam entry {parent}: no populated children at level {k}"
                    );
                    continue;
                }
                let (best, lp) = kids[0];
                if let Some(levels) = levels.as_deref_mut() {
                    levels.push(LevelTrace {
                        level: k,
                        parent: Some(parent),
                        ranking: kids,
                    });
                }
                next.push((best, acc + lp));
            }
            beam = next;
        }
        beam
    }

    /// The complete per-level rankings for `doc`: the level-0 ranking over
    /// every non-empty coarse cell, past the beam cutoff, then each
    /// surviving beam entry's full child ranking at every finer level.
    pub fn trace_document(&self, doc: &GeoDoc<SphereCoord>) -> Vec<LevelTrace> {
        let fv = doc_features(doc);
        let mut levels = Vec::new();
        self.descend(doc.title(), &fv, Some(&mut levels));
        levels
    }
}

impl<'g> Ranker<SphereCoord> for HierarchicalRanker<'g> {
    fn return_ranked_cells<'a>(
        &'a self,
        doc: &GeoDoc<SphereCoord>,
        correct: Option<&'a GridCell<SphereCoord>>,
        include_correct: bool,
    ) -> Vec<CellScore<'a, SphereCoord>> {
        let fv = doc_features(doc);
        let beam = if self.debug_titles.contains(doc.title()) {
            let mut levels = Vec::new();
            let beam = self.descend(doc.title(), &fv, Some(&mut levels));
            for trace in &levels {
                for (rank, &(key, lp)) in trace.ranking.iter().enumerate() {
                    match trace.parent {
                        None => debug!(
                            "'{}' level 0 rank {}: {key} {lp:.4}",
                            doc.title(),
                            rank + 1
                        ),
                        Some(parent) => debug!(
                            "'{}' level {} under {parent} rank {}: {key} {lp:.4}",
                            doc.title(),
                            trace.level,
                            rank + 1
                        ),
                    }
                }
            }
            beam
        } else {
            self.descend(doc.title(), &fv, None)
        };

        let finest = self.finest();
        let mut ranked: Vec<CellScore<'a, SphereCoord>> = beam
            .iter()
            .map(|&(key, score)| {
                let cell = match finest.cell_at(key) {
                    Some(cell) => cell,
                    None => panic!("beam survivor {key} has no recorded cell in the finest grid"),
                };
                (cell, score)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

        if include_correct {
            if let Some(correct) = correct {
                let present = ranked.iter().any(|&(cell, _)| std::ptr::eq(cell, correct));
                if !present {
                    ranked.push((correct, f64::NEG_INFINITY));
                }
            }
        }
        ranked
    }
}
