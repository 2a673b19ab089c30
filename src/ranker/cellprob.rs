//! Kernel-smoothed average cell probability.

use crate::config::RankerConfig;
use crate::coord::Coord;
use crate::doc::GeoDoc;
use crate::grid::{CellKey, Grid, GridCell, Tiling};
use crate::lm::WordId;
use std::collections::HashMap;

/// Scores cells by the average, over the document's words, of a per-word
/// cell probability.
///
/// Instead of crediting each training document's words to its own cell
/// alone, every document spreads a Gaussian kernel of mass over all cells
/// by distance to their central points. The per-word tables are then
/// normalized to probabilities. A document with an empty distribution
/// scores 0 everywhere; the driver's stable sort keeps the candidate order,
/// so the output stays deterministic per run without reflecting any ranking
/// quality.
#[derive(Debug, Clone)]
pub struct AvgCellProb {
    word_cell_probs: HashMap<WordId, HashMap<CellKey, f64>>,
}

impl AvgCellProb {
    /// Builds the per-word tables from training documents.
    ///
    /// `config.kernel_bandwidth` is the kernel width in physical distance
    /// units (km on the sphere). Documents without a coordinate are
    /// ignored here; the grid's own population pass already counts them.
    pub fn from_training_docs<'a, T: Tiling>(
        grid: &Grid<T>,
        docs: impl IntoIterator<Item = &'a GeoDoc<T::Coord>>,
        config: &RankerConfig,
    ) -> Self {
        let bandwidth = config.kernel_bandwidth;
        let mut mass: HashMap<WordId, HashMap<CellKey, f64>> = HashMap::new();
        for doc in docs {
            let coord = match doc.coord() {
                Some(c) => c,
                None => continue,
            };
            let mut weights: Vec<(CellKey, f64)> = grid
                .iter_nonempty_cells()
                .map(|cell| {
                    let dist = coord.distance(&grid.central_point(cell));
                    let scaled = dist / bandwidth;
                    (cell.key(), (-0.5 * scaled * scaled).exp())
                })
                .collect();
            let total: f64 = weights.iter().map(|(_, w)| w).sum();
            if total == 0.0 {
                // Kernel underflowed everywhere; fall back to the owning cell.
                match grid.tiling().key_for_coord(coord) {
                    Some(key) => weights = vec![(key, 1.0)],
                    None => continue,
                }
            } else {
                for entry in &mut weights {
                    entry.1 /= total;
                }
            }
            for (word, count) in doc.lm().iter_counts() {
                let per_cell = mass.entry(word).or_default();
                for &(key, w) in &weights {
                    *per_cell.entry(key).or_insert(0.0) += count * w;
                }
            }
        }
        for per_cell in mass.values_mut() {
            let total: f64 = per_cell.values().sum();
            if total > 0.0 {
                for v in per_cell.values_mut() {
                    *v /= total;
                }
            }
        }
        Self {
            word_cell_probs: mass,
        }
    }

    pub(crate) fn score_cell<C: Coord>(&self, doc: &GeoDoc<C>, cell: &GridCell<C>) -> f64 {
        let total = doc.lm().total_tokens();
        if total == 0.0 {
            return 0.0;
        }
        let sum: f64 = doc
            .lm()
            .iter_counts()
            .map(|(word, count)| {
                let p = self
                    .word_cell_probs
                    .get(&word)
                    .and_then(|per_cell| per_cell.get(&cell.key()))
                    .copied()
                    .unwrap_or(0.0);
                count * p
            })
            .sum();
        sum / total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RankerConfig;
    use crate::doc::DocSplit;
    use crate::ranker::testutil::{paris_fixture, test_doc};
    use crate::ranker::{GridRanker, Ranker, ScoreStrategy};

    #[test]
    fn test_word_probabilities_normalized() {
        let (corpus, grid) = paris_fixture();
        let strategy = AvgCellProb::from_training_docs(
            &grid,
            corpus.docs_in_split(DocSplit::Training),
            &RankerConfig::default(),
        );
        for per_cell in strategy.word_cell_probs.values() {
            let total: f64 = per_cell.values().sum();
            assert!((total - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_bandwidth_controls_mass_spread() {
        let (corpus, grid) = paris_fixture();
        let london_prob = |bandwidth: f64| {
            let config = RankerConfig {
                kernel_bandwidth: bandwidth,
                ..Default::default()
            };
            let strategy = AvgCellProb::from_training_docs(
                &grid,
                corpus.docs_in_split(DocSplit::Training),
                &config,
            );
            let london_id = corpus.factory().word_id("london").unwrap();
            let london_key = grid
                .iter_nonempty_cells()
                .find(|c| c.lm().count(london_id) > 0.0)
                .unwrap()
                .key();
            strategy.word_cell_probs[&london_id][&london_key]
        };
        // A narrow kernel keeps london's mass at home; a very wide one
        // spreads it almost uniformly over both cells.
        assert!(london_prob(1.0) > 0.99);
        assert!((london_prob(1.0e9) - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_ranks_nearby_cell_first() {
        let (corpus, grid) = paris_fixture();
        let strategy = AvgCellProb::from_training_docs(
            &grid,
            corpus.docs_in_split(DocSplit::Training),
            &RankerConfig::default(),
        );
        let ranker = GridRanker::new(&grid, ScoreStrategy::AvgCellProb(strategy), false);
        let ranked = ranker.return_ranked_cells(test_doc(&corpus), None, false);
        let paris_id = corpus.factory().word_id("paris").unwrap();
        assert!(ranked[0].0.lm().count(paris_id) > 0.0);
        assert!(ranked[0].1 > ranked[1].1);
    }

    #[test]
    fn test_empty_document_keeps_candidate_order() {
        use crate::config::LmConfig;
        use crate::coord::SphereCoord;
        use crate::doc::{Corpus, RawDoc};

        let (corpus, grid) = paris_fixture();
        let strategy = AvgCellProb::from_training_docs(
            &grid,
            corpus.docs_in_split(DocSplit::Training),
            &RankerConfig::default(),
        );
        // A separate corpus supplies a wordless document.
        let mut other = Corpus::new(LmConfig::default());
        other.add(RawDoc {
            title: "blank".to_string(),
            coord: Some(SphereCoord::new(0.0, 0.0).unwrap()),
            salience: 0.0,
            split: DocSplit::Test,
            word_counts: vec![],
        });
        other.finish();
        let blank = &other.docs()[0];

        let ranker = GridRanker::new(&grid, ScoreStrategy::AvgCellProb(strategy), false);
        let ranked = ranker.return_ranked_cells(blank, None, false);
        let order: Vec<_> = grid.iter_nonempty_cells().collect();
        assert_eq!(ranked.len(), order.len());
        for ((got, score), want) in ranked.iter().zip(order) {
            assert!(std::ptr::eq(*got, want));
            assert_eq!(*score, 0.0);
        }
    }
}
