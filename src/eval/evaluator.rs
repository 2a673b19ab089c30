//! The per-document evaluation driver.

use crate::config::EvalConfig;
use crate::coord::Coord;
use crate::doc::{GeoDoc, SKIP_EMPTY_LM, SKIP_NO_COORD};
use crate::error::Result;
use crate::eval::grouped::GroupedEvalStats;
use crate::grid::{Grid, Tiling, SKIP_OUT_OF_RANGE};
use crate::ranker::Ranker;
use log::{debug, info};
use serde::Serialize;

/// Sentinel rank for a correct cell absent from the ranker's output.
///
/// Large enough that no real ranking reaches it, so downstream statistics
/// never mistake a miss for a deep-but-real rank.
pub const NOT_FOUND_RANK: usize = 1_000_000_000;

/// Everything measured about one evaluated document.
#[derive(Debug, Clone, Serialize)]
pub struct DocEvalResult<C: Coord> {
    /// Document title.
    pub title: String,
    /// 1-based rank of the true cell, or [`NOT_FOUND_RANK`].
    pub rank: usize,
    /// Description of the top-predicted cell.
    pub pred_cell: String,
    /// Central point of the top-predicted cell.
    pub pred_coord: C,
    /// Physical distance from the document to the predicted center.
    pub error_dist: f64,
    /// Coordinate-space distance from the document to the predicted center.
    pub degree_error: f64,
    /// Physical distance from the document to the true cell's center, the
    /// best any ranking could achieve.
    pub oracle_dist: f64,
    /// Coordinate-space distance from the document to the true cell's
    /// center.
    pub oracle_degree_error: f64,
    /// Oracle coordinate distance in cell widths, for bucketing.
    pub true_center_offset: f64,
    /// Predicted coordinate distance in cell widths, for bucketing.
    pub pred_center_offset: f64,
    /// Training documents recorded in the true cell.
    pub num_docs_in_true_cell: usize,
}

/// The outcome of offering one document to the evaluator.
#[derive(Debug)]
pub enum DocOutcome<C: Coord> {
    /// The document was ranked and measured.
    Evaluated(DocEvalResult<C>),
    /// The document contributed nothing, for the named counter.
    Skipped(&'static str),
}

/// Drives a ranker over test documents and accumulates statistics.
pub struct DocEvaluator<'g, T: Tiling, R> {
    grid: &'g Grid<T>,
    ranker: R,
    config: EvalConfig,
}

impl<'g, T: Tiling, R: Ranker<T::Coord>> DocEvaluator<'g, T, R> {
    /// Creates an evaluator ranking against `grid`.
    pub fn new(grid: &'g Grid<T>, ranker: R, config: EvalConfig) -> Self {
        Self {
            grid,
            ranker,
            config,
        }
    }

    /// Evaluates one document.
    ///
    /// Documents with no coordinate, an empty distribution, or an
    /// unaddressable coordinate are skipped under the matching counter
    /// name. The true cell is forced into the ranking so the rank is
    /// normally defined; a ranker that still omits it yields
    /// [`NOT_FOUND_RANK`].
    pub fn evaluate_document(&self, doc: &GeoDoc<T::Coord>) -> DocOutcome<T::Coord> {
        let coord = match doc.coord() {
            Some(c) => c,
            None => return DocOutcome::Skipped(SKIP_NO_COORD),
        };
        if doc.lm().is_empty() {
            return DocOutcome::Skipped(SKIP_EMPTY_LM);
        }
        let correct = match self.grid.find_best_cell_for_coord(coord, true) {
            Some(cell) => cell,
            None => return DocOutcome::Skipped(SKIP_OUT_OF_RANGE),
        };
        let ranked = self.ranker.return_ranked_cells(doc, Some(&correct), true);
        assert!(
            !ranked.is_empty(),
            "ranker returned no candidates for '{}'",
            doc.title()
        );
        let rank = ranked
            .iter()
            .position(|&(cell, _)| std::ptr::eq(cell, &*correct))
            .map(|i| i + 1)
            .unwrap_or(NOT_FOUND_RANK);
        let pred = ranked[0].0;
        let pred_center = self.grid.central_point(pred);
        let true_center = self.grid.central_point(&correct);
        let width = self.grid.tiling().cell_width();
        DocOutcome::Evaluated(DocEvalResult {
            title: doc.title().to_string(),
            rank,
            pred_cell: pred.describe(),
            pred_coord: pred_center,
            error_dist: coord.distance(&pred_center),
            degree_error: coord.coord_distance(&pred_center),
            oracle_dist: coord.distance(&true_center),
            oracle_degree_error: coord.coord_distance(&true_center),
            true_center_offset: coord.coord_distance(&true_center) / width,
            pred_center_offset: coord.coord_distance(&pred_center) / width,
            num_docs_in_true_cell: correct.num_docs(),
        })
    }

    /// Evaluates one document straight into `stats`. Returns whether it
    /// was evaluated rather than skipped.
    pub fn evaluate_and_record(
        &self,
        doc: &GeoDoc<T::Coord>,
        stats: &mut GroupedEvalStats,
    ) -> bool {
        match self.evaluate_document(doc) {
            DocOutcome::Evaluated(result) => {
                stats.record(&result);
                true
            }
            DocOutcome::Skipped(reason) => {
                debug!("'{}' skipped: {reason}", doc.title());
                stats.record_skip(reason);
                false
            }
        }
    }

    /// Initializes the ranker over the full test set, then evaluates every
    /// document.
    pub fn evaluate_all(&mut self, docs: &[&GeoDoc<T::Coord>]) -> Result<GroupedEvalStats> {
        info!("evaluating {} documents", docs.len());
        self.ranker.initialize(docs)?;
        let mut stats = GroupedEvalStats::for_coord::<T::Coord>(&self.config);
        let mut evaluated = 0usize;
        for &doc in docs {
            if self.evaluate_and_record(doc, &mut stats) {
                evaluated += 1;
                if self.config.log_every > 0 && evaluated % self.config.log_every == 0 {
                    info!(
                        "evaluated {evaluated} documents, mean error {:.1} {}",
                        stats.aggregate().mean_error_dist(),
                        T::Coord::UNITS
                    );
                }
            }
        }
        info!(
            "evaluation complete: {evaluated} evaluated, {} skipped",
            docs.len() - evaluated
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LmConfig;
    use crate::coord::SphereCoord;
    use crate::doc::{Corpus, DocSplit, RawDoc};
    use crate::grid::SphereTiling;
    use crate::ranker::testutil::{paris_fixture, test_doc};
    use crate::ranker::{CellScore, GridRanker, RankerKind};

    fn kl_evaluator<'g>(
        grid: &'g crate::grid::Grid<SphereTiling>,
    ) -> DocEvaluator<'g, SphereTiling, GridRanker<'g, SphereTiling>> {
        let ranker =
            GridRanker::from_kind(grid, RankerKind::KlDiv, &Default::default()).unwrap();
        DocEvaluator::new(grid, ranker, EvalConfig::default())
    }

    #[test]
    fn test_matching_document_ranks_first() {
        let (corpus, grid) = paris_fixture();
        let evaluator = kl_evaluator(&grid);
        let result = match evaluator.evaluate_document(test_doc(&corpus)) {
            DocOutcome::Evaluated(result) => result,
            other => panic!("expected evaluation, got {other:?}"),
        };
        assert_eq!(result.rank, 1);
        assert_eq!(result.num_docs_in_true_cell, 2);
        // Prediction and truth coincide, so the oracle bound is met.
        assert_eq!(result.error_dist, result.oracle_dist);
        assert!(result.true_center_offset < 0.25);
        assert!(result.error_dist > 0.0);
    }

    #[test]
    fn test_documents_without_usable_data_are_skipped() {
        let mut other = Corpus::new(LmConfig::default());
        other.add(RawDoc {
            title: "nowhere".to_string(),
            coord: None,
            salience: 0.0,
            split: DocSplit::Test,
            word_counts: vec![("paris".to_string(), 1.0)],
        });
        other.add(RawDoc {
            title: "wordless".to_string(),
            coord: Some(SphereCoord::new(0.0, 0.0).unwrap()),
            salience: 0.0,
            split: DocSplit::Test,
            word_counts: vec![],
        });
        other.finish();

        let (_corpus, grid) = paris_fixture();
        let evaluator = kl_evaluator(&grid);
        let outcomes: Vec<_> = other
            .docs()
            .iter()
            .map(|doc| evaluator.evaluate_document(doc))
            .collect();
        assert!(matches!(outcomes[0], DocOutcome::Skipped(SKIP_NO_COORD)));
        assert!(matches!(outcomes[1], DocOutcome::Skipped(SKIP_EMPTY_LM)));
    }

    #[test]
    fn test_missing_correct_cell_gets_sentinel_rank() {
        struct TopOnly<'g>(&'g crate::grid::Grid<SphereTiling>);
        impl<'g> Ranker<SphereCoord> for TopOnly<'g> {
            fn return_ranked_cells<'a>(
                &'a self,
                _doc: &GeoDoc<SphereCoord>,
                _correct: Option<&'a crate::grid::GridCell<SphereCoord>>,
                _include_correct: bool,
            ) -> Vec<CellScore<'a, SphereCoord>> {
                vec![(self.0.iter_nonempty_cells().next().unwrap(), 1.0)]
            }
        }

        let (corpus, grid) = paris_fixture();
        let evaluator = DocEvaluator::new(&grid, TopOnly(&grid), EvalConfig::default());
        // The london training document's true cell is not the one the
        // broken ranker returns.
        let london = corpus
            .docs()
            .iter()
            .find(|d| d.title() == "london")
            .unwrap();
        let result = match evaluator.evaluate_document(london) {
            DocOutcome::Evaluated(result) => result,
            other => panic!("expected evaluation, got {other:?}"),
        };
        assert_eq!(result.rank, NOT_FOUND_RANK);
        assert!(result.error_dist > result.oracle_dist);
    }

    #[test]
    fn test_evaluate_all_aggregates_and_counts_skips() {
        let mut other = Corpus::new(LmConfig::default());
        other.add(RawDoc {
            title: "nowhere".to_string(),
            coord: None,
            salience: 0.0,
            split: DocSplit::Test,
            word_counts: vec![("paris".to_string(), 1.0)],
        });
        other.finish();

        let (corpus, grid) = paris_fixture();
        let mut evaluator = kl_evaluator(&grid);
        let mut docs: Vec<&GeoDoc<SphereCoord>> = vec![test_doc(&corpus)];
        docs.extend(other.docs().iter());
        let stats = evaluator.evaluate_all(&docs).unwrap();
        assert_eq!(stats.aggregate().total(), 1);
        assert_eq!(stats.aggregate().num_correct(), 1);
        assert_eq!(stats.aggregate().other_stat(SKIP_NO_COORD), 1);
        // A lone rank-1 result earns the full credit of the cutoff.
        assert_eq!(stats.aggregate().partial_credit(), 10);
    }
}
