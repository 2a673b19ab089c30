//! Distribution-comparison strategies: KL divergence, cosine similarity,
//! and summed word frequency.

use crate::coord::Coord;
use crate::doc::GeoDoc;
use crate::grid::GridCell;

/// Upper tolerance on cosine similarity before it counts as a programming
/// error. Round-off can push the value slightly past 1.
const COSINE_UPPER_BOUND: f64 = 1.002;

/// Scores a cell by the negated KL divergence from the document's
/// distribution to the cell's, so closer distributions rank higher.
///
/// In partial mode the divergence sum runs over the document's words only.
/// That is an approximation, not a true divergence, but it is what makes
/// large vocabularies tractable. Symmetric mode averages both directions.
#[derive(Debug, Clone)]
pub struct KlDivergence {
    partial: bool,
    symmetric: bool,
}

impl KlDivergence {
    /// Creates the strategy.
    pub fn new(partial: bool, symmetric: bool) -> Self {
        Self { partial, symmetric }
    }

    pub(crate) fn score_cell<C: Coord>(&self, doc: &GeoDoc<C>, cell: &GridCell<C>) -> f64 {
        let mut kl = doc.lm().kl_divergence(cell.lm(), self.partial);
        if self.symmetric {
            kl = 0.5 * (kl + cell.lm().kl_divergence(doc.lm(), self.partial));
        }
        -kl
    }
}

/// Scores a cell by cosine similarity between the distributions.
///
/// The result must land in [0, 1] up to round-off; anything outside that
/// means a broken distribution and aborts with the offending cell named.
#[derive(Debug, Clone)]
pub struct Cosine {
    partial: bool,
    smoothed: bool,
}

impl Cosine {
    /// Creates the strategy.
    pub fn new(partial: bool, smoothed: bool) -> Self {
        Self { partial, smoothed }
    }

    pub(crate) fn score_cell<C: Coord>(&self, doc: &GeoDoc<C>, cell: &GridCell<C>) -> f64 {
        let sim = doc
            .lm()
            .cosine_similarity(cell.lm(), self.partial, self.smoothed);
        assert!(
            (0.0..=COSINE_UPPER_BOUND).contains(&sim),
            "cosine similarity {sim} out of range for document '{}' against {}",
            doc.title(),
            cell
        );
        sim
    }
}

/// Scores a cell by summing, over the document's words, the word's raw
/// count times its unsmoothed cell probability. A bag-overlap heuristic,
/// mostly useful with TF-IDF-style weighting applied upstream.
#[derive(Debug, Clone)]
pub struct SumFrequency;

impl SumFrequency {
    pub(crate) fn score_cell<C: Coord>(&self, doc: &GeoDoc<C>, cell: &GridCell<C>) -> f64 {
        doc.lm().sum_frequency(cell.lm())
    }
}
