//! Per-cell aggregate state.

use crate::config::CenterMethod;
use crate::coord::Coord;
use crate::doc::GeoDoc;
use crate::grid::CellKey;
use crate::lm::{GlobalDist, Unigram};
use std::fmt;
use std::sync::Arc;

/// One region of the partitioned coordinate space.
///
/// A recorded cell aggregates the training documents whose coordinate maps
/// into its region: a combined word distribution, document and salience
/// totals, a running centroid, and the most salient document's title for
/// display. Cells are populated through [`add_document`](Self::add_document)
/// and frozen by `finish`; mutating a finished cell or finishing twice is a
/// fatal contract violation.
///
/// Transient cells stand in for coordinates the grid has no recorded cell
/// for. They are never part of the grid's cell set and carry an empty
/// finished distribution, existing only so distance and centroid arithmetic
/// has an object to work against.
#[derive(Debug, Clone)]
pub struct GridCell<C: Coord> {
    key: CellKey,
    bounds: String,
    true_center: C,
    lm: Unigram,
    num_docs: usize,
    salience: f64,
    centroid_sum: Option<C>,
    most_popular: Option<(String, f64)>,
    recorded: bool,
    finished: bool,
}

impl<C: Coord> GridCell<C> {
    pub(crate) fn new_recorded(key: CellKey, bounds: String, true_center: C) -> Self {
        Self {
            key,
            bounds,
            true_center,
            lm: Unigram::new(),
            num_docs: 0,
            salience: 0.0,
            centroid_sum: None,
            most_popular: None,
            recorded: true,
            finished: false,
        }
    }

    pub(crate) fn new_transient(key: CellKey, bounds: String, true_center: C, lm: Unigram) -> Self {
        assert!(lm.is_finished(), "transient cell built with an unfinished model");
        Self {
            key,
            bounds,
            true_center,
            lm,
            num_docs: 0,
            salience: 0.0,
            centroid_sum: None,
            most_popular: None,
            recorded: false,
            finished: true,
        }
    }

    /// Folds one training document into the cell.
    pub(crate) fn add_document(&mut self, doc: &GeoDoc<C>) {
        assert!(
            !self.finished,
            "add_document() on finished cell {}",
            self.key
        );
        let coord = match doc.coord() {
            Some(c) => c,
            None => panic!(
                "document '{}' without coordinate added to cell {}",
                doc.title(),
                self.key
            ),
        };
        self.num_docs += 1;
        self.salience += doc.salience();
        self.centroid_sum = Some(match self.centroid_sum {
            Some(sum) => sum.component_sum(&coord),
            None => coord,
        });
        self.lm.add_unigram(doc.lm(), 1.0);
        let more_popular = match &self.most_popular {
            Some((_, best)) => doc.salience() > *best,
            None => true,
        };
        if more_popular {
            self.most_popular = Some((doc.title().to_string(), doc.salience()));
        }
    }

    /// Freezes the cell's distribution, attaching the global backoff.
    pub(crate) fn finish(&mut self, global: &Arc<GlobalDist>, interp: f64) {
        assert!(!self.finished, "finish() called twice on cell {}", self.key);
        self.lm.finish_before_global();
        self.lm.finish_after_global(global.clone(), interp);
        self.finished = true;
    }

    /// The cell's address within its tiling.
    #[inline]
    pub fn key(&self) -> CellKey {
        self.key
    }

    /// The geometry-derived center of the cell's region.
    #[inline]
    pub fn true_center(&self) -> C {
        self.true_center
    }

    /// The cell's combined word distribution.
    #[inline]
    pub fn lm(&self) -> &Unigram {
        &self.lm
    }

    /// Number of training documents folded in.
    #[inline]
    pub fn num_docs(&self) -> usize {
        self.num_docs
    }

    /// Summed salience of the cell's documents.
    #[inline]
    pub fn salience(&self) -> f64 {
        self.salience
    }

    /// Whether no documents have been folded in.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_docs == 0
    }

    /// Whether the cell belongs to a grid (false for transient cells).
    #[inline]
    pub fn is_recorded(&self) -> bool {
        self.recorded
    }

    /// Whether the cell has been frozen.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Title and salience of the most salient document, when any.
    pub fn most_popular(&self) -> Option<(&str, f64)> {
        self.most_popular.as_ref().map(|(t, s)| (t.as_str(), *s))
    }

    /// Mean coordinate of the cell's documents, when any.
    pub fn centroid(&self) -> Option<C> {
        self.centroid_sum
            .map(|sum| sum.component_scale(1.0 / self.num_docs as f64))
    }

    /// The cell's representative point under the given policy.
    ///
    /// The document centroid when requested and available; the geometric
    /// center otherwise (always for empty cells).
    pub fn central_point(&self, method: CenterMethod) -> C {
        match (method, self.centroid()) {
            (CenterMethod::Centroid, Some(centroid)) => centroid,
            _ => self.true_center,
        }
    }

    /// Popularity weight used by baseline rankers and priors.
    #[inline]
    pub fn prior_weight(&self, by_salience: bool) -> f64 {
        if by_salience {
            self.salience
        } else {
            self.num_docs as f64
        }
    }

    /// Full human-readable description, for debug traces and reports.
    pub fn describe(&self) -> String {
        let popular = match &self.most_popular {
            Some((title, s)) => format!(", most-popular '{title}' ({s:.1})"),
            None => String::new(),
        };
        format!(
            "cell {} {} ({} docs, salience {:.1}{})",
            self.key, self.bounds, self.num_docs, self.salience, popular
        )
    }
}

impl<C: Coord> fmt::Display for GridCell<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell {} {}", self.key, self.bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LmConfig;
    use crate::coord::SphereCoord;
    use crate::doc::{Corpus, DocSplit, RawDoc};

    fn corpus_with(docs: Vec<(&str, f64, f64, f64)>) -> Corpus<SphereCoord> {
        let mut corpus = Corpus::new(LmConfig::default());
        for (title, lat, long, salience) in docs {
            corpus.add(RawDoc {
                title: title.to_string(),
                coord: Some(SphereCoord::new(lat, long).unwrap()),
                salience,
                split: DocSplit::Training,
                word_counts: vec![("paris".to_string(), 10.0)],
            });
        }
        corpus.finish();
        corpus
    }

    fn key() -> CellKey {
        CellKey { row: 0, col: 0 }
    }

    #[test]
    fn test_add_document_accumulates() {
        let corpus = corpus_with(vec![("a", 1.0, 1.0, 5.0), ("b", 3.0, 3.0, 9.0)]);
        let center = SphereCoord::new(2.0, 2.0).unwrap();
        let mut cell = GridCell::new_recorded(key(), "[0..4,0..4]".to_string(), center);
        for doc in corpus.docs() {
            cell.add_document(doc);
        }
        assert_eq!(cell.num_docs(), 2);
        assert!((cell.salience() - 14.0).abs() < 1e-12);
        let centroid = cell.centroid().unwrap();
        assert!((centroid.lat - 2.0).abs() < 1e-12);
        assert_eq!(cell.most_popular(), Some(("b", 9.0)));
        cell.finish(corpus.factory().global(), 0.3);
        assert!(cell.lm().is_finished());
        assert!((cell.lm().total_tokens() - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_central_point_policy() {
        let corpus = corpus_with(vec![("a", 1.0, 1.0, 0.0)]);
        let center = SphereCoord::new(2.0, 2.0).unwrap();
        let mut cell = GridCell::new_recorded(key(), String::new(), center);
        cell.add_document(&corpus.docs()[0]);
        let centroid = cell.central_point(CenterMethod::Centroid);
        assert!((centroid.lat - 1.0).abs() < 1e-12);
        let true_center = cell.central_point(CenterMethod::TrueCenter);
        assert!((true_center.lat - 2.0).abs() < 1e-12);

        // Empty cells fall back to the geometric center either way.
        let empty: GridCell<SphereCoord> =
            GridCell::new_transient(key(), String::new(), center, corpus.empty_model());
        assert!((empty.central_point(CenterMethod::Centroid).lat - 2.0).abs() < 1e-12);
    }

    #[test]
    #[should_panic(expected = "finish() called twice")]
    fn test_double_finish_panics() {
        let corpus = corpus_with(vec![("a", 1.0, 1.0, 0.0)]);
        let center = SphereCoord::new(2.0, 2.0).unwrap();
        let mut cell: GridCell<SphereCoord> = GridCell::new_recorded(key(), String::new(), center);
        cell.finish(corpus.factory().global(), 0.3);
        cell.finish(corpus.factory().global(), 0.3);
    }

    #[test]
    #[should_panic(expected = "add_document() on finished cell")]
    fn test_add_after_finish_panics() {
        let corpus = corpus_with(vec![("a", 1.0, 1.0, 0.0)]);
        let center = SphereCoord::new(2.0, 2.0).unwrap();
        let mut cell = GridCell::new_recorded(key(), String::new(), center);
        cell.finish(corpus.factory().global(), 0.3);
        cell.add_document(&corpus.docs()[0]);
    }
}
