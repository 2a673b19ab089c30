//! Cell grids over a coordinate space.
//!
//! A [`Grid`] partitions its space through a [`Tiling`], assigns training
//! documents to [`GridCell`]s, and once frozen serves coordinate lookups
//! and iteration over its non-empty cells. Population is a single-writer
//! phase; after [`finish`](Grid::finish) the grid is read-only and safe to
//! score from many threads.

mod cell;
mod sphere;
mod time;

pub use cell::GridCell;
pub use sphere::SphereTiling;
pub use time::YearTiling;

use crate::config::GridConfig;
use crate::coord::Coord;
use crate::doc::{GeoDoc, SKIP_EMPTY_LM, SKIP_NO_COORD};
use crate::lm::{GlobalDist, LangModelFactory, Unigram};
use log::{debug, info};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Counter name for a coordinate the tiling cannot address.
pub const SKIP_OUT_OF_RANGE: &str = "skipped.coord-out-of-range";

/// Row/column address of a cell within a tiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellKey {
    /// Row index (latitude band on the sphere).
    pub row: i32,
    /// Column index (longitude band on the sphere).
    pub col: i32,
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.row, self.col)
    }
}

/// A scheme for partitioning a coordinate space into addressable cells.
pub trait Tiling: Send + Sync {
    /// The coordinate type this tiling partitions.
    type Coord: Coord;

    /// Key of the cell containing `coord`, or `None` when the coordinate
    /// falls outside the addressable range.
    fn key_for_coord(&self, coord: Self::Coord) -> Option<CellKey>;

    /// Geometric center of a cell's region.
    fn true_center(&self, key: CellKey) -> Self::Coord;

    /// Human-readable bounds of a cell's region.
    fn describe_key(&self, key: CellKey) -> String;

    /// Cell width in coordinate-space units, for offset bucketing.
    fn cell_width(&self) -> f64;

    /// Total number of addressable cells, `None` when unbounded.
    fn num_slots(&self) -> Option<u64>;
}

/// The partition of a coordinate space into populated cells.
///
/// Cells are created lazily when the first document lands in them, so the
/// cell set holds non-empty cells only. Iteration order is insertion order,
/// which is deterministic for a fixed document stream.
#[derive(Debug)]
pub struct Grid<T: Tiling> {
    tiling: T,
    config: GridConfig,
    cells: Vec<GridCell<T::Coord>>,
    index: HashMap<CellKey, usize>,
    global: Arc<GlobalDist>,
    interp: f64,
    total_num_docs: usize,
    total_salience: f64,
    skipped: HashMap<&'static str, usize>,
    finished: bool,
}

impl<T: Tiling> Grid<T> {
    /// Creates an empty grid.
    ///
    /// The corpus behind `factory` must already be finished; the grid keeps
    /// the global backoff distribution for freezing its cells and for
    /// synthesizing transient ones.
    pub fn new(tiling: T, config: GridConfig, factory: &LangModelFactory) -> Self {
        Self {
            tiling,
            config,
            cells: Vec::new(),
            index: HashMap::new(),
            global: factory.global().clone(),
            interp: factory.config().interpolation_factor,
            total_num_docs: 0,
            total_salience: 0.0,
            skipped: HashMap::new(),
            finished: false,
        }
    }

    fn skip(&mut self, counter: &'static str, title: &str) {
        *self.skipped.entry(counter).or_insert(0) += 1;
        debug!("{counter}: '{title}' not added to grid");
    }

    /// Adds one training document to its owning cell.
    ///
    /// Documents without a coordinate or with an empty distribution are
    /// counted under the named skip counters and rejected. Returns whether
    /// the document was placed.
    pub fn add_document(&mut self, doc: &GeoDoc<T::Coord>) -> bool {
        assert!(!self.finished, "add_document() on a finished grid");
        let coord = match doc.coord() {
            Some(c) => c,
            None => {
                self.skip(SKIP_NO_COORD, doc.title());
                return false;
            }
        };
        if doc.lm().is_empty() {
            self.skip(SKIP_EMPTY_LM, doc.title());
            return false;
        }
        let key = match self.tiling.key_for_coord(coord) {
            Some(k) => k,
            None => {
                self.skip(SKIP_OUT_OF_RANGE, doc.title());
                return false;
            }
        };
        let idx = match self.index.get(&key) {
            Some(&i) => i,
            None => {
                let cell = GridCell::new_recorded(
                    key,
                    self.tiling.describe_key(key),
                    self.tiling.true_center(key),
                );
                self.cells.push(cell);
                self.index.insert(key, self.cells.len() - 1);
                self.cells.len() - 1
            }
        };
        self.cells[idx].add_document(doc);
        self.total_num_docs += 1;
        true
    }

    /// Adds a batch of training documents, typically
    /// `corpus.docs_in_split(DocSplit::Training)`.
    pub fn add_training_documents<'a>(
        &mut self,
        docs: impl IntoIterator<Item = &'a GeoDoc<T::Coord>>,
    ) {
        for doc in docs {
            self.add_document(doc);
        }
    }

    /// Freezes every cell and the grid itself. Calling twice is a fatal
    /// contract violation.
    pub fn finish(&mut self) {
        assert!(!self.finished, "finish() called twice on a grid");
        for cell in &mut self.cells {
            cell.finish(&self.global, self.interp);
        }
        self.total_salience = self.cells.iter().map(|c| c.salience()).sum();
        self.finished = true;
        let slots = match self.tiling.num_slots() {
            Some(n) => format!(" of {n} slots"),
            None => String::new(),
        };
        info!(
            "grid finished: {} documents in {} non-empty cells{}, {} skipped",
            self.total_num_docs,
            self.cells.len(),
            slots,
            self.skipped.values().sum::<usize>()
        );
    }

    /// Whether [`finish`](Self::finish) has run.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The cell containing `coord`.
    ///
    /// Returns a borrowed cell when one is recorded. When none is and
    /// `create_non_recorded` is set, synthesizes an owned transient cell
    /// (never inserted into the grid, so ranking output is unaffected).
    /// Returns `None` otherwise, or when the tiling cannot address `coord`.
    pub fn find_best_cell_for_coord(
        &self,
        coord: T::Coord,
        create_non_recorded: bool,
    ) -> Option<Cow<'_, GridCell<T::Coord>>> {
        assert!(
            self.finished,
            "find_best_cell_for_coord() before grid finish()"
        );
        let key = self.tiling.key_for_coord(coord)?;
        if let Some(&idx) = self.index.get(&key) {
            return Some(Cow::Borrowed(&self.cells[idx]));
        }
        if !create_non_recorded {
            return None;
        }
        let mut lm = Unigram::new();
        lm.finish_before_global();
        lm.finish_after_global(self.global.clone(), self.interp);
        Some(Cow::Owned(GridCell::new_transient(
            key,
            self.tiling.describe_key(key),
            self.tiling.true_center(key),
            lm,
        )))
    }

    /// The recorded cell at `key`, if any.
    pub fn cell_at(&self, key: CellKey) -> Option<&GridCell<T::Coord>> {
        self.index.get(&key).map(|&idx| &self.cells[idx])
    }

    /// Iterates over the non-empty cells in insertion order.
    pub fn iter_nonempty_cells(&self) -> impl Iterator<Item = &GridCell<T::Coord>> {
        assert!(self.finished, "iter_nonempty_cells() before grid finish()");
        self.cells.iter()
    }

    /// The non-empty cells, with `include` appended when it is not already
    /// one of them (by object identity, so a same-keyed cell from another
    /// grid still gets appended).
    ///
    /// Guarantees the ground-truth cell can always appear in a candidate
    /// list even when it holds no training documents.
    pub fn nonempty_cells_including<'a>(
        &'a self,
        include: Option<&'a GridCell<T::Coord>>,
    ) -> Vec<&'a GridCell<T::Coord>> {
        assert!(
            self.finished,
            "nonempty_cells_including() before grid finish()"
        );
        let mut out: Vec<&GridCell<T::Coord>> = self.cells.iter().collect();
        if let Some(cell) = include {
            let already = self
                .index
                .get(&cell.key())
                .map(|&idx| std::ptr::eq(&self.cells[idx], cell))
                .unwrap_or(false);
            if !already {
                out.push(cell);
            }
        }
        out
    }

    /// The cell's representative point under this grid's configured policy.
    #[inline]
    pub fn central_point(&self, cell: &GridCell<T::Coord>) -> T::Coord {
        cell.central_point(self.config.center_method)
    }

    /// The tiling.
    #[inline]
    pub fn tiling(&self) -> &T {
        &self.tiling
    }

    /// The grid configuration.
    #[inline]
    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Number of documents placed into cells.
    #[inline]
    pub fn total_num_docs(&self) -> usize {
        self.total_num_docs
    }

    /// Summed salience over all cells. Valid after finish.
    #[inline]
    pub fn total_salience(&self) -> f64 {
        self.total_salience
    }

    /// Number of non-empty cells.
    #[inline]
    pub fn num_nonempty_cells(&self) -> usize {
        self.cells.len()
    }

    /// Summed prior weight over all cells, by document count or salience.
    pub fn total_prior_weight(&self, by_salience: bool) -> f64 {
        if by_salience {
            self.total_salience
        } else {
            self.total_num_docs as f64
        }
    }

    /// Documents rejected during population, by counter name.
    pub fn skipped_counts(&self) -> &HashMap<&'static str, usize> {
        &self.skipped
    }
}
