//! Content-free baseline rankers.

use crate::config::RankerConfig;
use crate::coord::Coord;
use crate::doc::GeoDoc;
use crate::grid::{Grid, GridCell, Tiling};
use crate::ranker::{CellScore, Ranker};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::hash::{Hash, Hasher};

/// Ranks cells by popularity alone, never looking at the document.
///
/// Whether popularity means document count or summed salience is fixed at
/// construction, since call sites want it pinned down rather than inherited
/// from a global.
#[derive(Debug, Clone)]
pub struct MostPopular {
    by_salience: bool,
}

impl MostPopular {
    /// Creates the baseline; `by_salience` switches the popularity source
    /// from document count to summed salience.
    pub fn new(by_salience: bool) -> Self {
        Self { by_salience }
    }

    pub(crate) fn score_cell<C: Coord>(&self, cell: &GridCell<C>) -> f64 {
        cell.prior_weight(self.by_salience)
    }
}

/// Shuffles the candidate cells, scoring everything 0.
///
/// With `config.random_seed` set, each document draws its own stream
/// derived from the seed and the document title, so results reproduce for
/// a fixed seed and stay independent of evaluation order. Without a seed
/// the shuffle is non-deterministic.
#[derive(Debug)]
pub struct RandomRanker<'g, T: Tiling> {
    grid: &'g Grid<T>,
    seed: Option<u64>,
}

impl<'g, T: Tiling> RandomRanker<'g, T> {
    /// Creates the baseline over `grid`.
    pub fn new(grid: &'g Grid<T>, config: &RankerConfig) -> Self {
        Self {
            grid,
            seed: config.random_seed,
        }
    }

    fn rng_for(&self, title: &str) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => {
                let mut hasher = std::collections::hash_map::DefaultHasher::new();
                title.hash(&mut hasher);
                ChaCha8Rng::seed_from_u64(seed ^ hasher.finish())
            }
            None => ChaCha8Rng::from_entropy(),
        }
    }
}

impl<'g, T: Tiling> Ranker<T::Coord> for RandomRanker<'g, T> {
    fn return_ranked_cells<'a>(
        &'a self,
        doc: &GeoDoc<T::Coord>,
        correct: Option<&'a GridCell<T::Coord>>,
        include_correct: bool,
    ) -> Vec<CellScore<'a, T::Coord>> {
        let include = if include_correct { correct } else { None };
        let mut cells = self.grid.nonempty_cells_including(include);
        cells.shuffle(&mut self.rng_for(doc.title()));
        cells.into_iter().map(|cell| (cell, 0.0)).collect()
    }
}
