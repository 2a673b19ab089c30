//! Score interpolation between two rankers.

use crate::config::{CenterMethod, RankerConfig};
use crate::doc::GeoDoc;
use crate::error::{GridLocateError, Result};
use crate::grid::{CellKey, Grid, GridCell, Tiling};
use crate::ranker::{CellScore, Ranker};
use std::collections::HashMap;

/// Blends a foreground ranker's scores into a background ranker's.
///
/// Foreground cells are projected onto the background grid through their
/// central point; when several land in one background cell, the best
/// foreground score wins. Each background candidate then scores
/// `fg * (1 - lambda) + bg * lambda`, and candidates with no foreground
/// counterpart keep their background score unchanged. The blend assumes
/// both rankers emit comparably scaled scores; projecting from a much
/// coarser foreground grid leaves most background cells unblended and the
/// mix loses meaning.
pub struct InterpolatingRanker<'g, T: Tiling, FG, BG> {
    foreground: FG,
    background: BG,
    bg_grid: &'g Grid<T>,
    lambda: f64,
}

impl<'g, T, FG, BG> InterpolatingRanker<'g, T, FG, BG>
where
    T: Tiling,
    FG: Ranker<T::Coord>,
    BG: Ranker<T::Coord>,
{
    /// Creates a blend weighted `config.interpolate_factor` toward the
    /// background.
    pub fn new(
        foreground: FG,
        background: BG,
        bg_grid: &'g Grid<T>,
        config: &RankerConfig,
    ) -> Result<Self> {
        let lambda = config.interpolate_factor;
        if !(0.0..=1.0).contains(&lambda) {
            return Err(GridLocateError::Config(format!(
                "interpolation factor {lambda} outside [0, 1]"
            )));
        }
        Ok(Self {
            foreground,
            background,
            bg_grid,
            lambda,
        })
    }
}

impl<'g, T, FG, BG> Ranker<T::Coord> for InterpolatingRanker<'g, T, FG, BG>
where
    T: Tiling,
    FG: Ranker<T::Coord>,
    BG: Ranker<T::Coord>,
{
    fn initialize(&mut self, test_docs: &[&GeoDoc<T::Coord>]) -> Result<()> {
        self.foreground.initialize(test_docs)?;
        self.background.initialize(test_docs)
    }

    fn return_ranked_cells<'a>(
        &'a self,
        doc: &GeoDoc<T::Coord>,
        correct: Option<&'a GridCell<T::Coord>>,
        include_correct: bool,
    ) -> Vec<CellScore<'a, T::Coord>> {
        let mut projected: HashMap<CellKey, f64> = HashMap::new();
        for (cell, score) in self.foreground.return_ranked_cells(doc, None, false) {
            let center = cell.central_point(CenterMethod::Centroid);
            if let Some(key) = self.bg_grid.tiling().key_for_coord(center) {
                projected.entry(key).or_insert(score);
            }
        }
        let mut blended: Vec<CellScore<'a, T::Coord>> = self
            .background
            .return_ranked_cells(doc, correct, include_correct)
            .into_iter()
            .map(|(cell, bg)| match projected.get(&cell.key()) {
                Some(&fg) => (cell, fg * (1.0 - self.lambda) + bg * self.lambda),
                None => (cell, bg),
            })
            .collect();
        blended.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        blended
    }
}
