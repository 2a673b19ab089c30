//! One-dimensional tiling of a timeline.

use crate::config::GridConfig;
use crate::coord::TimeCoord;
use crate::error::{GridLocateError, Result};
use crate::grid::{CellKey, Tiling};

/// Partitions a timeline into spans of `width` years.
///
/// Keys use `row = 0` and the span index as `col`; year 0 starts column 0
/// and negative years take negative columns.
#[derive(Debug, Clone)]
pub struct YearTiling {
    width: f64,
}

impl YearTiling {
    /// Creates a tiling with the given span width in years.
    pub fn new(width: f64) -> Result<Self> {
        if width <= 0.0 {
            return Err(GridLocateError::Config(format!(
                "span width must be positive, got {width}"
            )));
        }
        Ok(Self { width })
    }

    /// Creates a tiling with the configured span width.
    pub fn from_config(config: &GridConfig) -> Result<Self> {
        Self::new(config.cell_width)
    }

    /// Span width in years.
    #[inline]
    pub fn width(&self) -> f64 {
        self.width
    }
}

impl Tiling for YearTiling {
    type Coord = TimeCoord;

    fn key_for_coord(&self, coord: TimeCoord) -> Option<CellKey> {
        Some(CellKey {
            row: 0,
            col: (coord.year / self.width).floor() as i32,
        })
    }

    fn true_center(&self, key: CellKey) -> TimeCoord {
        TimeCoord::new((key.col as f64 + 0.5) * self.width)
    }

    fn describe_key(&self, key: CellKey) -> String {
        let start = key.col as f64 * self.width;
        format!("[{:.0}..{:.0})", start, start + self.width)
    }

    fn cell_width(&self) -> f64 {
        self.width
    }

    fn num_slots(&self) -> Option<u64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        let tiling = YearTiling::new(10.0).unwrap();
        let key = |year| tiling.key_for_coord(TimeCoord::new(year)).unwrap();
        assert_eq!(key(1855.0), CellKey { row: 0, col: 185 });
        assert_eq!(key(0.0), CellKey { row: 0, col: 0 });
        assert_eq!(key(-5.0), CellKey { row: 0, col: -1 });
    }

    #[test]
    fn test_true_center() {
        let tiling = YearTiling::new(10.0).unwrap();
        let center = tiling.true_center(CellKey { row: 0, col: 185 });
        assert!((center.year - 1855.0).abs() < 1e-12);
        assert_eq!(tiling.describe_key(CellKey { row: 0, col: 185 }), "[1850..1860)");
    }

    #[test]
    fn test_width_validation() {
        assert!(YearTiling::new(0.0).is_err());
        assert!(YearTiling::new(25.0).is_ok());
    }

    #[test]
    fn test_from_config_uses_configured_width() {
        let config = GridConfig {
            cell_width: 25.0,
            ..Default::default()
        };
        assert_eq!(YearTiling::from_config(&config).unwrap().width(), 25.0);
    }
}
