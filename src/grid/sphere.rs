//! Uniform latitude/longitude tiling of the sphere.

use crate::config::GridConfig;
use crate::coord::SphereCoord;
use crate::error::{GridLocateError, Result};
use crate::grid::{CellKey, Tiling};

/// Partitions the sphere into uniform cells of `width` degrees per side.
///
/// Rows cover latitude from -90 northwards, columns cover longitude from
/// -180 eastwards. The top and right edges (latitude 90, longitude 180)
/// belong to the last row and column. Supports subdivision into finer
/// tilings for hierarchical ranking.
#[derive(Debug, Clone)]
pub struct SphereTiling {
    width: f64,
}

impl SphereTiling {
    /// Creates a tiling with the given cell width in degrees.
    pub fn new(width: f64) -> Result<Self> {
        if !(width > 0.0 && width <= 180.0) {
            return Err(GridLocateError::Config(format!(
                "cell width must be in (0, 180] degrees, got {width}"
            )));
        }
        Ok(Self { width })
    }

    /// Creates a tiling with the configured cell width.
    pub fn from_config(config: &GridConfig) -> Result<Self> {
        Self::new(config.cell_width)
    }

    /// Cell width in degrees.
    #[inline]
    pub fn width(&self) -> f64 {
        self.width
    }

    fn rows(&self) -> i32 {
        (180.0 / self.width).ceil() as i32
    }

    fn cols(&self) -> i32 {
        (360.0 / self.width).ceil() as i32
    }

    /// A tiling `factor` times finer in each direction.
    pub fn subdivide(&self, factor: u32) -> SphereTiling {
        assert!(factor >= 1, "subdivision factor must be at least 1");
        SphereTiling {
            width: self.width / factor as f64,
        }
    }

    /// Keys, in the tiling `factor` times finer, of the cells covering
    /// `key`'s region.
    pub fn children_of(&self, key: CellKey, factor: u32) -> Vec<CellKey> {
        assert!(factor >= 1, "subdivision factor must be at least 1");
        let f = factor as i32;
        let mut children = Vec::with_capacity((f * f) as usize);
        for dr in 0..f {
            for dc in 0..f {
                children.push(CellKey {
                    row: key.row * f + dr,
                    col: key.col * f + dc,
                });
            }
        }
        children
    }
}

impl Tiling for SphereTiling {
    type Coord = SphereCoord;

    fn key_for_coord(&self, coord: SphereCoord) -> Option<CellKey> {
        let row = ((coord.lat + 90.0) / self.width).floor() as i32;
        let col = ((coord.long + 180.0) / self.width).floor() as i32;
        // The closing edges fold into the last row/column.
        Some(CellKey {
            row: row.min(self.rows() - 1),
            col: col.min(self.cols() - 1),
        })
    }

    fn true_center(&self, key: CellKey) -> SphereCoord {
        SphereCoord {
            lat: (-90.0 + (key.row as f64 + 0.5) * self.width).clamp(-90.0, 90.0),
            long: (-180.0 + (key.col as f64 + 0.5) * self.width).clamp(-180.0, 180.0),
        }
    }

    fn describe_key(&self, key: CellKey) -> String {
        let south = -90.0 + key.row as f64 * self.width;
        let west = -180.0 + key.col as f64 * self.width;
        format!(
            "[{:.2}..{:.2},{:.2}..{:.2}]",
            south,
            (south + self.width).min(90.0),
            west,
            (west + self.width).min(180.0)
        )
    }

    fn cell_width(&self) -> f64 {
        self.width
    }

    fn num_slots(&self) -> Option<u64> {
        Some(self.rows() as u64 * self.cols() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_validation() {
        assert!(SphereTiling::new(1.0).is_ok());
        assert!(SphereTiling::new(0.0).is_err());
        assert!(SphereTiling::new(-2.0).is_err());
        assert!(SphereTiling::new(181.0).is_err());
    }

    #[test]
    fn test_from_config_uses_configured_width() {
        let config = GridConfig {
            cell_width: 5.0,
            ..Default::default()
        };
        let tiling = SphereTiling::from_config(&config).unwrap();
        assert_eq!(tiling.width(), 5.0);
        let bad = GridConfig {
            cell_width: 0.0,
            ..Default::default()
        };
        assert!(SphereTiling::from_config(&bad).is_err());
    }

    #[test]
    fn test_key_mapping() {
        let tiling = SphereTiling::new(1.0).unwrap();
        let key = |lat, long| {
            tiling
                .key_for_coord(SphereCoord::new(lat, long).unwrap())
                .unwrap()
        };
        assert_eq!(key(-90.0, -180.0), CellKey { row: 0, col: 0 });
        assert_eq!(key(-89.5, -179.5), CellKey { row: 0, col: 0 });
        assert_eq!(key(0.0, 0.0), CellKey { row: 90, col: 180 });
        // Closing edges belong to the final row/column.
        assert_eq!(key(90.0, 180.0), CellKey { row: 179, col: 359 });
    }

    #[test]
    fn test_true_center_round_trips() {
        let tiling = SphereTiling::new(5.0).unwrap();
        for &(lat, long) in &[(-88.0, -177.0), (0.1, 0.1), (47.3, 2.9), (89.9, 179.9)] {
            let key = tiling
                .key_for_coord(SphereCoord::new(lat, long).unwrap())
                .unwrap();
            let center = tiling.true_center(key);
            assert_eq!(tiling.key_for_coord(center).unwrap(), key);
        }
    }

    #[test]
    fn test_num_slots() {
        let tiling = SphereTiling::new(90.0).unwrap();
        assert_eq!(tiling.num_slots(), Some(2 * 4));
    }

    #[test]
    fn test_children_map_back_to_parent() {
        let coarse = SphereTiling::new(4.0).unwrap();
        let fine = coarse.subdivide(2);
        assert!((fine.width() - 2.0).abs() < 1e-12);
        let parent = CellKey { row: 3, col: 7 };
        let children = coarse.children_of(parent, 2);
        assert_eq!(children.len(), 4);
        for child in children {
            let center = fine.true_center(child);
            assert_eq!(coarse.key_for_coord(center).unwrap(), parent);
        }
    }
}
