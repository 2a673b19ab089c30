//! Coordinate types for the spaces a grid can partition.
//!
//! The engine is generic over a point-in-space type: [`SphereCoord`] for
//! geographic latitude/longitude and [`TimeCoord`] for a scalar timeline.
//! Each instantiation supplies its own distance and centroid arithmetic.

use crate::error::{GridLocateError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mean Earth radius in kilometers, used for great-circle distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometers per mile, for report output in both units.
pub const KM_PER_MILE: f64 = 1.609344;

/// A point in the coordinate space a grid partitions.
///
/// Implementations supply two distance notions: [`distance`](Coord::distance)
/// in physical units (kilometers on the sphere) and
/// [`coord_distance`](Coord::coord_distance) in raw coordinate-space units
/// (Euclidean degrees on the sphere). The component arithmetic supports
/// running centroid accumulation in grid cells.
pub trait Coord:
    Copy + Clone + PartialEq + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Name of the physical distance unit (e.g. "km").
    const UNITS: &'static str;

    /// Name of the alternate display unit (e.g. "miles").
    const ALT_UNITS: &'static str;

    /// Physical units per alternate display unit (e.g. km per mile).
    const UNITS_PER_ALT: f64;

    /// Physical distance between two points, in `UNITS`.
    fn distance(&self, other: &Self) -> f64;

    /// Distance in raw coordinate-space units (degrees on the sphere).
    ///
    /// Used to express prediction offsets as fractions of a cell width.
    fn coord_distance(&self, other: &Self) -> f64;

    /// Component-wise sum, for centroid accumulation.
    fn component_sum(&self, other: &Self) -> Self;

    /// Component-wise scaling, for turning an accumulated sum into a mean.
    fn component_scale(&self, factor: f64) -> Self;
}

/// A latitude/longitude pair in degrees.
///
/// Latitude is restricted to [-90, 90] and longitude to [-180, 180].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SphereCoord {
    /// Latitude in degrees, positive north.
    pub lat: f64,
    /// Longitude in degrees, positive east.
    pub long: f64,
}

impl SphereCoord {
    /// Creates a coordinate, validating the degree ranges.
    pub fn new(lat: f64, long: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&long) {
            return Err(GridLocateError::InvalidCoordinate { lat, long });
        }
        Ok(Self { lat, long })
    }

    /// Great-circle distance to another point via the haversine formula, in km.
    pub fn spheredist(&self, other: &SphereCoord) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = (other.lat - self.lat).to_radians();
        let dlong = (other.long - self.long).to_radians();

        let a = (dlat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (dlong / 2.0).sin().powi(2);
        // Clamp guards against round-off pushing the argument past 1.
        let c = 2.0 * a.sqrt().min(1.0).asin();
        EARTH_RADIUS_KM * c
    }

    /// Euclidean distance in degrees, ignoring longitude wraparound.
    ///
    /// This matches the conventional "degree distance" evaluation metric for
    /// document geolocation; it is not a surface distance.
    pub fn degree_dist(&self, other: &SphereCoord) -> f64 {
        let dlat = self.lat - other.lat;
        let dlong = self.long - other.long;
        (dlat * dlat + dlong * dlong).sqrt()
    }
}

impl fmt::Display for SphereCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2},{:.2})", self.lat, self.long)
    }
}

impl Coord for SphereCoord {
    const UNITS: &'static str = "km";
    const ALT_UNITS: &'static str = "miles";
    const UNITS_PER_ALT: f64 = KM_PER_MILE;

    fn distance(&self, other: &Self) -> f64 {
        self.spheredist(other)
    }

    fn coord_distance(&self, other: &Self) -> f64 {
        self.degree_dist(other)
    }

    /// Component-wise sum. Centroids computed this way are averages of
    /// latitude and longitude and therefore misbehave for document sets
    /// straddling the antimeridian; cells are far smaller than a hemisphere,
    /// so lookups never hand such a set to the accumulator.
    fn component_sum(&self, other: &Self) -> Self {
        Self {
            lat: self.lat + other.lat,
            long: self.long + other.long,
        }
    }

    fn component_scale(&self, factor: f64) -> Self {
        Self {
            lat: self.lat * factor,
            long: self.long * factor,
        }
    }
}

/// A point on a timeline, measured in (possibly fractional) years.
///
/// Exercises the generic core on a one-dimensional space: distances are in
/// years and the alternate display unit is decades.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeCoord {
    /// Year, fractional years allowed.
    pub year: f64,
}

impl TimeCoord {
    /// Creates a time coordinate.
    pub fn new(year: f64) -> Self {
        Self { year }
    }
}

impl fmt::Display for TimeCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.year)
    }
}

impl Coord for TimeCoord {
    const UNITS: &'static str = "years";
    const ALT_UNITS: &'static str = "decades";
    const UNITS_PER_ALT: f64 = 10.0;

    fn distance(&self, other: &Self) -> f64 {
        (self.year - other.year).abs()
    }

    fn coord_distance(&self, other: &Self) -> f64 {
        (self.year - other.year).abs()
    }

    fn component_sum(&self, other: &Self) -> Self {
        Self {
            year: self.year + other.year,
        }
    }

    fn component_scale(&self, factor: f64) -> Self {
        Self {
            year: self.year * factor,
        }
    }
}
