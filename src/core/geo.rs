use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Identifier of one precomputed tile in the metadata catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileId(String);

impl TileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id can be used verbatim as a file name or URL path
    /// segment: ASCII letters, digits, `_`, `-` and `.`, not starting with `.`
    pub fn is_path_safe(&self) -> bool {
        !self.0.is_empty()
            && !self.0.starts_with('.')
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TileId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TileId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for TileId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Represents a geographical coordinate with latitude and longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Straight-line distance in degree space.
    ///
    /// This is not a geodesic distance; it only has to rank tiles
    /// consistently around a viewport center.
    pub fn planar_distance_to(&self, other: &LatLng) -> f64 {
        let d_lat = self.lat - other.lat;
        let d_lng = self.lng - other.lng;
        (d_lat * d_lat + d_lng * d_lng).sqrt()
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Axis-aligned geographic box in degrees. `min <= max` on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Creates a box, rejecting inverted or non-finite extents
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Result<Self> {
        let bounds = Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        };
        if bounds.is_valid() {
            Ok(bounds)
        } else {
            Err(Error::InvalidBounds(format!(
                "lat [{min_lat}, {max_lat}], lon [{min_lon}, {max_lon}]"
            )))
        }
    }

    /// Creates a box spanning `lat_span` x `lng_span` degrees around `center`
    pub fn around(center: LatLng, lat_span: f64, lng_span: f64) -> Result<Self> {
        let half_lat = lat_span / 2.0;
        let half_lng = lng_span / 2.0;
        Self::new(
            center.lat - half_lat,
            center.lat + half_lat,
            center.lng - half_lng,
            center.lng + half_lng,
        )
    }

    /// Checks if the bounds are valid (finite and min <= max)
    pub fn is_valid(&self) -> bool {
        [self.min_lat, self.max_lat, self.min_lon, self.max_lon]
            .iter()
            .all(|v| v.is_finite())
            && self.min_lat <= self.max_lat
            && self.min_lon <= self.max_lon
    }

    /// Closed-interval overlap: boxes that only touch along an edge or a
    /// corner still intersect.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !(other.max_lat < self.min_lat
            || other.min_lat > self.max_lat
            || other.max_lon < self.min_lon
            || other.min_lon > self.max_lon)
    }

    /// Gets the center point of the bounds
    pub fn centroid(&self) -> LatLng {
        LatLng::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }
}
