use crate::core::geo::{BoundingBox, LatLng};
use crate::Result;
use serde::{Deserialize, Serialize};

/// Snapshot of what the map currently shows.
///
/// A new value is produced for every movement and replaces the previous
/// one; nothing ever mutates a viewport in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    /// Visible geographic extent
    pub bounds: BoundingBox,
    /// The center of the map view in geographical coordinates
    pub center: LatLng,
    /// The current zoom level
    pub zoom: f64,
}

impl ViewportState {
    pub fn new(bounds: BoundingBox, center: LatLng, zoom: f64) -> Self {
        Self {
            bounds,
            center,
            zoom,
        }
    }

    /// Builds a viewport centered on `center` covering the given spans.
    pub fn from_center_span(center: LatLng, lat_span: f64, lng_span: f64, zoom: f64) -> Result<Self> {
        let bounds = BoundingBox::around(center, lat_span, lng_span)?;
        Ok(Self::new(bounds, center, zoom))
    }

    /// Whether tile-level detail should be drawn at this zoom
    pub fn shows_tiles(&self, zoom_threshold: f64) -> bool {
        self.zoom >= zoom_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_center_span_builds_symmetric_bounds() {
        let vp = ViewportState::from_center_span(LatLng::new(40.0, -74.0), 2.0, 4.0, 9.0).unwrap();
        assert_eq!(vp.bounds.min_lat, 39.0);
        assert_eq!(vp.bounds.max_lat, 41.0);
        assert_eq!(vp.bounds.min_lon, -76.0);
        assert_eq!(vp.bounds.max_lon, -72.0);
        assert_eq!(vp.center, LatLng::new(40.0, -74.0));
    }

    #[test]
    fn negative_span_is_rejected() {
        assert!(ViewportState::from_center_span(LatLng::default(), -1.0, 1.0, 5.0).is_err());
    }

    #[test]
    fn threshold_is_inclusive() {
        let vp = ViewportState::from_center_span(LatLng::default(), 1.0, 1.0, 6.0).unwrap();
        assert!(vp.shows_tiles(6.0));
        assert!(!vp.shows_tiles(6.5));
    }
}
