use crate::core::geo::{BoundingBox, TileId};

use rstar::{RTree, RTreeObject, AABB};

/// A tile footprint stored in the R-tree
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialItem {
    pub id: TileId,
    pub bounds: BoundingBox,
}

impl SpatialItem {
    pub fn new(id: TileId, bounds: BoundingBox) -> Self {
        Self { id, bounds }
    }
}

// --- rstar integration -------------------------------------------------------------------------
// Envelopes are [lon, lat] so x is east-west like the map.

fn envelope_of(bounds: &BoundingBox) -> AABB<[f64; 2]> {
    AABB::from_corners(
        [bounds.min_lon, bounds.min_lat],
        [bounds.max_lon, bounds.max_lat],
    )
}

impl RTreeObject for SpatialItem {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        envelope_of(&self.bounds)
    }
}

/// Static R-tree over tile bounding boxes.
///
/// Built once from the catalog; queries use closed intervals, so a tile
/// whose edge touches the query box is returned.
#[derive(Debug)]
pub struct SpatialIndex {
    rtree: RTree<SpatialItem>,
}

impl SpatialIndex {
    /// Bulk-loads all items at once, which gives a better balanced tree
    /// than repeated inserts.
    pub fn bulk_load(items: Vec<SpatialItem>) -> Self {
        Self {
            rtree: RTree::bulk_load(items),
        }
    }

    pub fn query(&self, bounds: &BoundingBox) -> Vec<&SpatialItem> {
        let envelope = envelope_of(bounds);
        self.rtree.locate_in_envelope_intersecting(&envelope).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rtree.size() == 0
    }

    pub fn len(&self) -> usize {
        self.rtree.size()
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self {
            rtree: RTree::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> SpatialItem {
        SpatialItem::new(
            TileId::from(id),
            BoundingBox::new(min_lat, max_lat, min_lon, max_lon).unwrap(),
        )
    }

    #[test]
    fn query_returns_touching_items() {
        let index = SpatialIndex::bulk_load(vec![
            item("inside", 0.2, 0.8, 0.2, 0.8),
            item("touching", 1.0, 2.0, 0.0, 1.0),
            item("outside", 3.0, 4.0, 3.0, 4.0),
        ]);
        let query = BoundingBox::new(0.0, 1.0, 0.0, 1.0).unwrap();

        let mut ids: Vec<_> = index.query(&query).iter().map(|i| i.id.to_string()).collect();
        ids.sort();
        assert_eq!(ids, vec!["inside", "touching"]);
    }

    #[test]
    fn empty_and_bulk_loaded_sizes() {
        assert!(SpatialIndex::default().is_empty());
        let index = SpatialIndex::bulk_load(vec![
            item("a", -0.5, 0.5, -0.5, 0.5),
            item("b", 10.0, 11.0, 10.0, 11.0),
        ]);
        assert_eq!(index.len(), 2);
        assert!(!index.is_empty());
    }
}
