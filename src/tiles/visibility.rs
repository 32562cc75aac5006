use std::cmp::Ordering;

use super::catalog::MetadataCatalog;
use crate::core::geo::TileId;
use crate::core::viewport::ViewportState;

/// Tiles that should be shown for `viewport`, nearest first.
///
/// Below `zoom_threshold` nothing is visible and the caller is expected to
/// unload everything. Otherwise every tile whose box overlaps the viewport
/// bounds is returned (touching edges count), ordered by the planar distance
/// between the box centroid and the viewport center, ties broken by id.
pub fn compute_visible_tiles(
    catalog: &MetadataCatalog,
    viewport: &ViewportState,
    zoom_threshold: f64,
) -> Vec<TileId> {
    if !viewport.shows_tiles(zoom_threshold) {
        return Vec::new();
    }

    let center = viewport.center;
    let mut visible: Vec<(f64, &TileId)> = catalog
        .intersecting(&viewport.bounds)
        .filter(|meta| meta.bounds.intersects(&viewport.bounds))
        .map(|meta| (meta.bounds.centroid().planar_distance_to(&center), &meta.id))
        .collect();

    visible.sort_by(|(da, a), (db, b)| match da.total_cmp(db) {
        Ordering::Equal => a.cmp(b),
        other => other,
    });

    visible.into_iter().map(|(_, id)| id.clone()).collect()
}
