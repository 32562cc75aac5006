//! Shared fixtures for the integration suites
#![allow(dead_code)]

use std::sync::Arc;

use heatlet::prelude::*;

/// Catalog of 1x1 degree cells: tile `r{row}c{col}` spans
/// lat `row..row+1` and lon `col..col+1`.
pub fn grid_catalog(rows: usize, cols: usize) -> MetadataCatalog {
    let mut entries = Vec::new();
    for row in 0..rows {
        for col in 0..cols {
            let bounds = BoundingBox::new(
                row as f64,
                row as f64 + 1.0,
                col as f64,
                col as f64 + 1.0,
            )
            .unwrap();
            entries.push((TileId::new(format!("r{row}c{col}")), bounds));
        }
    }
    MetadataCatalog::from_entries(entries)
}

/// A small square polygon inside `bounds`
pub fn tile_data(bounds: &BoundingBox) -> FeatureCollection {
    let c = bounds.centroid();
    FeatureCollection::new(vec![GeoJsonFeature::new(GeoJsonGeometry::polygon([
        [c.lng - 0.1, c.lat - 0.1],
        [c.lng + 0.1, c.lat - 0.1],
        [c.lng + 0.1, c.lat + 0.1],
        [c.lng - 0.1, c.lat - 0.1],
    ]))])
}

/// Fetcher serving a payload for every catalog entry
pub fn fetcher_for(catalog: &MetadataCatalog) -> Arc<MemoryTileFetcher> {
    let fetcher = MemoryTileFetcher::new();
    for meta in catalog.iter() {
        fetcher.insert(meta.id.clone(), &tile_data(&meta.bounds)).unwrap();
    }
    Arc::new(fetcher)
}

pub fn viewport(lat: f64, lng: f64, span: f64, zoom: f64) -> ViewportState {
    ViewportState::from_center_span(LatLng::new(lat, lng), span, span, zoom).unwrap()
}

pub fn viewport_spans(lat: f64, lng: f64, lat_span: f64, lng_span: f64, zoom: f64) -> ViewportState {
    ViewportState::from_center_span(LatLng::new(lat, lng), lat_span, lng_span, zoom).unwrap()
}

pub fn ids(names: &[&str]) -> Vec<TileId> {
    names.iter().map(|name| TileId::from(*name)).collect()
}

pub fn sorted(mut tiles: Vec<TileId>) -> Vec<TileId> {
    tiles.sort();
    tiles
}

pub fn manager(
    engine: &InMemoryEngine,
    fetcher: &Arc<MemoryTileFetcher>,
    config: &TileLoadingConfig,
) -> TileLifecycleManager<InMemoryEngine> {
    let fetcher: Arc<dyn TileFetcher> = fetcher.clone();
    TileLifecycleManager::new(engine.clone(), fetcher, config)
}

/// Tile layer ids currently in the engine, bottom to top
pub fn tile_layers(engine: &InMemoryEngine) -> Vec<String> {
    engine
        .layer_ids()
        .into_iter()
        .filter(|id| id.starts_with(heatlet::constants::TILE_LAYER_PREFIX))
        .collect()
}

/// Adds a non-tile overlay layer on top of the stack
pub fn add_overlay(engine: &mut InMemoryEngine, layer_id: &str) {
    let source_id = format!("{layer_id}-source");
    engine
        .add_source(&source_id, SourceSpec::GeoJson { data: FeatureCollection::new(Vec::new()) })
        .unwrap();
    engine
        .add_layer(LayerSpec::new(layer_id, LayerKind::Fill, source_id), None)
        .unwrap();
}
