//! Registration of tile sources and fill layers with the map engine.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use super::fetcher::TilePayload;
use crate::core::config::TileLoadingConfig;
use crate::core::constants::TILE_LAYER_PREFIX;
use crate::core::geo::TileId;
use crate::engine::{LayerKind, LayerSpec, MapEngine, SourceSpec};
use crate::Result;

/// Source id of a tile: `heatmap-tile-{id}`
pub fn source_name(id: &TileId) -> String {
    format!("{TILE_LAYER_PREFIX}{id}")
}

/// Fill layer id of a tile: `heatmap-tile-{id}-fill`
pub fn layer_name(id: &TileId) -> String {
    format!("{TILE_LAYER_PREFIX}{id}-fill")
}

pub fn is_tile_layer(layer_id: &str) -> bool {
    layer_id.starts_with(TILE_LAYER_PREFIX)
}

/// Paint and placement of tile fill layers.
///
/// Tiles start fully transparent; the colour filter decides `fill-color`
/// and `fill-outline-color` through [`TileStyle::set_paint`], and those
/// overrides are applied to every tile created afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct TileStyle {
    paint: BTreeMap<String, Value>,
    overlay_markers: Vec<String>,
}

impl Default for TileStyle {
    fn default() -> Self {
        Self::from_config(&TileLoadingConfig::default())
    }
}

impl TileStyle {
    pub fn from_config(config: &TileLoadingConfig) -> Self {
        let mut paint = BTreeMap::new();
        paint.insert("fill-color".to_string(), json!("rgba(0, 0, 0, 0)"));
        paint.insert("fill-outline-color".to_string(), json!("rgba(0, 0, 0, 0)"));
        paint.insert("fill-opacity".to_string(), json!(1));
        Self {
            paint,
            overlay_markers: config.overlay_markers.clone(),
        }
    }

    pub fn set_paint(&mut self, property: impl Into<String>, value: Value) {
        self.paint.insert(property.into(), value);
    }

    /// Whether `layer_id` is an overlay that must stay above heatmap tiles
    pub fn is_overlay(&self, layer_id: &str) -> bool {
        !is_tile_layer(layer_id)
            && self
                .overlay_markers
                .iter()
                .any(|marker| layer_id.contains(marker.as_str()))
    }

    /// The lowest overlay layer in the stack, if any
    pub fn insertion_point(&self, engine: &dyn MapEngine) -> Option<String> {
        engine
            .layer_ids()
            .into_iter()
            .find(|layer_id| self.is_overlay(layer_id))
    }

    fn fill_layer(&self, id: &TileId) -> LayerSpec {
        let mut layer = LayerSpec::new(layer_name(id), LayerKind::Fill, source_name(id));
        layer.paint = self.paint.clone();
        layer
    }

    /// Adds the source, then a fill layer directly below the lowest overlay.
    ///
    /// If the layer is rejected the source is removed again.
    pub fn register_tile(&self, engine: &mut dyn MapEngine, payload: TilePayload) -> Result<()> {
        let source_id = source_name(&payload.id);
        engine.add_source(&source_id, SourceSpec::GeoJson { data: payload.data })?;

        let before = self.insertion_point(engine);
        let layer = self.fill_layer(&payload.id);
        if let Err(err) = engine.add_layer(layer, before.as_deref()) {
            if let Err(cleanup) = engine.remove_source(&source_id) {
                log::error!("could not roll back source {}: {}", source_id, cleanup);
            }
            return Err(err);
        }

        log::debug!(
            "registered tile {} below {}",
            payload.id,
            before.as_deref().unwrap_or("top")
        );
        Ok(())
    }
}

/// Removes the tile's layer, then its source. Missing pieces are skipped so
/// a half-registered tile can still be cleaned up.
pub fn unregister_tile(engine: &mut dyn MapEngine, id: &TileId) -> Result<()> {
    let layer_id = layer_name(id);
    if engine.has_layer(&layer_id) {
        engine.remove_layer(&layer_id)?;
    }
    let source_id = source_name(id);
    if engine.has_source(&source_id) {
        engine.remove_source(&source_id)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::LatLng;
    use crate::core::viewport::ViewportState;
    use crate::data::geojson::FeatureCollection;
    use crate::engine::memory::{EngineOp, InMemoryEngine};

    fn engine() -> InMemoryEngine {
        InMemoryEngine::new(
            ViewportState::from_center_span(LatLng::new(30.0, -97.0), 1.0, 1.0, 8.0).unwrap(),
        )
    }

    fn payload(id: &str) -> TilePayload {
        TilePayload::new(TileId::from(id), FeatureCollection::new(Vec::new()))
    }

    #[test]
    fn names_follow_prefix() {
        let id = TileId::from("austin_3");
        assert_eq!(source_name(&id), "heatmap-tile-austin_3");
        assert_eq!(layer_name(&id), "heatmap-tile-austin_3-fill");
        assert!(is_tile_layer(&layer_name(&id)));
    }

    #[test]
    fn tile_layers_go_below_lowest_overlay() {
        let mut engine = engine();
        engine
            .add_source("base", SourceSpec::GeoJson { data: FeatureCollection::new(Vec::new()) })
            .unwrap();
        engine.add_layer(LayerSpec::new("water", LayerKind::Fill, "base"), None).unwrap();
        engine
            .add_layer(LayerSpec::new("neighborhood-layer-TX", LayerKind::Line, "base"), None)
            .unwrap();
        engine
            .add_layer(LayerSpec::new("place-label", LayerKind::Symbol, "base"), None)
            .unwrap();

        let style = TileStyle::default();
        style.register_tile(&mut engine, payload("a")).unwrap();

        assert_eq!(
            engine.layer_ids(),
            vec!["water", "heatmap-tile-a-fill", "neighborhood-layer-TX", "place-label"]
        );
    }

    #[test]
    fn no_overlay_means_top_of_stack() {
        let mut engine = engine();
        let style = TileStyle::default();
        style.register_tile(&mut engine, payload("a")).unwrap();
        style.register_tile(&mut engine, payload("b")).unwrap();
        assert_eq!(engine.layer_ids(), vec!["heatmap-tile-a-fill", "heatmap-tile-b-fill"]);
    }

    #[test]
    fn failed_layer_rolls_back_source() {
        let mut engine = engine();
        let style = TileStyle::default();
        engine
            .add_source("other", SourceSpec::GeoJson { data: FeatureCollection::new(Vec::new()) })
            .unwrap();
        // A foreign layer already owns the tile's layer id
        engine
            .add_layer(LayerSpec::new("heatmap-tile-a-fill", LayerKind::Fill, "other"), None)
            .unwrap();

        assert!(style.register_tile(&mut engine, payload("a")).is_err());
        assert!(!engine.has_source("heatmap-tile-a"));
    }

    #[test]
    fn unregister_removes_layer_before_source() {
        let mut engine = engine();
        let style = TileStyle::default();
        style.register_tile(&mut engine, payload("a")).unwrap();
        engine.take_ops();

        unregister_tile(&mut engine, &TileId::from("a")).unwrap();
        assert_eq!(
            engine.take_ops(),
            vec![
                EngineOp::RemoveLayer("heatmap-tile-a-fill".into()),
                EngineOp::RemoveSource("heatmap-tile-a".into()),
            ]
        );
    }

    #[test]
    fn paint_overrides_flow_into_new_layers() {
        let mut engine = engine();
        let mut style = TileStyle::default();
        style.set_paint("fill-color", json!("#ff0000"));
        style.register_tile(&mut engine, payload("a")).unwrap();

        let layer = engine.layer("heatmap-tile-a-fill").unwrap();
        assert_eq!(layer.paint["fill-color"], json!("#ff0000"));
        assert_eq!(layer.paint["fill-opacity"], json!(1));
    }
}
