//! Neighborhood boundary overlays.
//!
//! Boundaries are published per US state. Each loaded state becomes one
//! GeoJSON source with a line layer for the outlines and a symbol layer for
//! the names. Both sit on top of the stack, so heatmap tiles registered
//! afterwards go below them. Labels start hidden and are toggled together.

use std::collections::BTreeSet;
use std::fmt;

use serde_json::{json, Value};

use crate::core::config::TileLoadingConfig;
use crate::data::geojson::FeatureCollection;
use crate::engine::{LayerKind, LayerSpec, MapEngine, SourceSpec};
use crate::tiles::fetcher::read_resource;
use crate::tiles::source::BasePathSource;
use crate::{Error, Result};

pub const NEIGHBORHOOD_SOURCE_PREFIX: &str = "neighborhood-source-";
pub const NEIGHBORHOOD_LAYER_PREFIX: &str = "neighborhood-layer-";
pub const NEIGHBORHOOD_LABEL_PREFIX: &str = "neighborhood-label-";

/// Two-letter US state code, upper case
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateCode(String);

impl StateCode {
    /// Accepts `TX`, `tx` or an ISO 3166-2 region code such as `US-TX`,
    /// the form reverse geocoders report.
    pub fn parse(code: &str) -> Result<Self> {
        let code = code.trim();
        let state = code.strip_prefix("US-").or_else(|| code.strip_prefix("us-")).unwrap_or(code);
        if state.len() == 2 && state.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(state.to_ascii_uppercase()))
        } else {
            Err(Error::InvalidStateCode(code.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn neighborhood_source_name(state: &StateCode) -> String {
    format!("{NEIGHBORHOOD_SOURCE_PREFIX}{state}")
}

pub fn neighborhood_layer_name(state: &StateCode) -> String {
    format!("{NEIGHBORHOOD_LAYER_PREFIX}{state}")
}

pub fn neighborhood_label_name(state: &StateCode) -> String {
    format!("{NEIGHBORHOOD_LABEL_PREFIX}{state}")
}

fn visibility(visible: bool) -> Value {
    json!(if visible { "visible" } else { "none" })
}

/// Loads state boundary overlays and toggles their labels
#[derive(Debug)]
pub struct NeighborhoodLoader {
    source: BasePathSource,
    loaded: BTreeSet<StateCode>,
    labels_visible: bool,
}

impl NeighborhoodLoader {
    pub fn new(source: BasePathSource) -> Self {
        Self {
            source,
            loaded: BTreeSet::new(),
            labels_visible: false,
        }
    }

    pub fn from_config(config: &TileLoadingConfig) -> Self {
        Self::new(BasePathSource::from_config(config))
    }

    /// States whose overlay is in the engine, in code order
    pub fn loaded_states(&self) -> impl Iterator<Item = &StateCode> {
        self.loaded.iter()
    }

    pub fn labels_visible(&self) -> bool {
        self.labels_visible
    }

    /// Fetches a state's boundaries and adds its outline and label layers.
    ///
    /// Returns `Ok(false)` without fetching when the state's source is
    /// already registered. Fetch and parse failures leave the engine
    /// untouched.
    pub async fn load(&mut self, engine: &mut dyn MapEngine, state: &StateCode) -> Result<bool> {
        let source_id = neighborhood_source_name(state);
        if engine.has_source(&source_id) {
            log::debug!("neighborhoods for {} already loaded", state);
            self.loaded.insert(state.clone());
            return Ok(false);
        }

        let location = self.source.neighborhood_url(state.as_str());
        log::debug!("fetching neighborhoods for {} from {}", state, location);
        let bytes = read_resource(&location).await?;
        let data = FeatureCollection::from_slice(&bytes)
            .map_err(|e| Error::Parse(format!("{location}: {e}")))?;
        log::info!("loaded {} neighborhoods for {}", data.len(), state);

        // Another caller may have registered it while we were fetching
        if engine.has_source(&source_id) {
            self.loaded.insert(state.clone());
            return Ok(false);
        }
        engine.add_source(&source_id, SourceSpec::GeoJson { data })?;
        if let Err(err) = self.add_layers(engine, state) {
            if let Err(cleanup) = engine.remove_source(&source_id) {
                log::error!("could not roll back source {}: {}", source_id, cleanup);
            }
            return Err(err);
        }

        self.loaded.insert(state.clone());
        log::debug!(
            "added {} and {}",
            neighborhood_layer_name(state),
            neighborhood_label_name(state)
        );
        Ok(true)
    }

    /// Adds the outline layer, then the label layer; removes the outline
    /// again if the labels are rejected.
    fn add_layers(&self, engine: &mut dyn MapEngine, state: &StateCode) -> Result<()> {
        let source_id = neighborhood_source_name(state);
        let outline_id = neighborhood_layer_name(state);

        let outline = LayerSpec::new(outline_id.clone(), LayerKind::Line, source_id.clone())
            .with_paint("line-color", json!("#000000"))
            .with_paint("line-width", json!(2))
            .with_paint("line-opacity", json!(0.8));
        engine.add_layer(outline, None)?;

        let labels = LayerSpec::new(neighborhood_label_name(state), LayerKind::Symbol, source_id)
            .with_layout("text-field", json!(["get", "NAME"]))
            .with_layout("text-variable-anchor", json!(["center"]))
            .with_layout("text-radial-offset", json!(0))
            .with_layout("text-justify", json!("auto"))
            .with_layout("text-size", json!(12))
            .with_layout("text-allow-overlap", json!(false))
            .with_layout("visibility", visibility(self.labels_visible))
            .with_paint("text-color", json!("#000000"))
            .with_paint("text-halo-color", json!("#ffffff"))
            .with_paint("text-halo-width", json!(2));
        if let Err(err) = engine.add_layer(labels, None) {
            if let Err(cleanup) = engine.remove_layer(&outline_id) {
                log::error!("could not roll back layer {}: {}", outline_id, cleanup);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Shows or hides the names of every neighborhood label layer in the
    /// engine. States loaded later follow the same setting. Returns the
    /// number of layers updated.
    pub fn set_labels_visible(&mut self, engine: &mut dyn MapEngine, visible: bool) -> usize {
        self.labels_visible = visible;
        let mut updated = 0;
        for layer_id in engine.layer_ids() {
            if !layer_id.starts_with(NEIGHBORHOOD_LABEL_PREFIX) {
                continue;
            }
            match engine.set_layout_property(&layer_id, "visibility", visibility(visible)) {
                Ok(()) => updated += 1,
                Err(err) => log::error!("could not toggle {}: {}", layer_id, err),
            }
        }
        log::info!(
            "neighborhood labels {} on {} layers",
            if visible { "shown" } else { "hidden" },
            updated
        );
        updated
    }
}
