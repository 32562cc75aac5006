//! The slice of a map engine the tile loader depends on.
//!
//! Pan/zoom, projection and painting belong to the engine itself. The
//! loader only needs to register and remove sources and layers, inspect
//! the layer stack, restyle layers, toggle layout properties such as
//! visibility and read the current view. Event
//! subscription is inverted: an engine adapter forwards its movement and
//! zoom events to [`crate::input::dispatcher::DispatcherHandle::notify`].

pub mod memory;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::viewport::ViewportState;
use crate::data::geojson::FeatureCollection;
use crate::Result;

/// Renderable data registered under a source id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceSpec {
    GeoJson { data: FeatureCollection },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Fill,
    Line,
    Circle,
    Symbol,
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerKind::Fill => write!(f, "fill"),
            LayerKind::Line => write!(f, "line"),
            LayerKind::Circle => write!(f, "circle"),
            LayerKind::Symbol => write!(f, "symbol"),
        }
    }
}

/// A style layer drawing one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: LayerKind,
    pub source: String,
    #[serde(default)]
    pub paint: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub layout: BTreeMap<String, serde_json::Value>,
}

impl LayerSpec {
    pub fn new(id: impl Into<String>, kind: LayerKind, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            source: source.into(),
            paint: BTreeMap::new(),
            layout: BTreeMap::new(),
        }
    }

    pub fn with_paint(mut self, property: impl Into<String>, value: serde_json::Value) -> Self {
        self.paint.insert(property.into(), value);
        self
    }

    pub fn with_layout(mut self, property: impl Into<String>, value: serde_json::Value) -> Self {
        self.layout.insert(property.into(), value);
        self
    }
}

/// Capability surface of the host map engine.
///
/// Mutating calls mirror the usual web-map rules: ids are unique, a layer
/// needs its source to exist, and a source cannot be removed while a layer
/// still draws it.
pub trait MapEngine: Send {
    fn add_source(&mut self, id: &str, source: SourceSpec) -> Result<()>;

    fn remove_source(&mut self, id: &str) -> Result<()>;

    fn has_source(&self, id: &str) -> bool;

    /// Adds `layer` directly below `before`, or on top of the stack if `None`.
    fn add_layer(&mut self, layer: LayerSpec, before: Option<&str>) -> Result<()>;

    fn remove_layer(&mut self, id: &str) -> Result<()>;

    fn has_layer(&self, id: &str) -> bool;

    /// Layer ids of the current style, bottom to top
    fn layer_ids(&self) -> Vec<String>;

    fn set_paint_property(
        &mut self,
        layer_id: &str,
        property: &str,
        value: serde_json::Value,
    ) -> Result<()>;

    /// Layout properties, e.g. `visibility` (`"visible"` or `"none"`)
    fn set_layout_property(
        &mut self,
        layer_id: &str,
        property: &str,
        value: serde_json::Value,
    ) -> Result<()>;

    /// Current bounds, center and zoom
    fn viewport(&self) -> ViewportState;
}
