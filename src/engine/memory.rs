use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::core::viewport::ViewportState;
use crate::engine::{LayerSpec, MapEngine, SourceSpec};
use crate::prelude::HashMap;
use crate::{Error, Result};

/// One mutation applied to an [`InMemoryEngine`], in call order
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOp {
    AddSource(String),
    RemoveSource(String),
    AddLayer { id: String, before: Option<String> },
    RemoveLayer(String),
    SetPaint { layer: String, property: String },
    SetLayout { layer: String, property: String },
}

#[derive(Debug)]
struct Registry {
    sources: HashMap<String, SourceSpec>,
    /// Layers bottom to top
    layers: Vec<LayerSpec>,
    viewport: ViewportState,
    ops: Vec<EngineOp>,
}

/// Headless map engine.
///
/// Keeps a source registry and an ordered layer stack and enforces the same
/// rules a browser map engine does, so the loader can run in tests, on a
/// server or from the command line. Clones share the same registry.
#[derive(Debug, Clone)]
pub struct InMemoryEngine {
    inner: Arc<Mutex<Registry>>,
}

impl InMemoryEngine {
    pub fn new(viewport: ViewportState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                sources: HashMap::default(),
                layers: Vec::new(),
                viewport,
                ops: Vec::new(),
            })),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves the camera. Callers forward the matching event to the dispatcher.
    pub fn set_viewport(&self, viewport: ViewportState) {
        self.registry().viewport = viewport;
    }

    pub fn layer(&self, id: &str) -> Option<LayerSpec> {
        self.registry().layers.iter().find(|l| l.id == id).cloned()
    }

    pub fn source(&self, id: &str) -> Option<SourceSpec> {
        self.registry().sources.get(id).cloned()
    }

    pub fn source_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.registry().sources.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drains the mutation log
    pub fn take_ops(&self) -> Vec<EngineOp> {
        std::mem::take(&mut self.registry().ops)
    }
}

impl MapEngine for InMemoryEngine {
    fn add_source(&mut self, id: &str, source: SourceSpec) -> Result<()> {
        let mut registry = self.registry();
        if registry.sources.contains_key(id) {
            return Err(Error::Engine(format!("source '{id}' already exists")));
        }
        registry.sources.insert(id.to_string(), source);
        registry.ops.push(EngineOp::AddSource(id.to_string()));
        Ok(())
    }

    fn remove_source(&mut self, id: &str) -> Result<()> {
        let mut registry = self.registry();
        if let Some(layer) = registry.layers.iter().find(|l| l.source == id) {
            return Err(Error::Engine(format!(
                "source '{id}' is still used by layer '{}'",
                layer.id
            )));
        }
        if registry.sources.remove(id).is_none() {
            return Err(Error::Engine(format!("source '{id}' does not exist")));
        }
        registry.ops.push(EngineOp::RemoveSource(id.to_string()));
        Ok(())
    }

    fn has_source(&self, id: &str) -> bool {
        self.registry().sources.contains_key(id)
    }

    fn add_layer(&mut self, layer: LayerSpec, before: Option<&str>) -> Result<()> {
        let mut registry = self.registry();
        if registry.layers.iter().any(|l| l.id == layer.id) {
            return Err(Error::Engine(format!("layer '{}' already exists", layer.id)));
        }
        if !registry.sources.contains_key(&layer.source) {
            return Err(Error::Engine(format!(
                "layer '{}' references missing source '{}'",
                layer.id, layer.source
            )));
        }

        let insert_pos = match before {
            Some(before_id) => registry
                .layers
                .iter()
                .position(|l| l.id == before_id)
                .ok_or_else(|| Error::Engine(format!("before-layer '{before_id}' does not exist")))?,
            None => registry.layers.len(),
        };

        registry.ops.push(EngineOp::AddLayer {
            id: layer.id.clone(),
            before: before.map(str::to_string),
        });
        registry.layers.insert(insert_pos, layer);
        Ok(())
    }

    fn remove_layer(&mut self, id: &str) -> Result<()> {
        let mut registry = self.registry();
        let pos = registry
            .layers
            .iter()
            .position(|l| l.id == id)
            .ok_or_else(|| Error::Engine(format!("layer '{id}' does not exist")))?;
        registry.layers.remove(pos);
        registry.ops.push(EngineOp::RemoveLayer(id.to_string()));
        Ok(())
    }

    fn has_layer(&self, id: &str) -> bool {
        self.registry().layers.iter().any(|l| l.id == id)
    }

    fn layer_ids(&self) -> Vec<String> {
        self.registry().layers.iter().map(|l| l.id.clone()).collect()
    }

    fn set_paint_property(
        &mut self,
        layer_id: &str,
        property: &str,
        value: serde_json::Value,
    ) -> Result<()> {
        let mut registry = self.registry();
        let layer = registry
            .layers
            .iter_mut()
            .find(|l| l.id == layer_id)
            .ok_or_else(|| Error::Engine(format!("layer '{layer_id}' does not exist")))?;
        layer.paint.insert(property.to_string(), value);
        registry.ops.push(EngineOp::SetPaint {
            layer: layer_id.to_string(),
            property: property.to_string(),
        });
        Ok(())
    }

    fn set_layout_property(
        &mut self,
        layer_id: &str,
        property: &str,
        value: serde_json::Value,
    ) -> Result<()> {
        let mut registry = self.registry();
        let layer = registry
            .layers
            .iter_mut()
            .find(|l| l.id == layer_id)
            .ok_or_else(|| Error::Engine(format!("layer '{layer_id}' does not exist")))?;
        layer.layout.insert(property.to_string(), value);
        registry.ops.push(EngineOp::SetLayout {
            layer: layer_id.to_string(),
            property: property.to_string(),
        });
        Ok(())
    }

    fn viewport(&self) -> ViewportState {
        self.registry().viewport
    }
}
