//! Prelude module for common heatlet types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use heatlet::prelude::*;`

pub use crate::core::{
    config::TileLoadingConfig,
    geo::{BoundingBox, LatLng, TileId},
    viewport::ViewportState,
};

pub use crate::data::geojson::{FeatureCollection, GeoJsonFeature, GeoJsonGeometry, Position};

pub use crate::engine::{
    memory::{EngineOp, InMemoryEngine},
    LayerKind, LayerSpec, MapEngine, SourceSpec,
};

pub use crate::input::{
    dispatcher::{DebounceTimer, DispatcherHandle, DispatcherSnapshot, ViewportDispatcher},
    events::{ViewportEvent, ViewportEventKind},
};

pub use crate::overlays::neighborhoods::{NeighborhoodLoader, StateCode};

pub use crate::spatial::index::{SpatialIndex, SpatialItem};

pub use crate::tiles::{
    catalog::{MetadataCatalog, TileMetadata},
    fetcher::{FsTileFetcher, HttpTileFetcher, MemoryTileFetcher, TileFetcher, TilePayload},
    lifecycle::{LoadOutcome, LoadStats, ReconcileReport, TileLifecycleManager, TileRecord, TileStatus},
    render::{is_tile_layer, layer_name, source_name, TileStyle},
    source::{BasePathSource, TileSource},
    visibility::compute_visible_tiles,
};

pub use crate::{Error as HeatletError, Result};

pub use std::{
    sync::Arc,
    time::Duration,
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet, FxHasher};
