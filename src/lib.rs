//! # Heatlet
//!
//! Viewport-driven loading of precomputed heatmap tiles.
//!
//! A fixed metadata catalog describes which geographic cell every tile
//! covers. As the map moves, the dispatcher debounces viewport events, the
//! visibility evaluator works out which tiles intersect the view, and the
//! lifecycle manager fetches, registers and retires tile layers in the map
//! engine so that only visible tiles are rendered.

pub mod core;
pub mod data;
pub mod engine;
pub mod input;
pub mod overlays;
pub mod prelude;
pub mod spatial;
pub mod tiles;
pub use crate::core::constants;

use std::time::Duration;

// Re-export public API
pub use core::{
    config::TileLoadingConfig,
    geo::{BoundingBox, LatLng, TileId},
    viewport::ViewportState,
};

pub use engine::{memory::InMemoryEngine, LayerSpec, MapEngine, SourceSpec};

pub use input::{
    dispatcher::{DispatcherHandle, ViewportDispatcher},
    events::{ViewportEvent, ViewportEventKind},
};

pub use overlays::neighborhoods::{NeighborhoodLoader, StateCode};

pub use tiles::{
    catalog::MetadataCatalog,
    fetcher::{FsTileFetcher, HttpTileFetcher, MemoryTileFetcher, TileFetcher, TilePayload},
    lifecycle::{ReconcileReport, TileLifecycleManager, TileRecord, TileStatus},
    source::{BasePathSource, TileSource},
    visibility::compute_visible_tiles,
};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum HeatletError {
    /// The metadata catalog could not be fetched or is malformed. Fatal:
    /// without a catalog no tile can ever load.
    #[error("Catalog load error: {0}")]
    CatalogLoad(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Tile {tile} timed out after {after:?}")]
    Timeout { tile: TileId, after: Duration },

    #[error("Map engine error: {0}")]
    Engine(String),

    #[error("Invalid bounds: {0}")]
    InvalidBounds(String),

    #[error("Tile id {0:?} cannot name a resource")]
    InvalidTileId(String),

    #[error("Unknown state code {0:?}")]
    InvalidStateCode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Viewport dispatcher is no longer running")]
    DispatcherClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HeatletError {
    /// Whether this error is confined to a single tile. Tile-level errors
    /// leave the tile retryable on the next reconcile.
    pub fn is_tile_local(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::Parse(_)
                | Self::Timeout { .. }
                | Self::Engine(_)
                | Self::InvalidTileId(_)
        )
    }
}

impl From<reqwest::Error> for HeatletError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for HeatletError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Error type alias for convenience
pub type Error = HeatletError;
