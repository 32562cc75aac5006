//! Configuration for tile loading behaviour
//!
//! All knobs are plain overridable constants: pick a preset, tweak the
//! fields you care about, or deserialize a (possibly partial) JSON document.
//! Nothing here is negotiated at runtime.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_DEBOUNCE_MS, DEFAULT_LOAD_TIMEOUT_MS, DEFAULT_OVERLAY_MARKERS,
    DEFAULT_TILE_FORMAT, DEFAULT_ZOOM_THRESHOLD,
};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileLoadingConfig {
    /// Minimum zoom at which tiles are shown at all
    pub zoom_threshold: f64,
    /// Loads dispatched concurrently per batch
    pub batch_size: usize,
    pub load_timeout_ms: u64,
    pub debounce_ms: u64,
    /// Root under which `tiles/metadata.json` and `tiles/{id}.{format}` live.
    /// Either an http(s) URL or a filesystem path.
    pub base_path: String,
    pub tile_format: String,
    /// Layer ids containing any of these are kept above heatmap tiles
    pub overlay_markers: Vec<String>,
}

impl TileLoadingConfig {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    /// Hard deadline of a single fetch. A load times out after
    /// `load_timeout`; its fetch is abandoned once this has passed too.
    pub fn request_timeout(&self) -> Duration {
        self.load_timeout() * 2
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    /// Short debounce and timeout for fast connections
    pub fn responsive() -> Self {
        Self {
            batch_size: 16,
            load_timeout_ms: 3_000,
            debounce_ms: 50,
            ..Self::default()
        }
    }

    /// Fewer concurrent requests and a longer deadline
    pub fn low_bandwidth() -> Self {
        Self {
            batch_size: 4,
            load_timeout_ms: 10_000,
            debounce_ms: 250,
            ..Self::default()
        }
    }

    pub fn for_testing() -> Self {
        Self {
            zoom_threshold: 5.0,
            batch_size: 10,
            load_timeout_ms: 5_000,
            debounce_ms: 100,
            base_path: String::new(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".into()));
        }
        if self.load_timeout_ms == 0 {
            return Err(Error::Config("load_timeout_ms must be positive".into()));
        }
        if !self.zoom_threshold.is_finite() {
            return Err(Error::Config("zoom_threshold must be finite".into()));
        }
        if self.tile_format.is_empty() {
            return Err(Error::Config("tile_format must not be empty".into()));
        }
        Ok(())
    }

    /// Parses a JSON document; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

impl Default for TileLoadingConfig {
    fn default() -> Self {
        Self {
            zoom_threshold: DEFAULT_ZOOM_THRESHOLD,
            batch_size: DEFAULT_BATCH_SIZE,
            load_timeout_ms: DEFAULT_LOAD_TIMEOUT_MS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            base_path: "data".to_string(),
            tile_format: DEFAULT_TILE_FORMAT.to_string(),
            overlay_markers: DEFAULT_OVERLAY_MARKERS.iter().map(|m| m.to_string()).collect(),
        }
    }
}
