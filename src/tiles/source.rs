use crate::core::config::TileLoadingConfig;
use crate::core::constants::{
    DEFAULT_TILE_FORMAT, METADATA_FILE, NEIGHBORHOOD_DIR, NEIGHBORHOOD_FILE_PREFIX,
};
use crate::core::geo::TileId;

/// Trait representing anything that can name the resources of a tile set.
pub trait TileSource: Send + Sync {
    /// Location of the payload for `id`.
    fn tile_url(&self, id: &TileId) -> String;

    /// Location of the metadata catalog document.
    fn metadata_url(&self) -> String;
}

/// Resources laid out under one base path:
/// `{base}/tiles/metadata.json` and `{base}/tiles/{id}.{format}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasePathSource {
    base: String,
    format: String,
}

impl BasePathSource {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
            format: DEFAULT_TILE_FORMAT.to_string(),
        }
    }

    pub fn from_config(config: &TileLoadingConfig) -> Self {
        Self::new(config.base_path.clone()).with_format(config.tile_format.clone())
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Whether resources are fetched over HTTP rather than read from disk
    pub fn is_remote(&self) -> bool {
        is_remote_location(&self.base)
    }

    /// Boundary document of one state:
    /// `{base}/neighborhood-GeoJSON/ZillowNeighborhoods-{state}.geojson`
    pub fn neighborhood_url(&self, state: &str) -> String {
        format!(
            "{}/{NEIGHBORHOOD_FILE_PREFIX}{state}.geojson",
            self.dir(NEIGHBORHOOD_DIR)
        )
    }

    fn dir(&self, name: &str) -> String {
        if self.base.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.base, name)
        }
    }

    fn tiles_dir(&self) -> String {
        self.dir("tiles")
    }
}

impl Default for BasePathSource {
    fn default() -> Self {
        Self::from_config(&TileLoadingConfig::default())
    }
}

impl TileSource for BasePathSource {
    fn tile_url(&self, id: &TileId) -> String {
        format!("{}/{}.{}", self.tiles_dir(), id, self.format)
    }

    fn metadata_url(&self) -> String {
        format!("{}/{}", self.tiles_dir(), METADATA_FILE)
    }
}

pub(crate) fn is_remote_location(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}
