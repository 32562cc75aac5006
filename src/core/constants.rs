//! Engine-wide defaults for tile loading and naming.
//! Keeping them in a single place makes it easier to tweak the magic numbers.

/// Below this zoom level tiles are too small to be worth drawing individually.
pub const DEFAULT_ZOOM_THRESHOLD: f64 = 4.0;

/// Number of tile fetches dispatched together before waiting for the batch to settle.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// A tile load that has not settled after this long is abandoned.
pub const DEFAULT_LOAD_TIMEOUT_MS: u64 = 5_000;

/// Upper bound on any HTTP exchange of the shared client.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Quiet period after the last viewport event before reconciling.
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Payload format, used as the file extension of tile resources.
pub const DEFAULT_TILE_FORMAT: &str = "geojson";

/// Catalog document name, relative to `{base}/tiles/`.
pub const METADATA_FILE: &str = "metadata.json";

/// Prefix of every render source and layer owned by the tile loader.
pub const TILE_LAYER_PREFIX: &str = "heatmap-tile-";

/// Directory under the base path holding per-state neighborhood boundaries
pub const NEIGHBORHOOD_DIR: &str = "neighborhood-GeoJSON";

/// File name prefix of a state's boundaries: `{prefix}{STATE}.geojson`
pub const NEIGHBORHOOD_FILE_PREFIX: &str = "ZillowNeighborhoods-";

/// State whose neighborhoods are shown before the map has been moved
pub const DEFAULT_NEIGHBORHOOD_STATE: &str = "TX";

/// Layer ids containing one of these markers are overlays and stay above tiles.
pub const DEFAULT_OVERLAY_MARKERS: &[&str] = &[
    "city-fills",
    "neighborhood",
    "overlay",
    "annotation",
    "location",
    "label",
];
