pub mod catalog;
pub mod fetcher;
pub mod lifecycle;
pub mod render;
pub mod source;
pub mod visibility;

// Re-exports for convenience
pub use catalog::MetadataCatalog;
pub use fetcher::{FsTileFetcher, HttpTileFetcher, MemoryTileFetcher, TileFetcher, TilePayload};
pub use lifecycle::{TileLifecycleManager, TileStatus};
pub use source::{BasePathSource, TileSource};
pub use visibility::compute_visible_tiles;
