pub mod geojson;

pub use geojson::{FeatureCollection, GeoJsonFeature, GeoJsonGeometry, Position};
