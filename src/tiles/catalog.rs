//! Metadata catalog: the fixed table of tile footprints.
//!
//! The catalog is loaded once before the first visibility computation and
//! is read-only afterwards. It is shared as `Arc<MetadataCatalog>`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::fetcher::read_resource;
use super::source::TileSource;
use crate::core::geo::{BoundingBox, TileId};
use crate::spatial::index::{SpatialIndex, SpatialItem};
use crate::{Error, Result};

/// Top-level keys the tile generator may wrap the entry table in
const WRAPPER_KEYS: [&str; 2] = ["grids", "tiles"];

/// Footprint and extra fields of one tile
#[derive(Debug, Clone, PartialEq)]
pub struct TileMetadata {
    pub id: TileId,
    pub bounds: BoundingBox,
    /// Every field of the entry besides `bounds`, untouched
    pub properties: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBounds {
    Named {
        min_lat: f64,
        max_lat: f64,
        min_lon: f64,
        max_lon: f64,
    },
    /// GeoJSON bbox order: `[west, south, east, north]`
    Array([f64; 4]),
}

impl RawBounds {
    fn into_bounds(self) -> Result<BoundingBox> {
        match self {
            RawBounds::Named {
                min_lat,
                max_lat,
                min_lon,
                max_lon,
            } => BoundingBox::new(min_lat, max_lat, min_lon, max_lon),
            RawBounds::Array([min_lon, min_lat, max_lon, max_lat]) => {
                BoundingBox::new(min_lat, max_lat, min_lon, max_lon)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    bounds: RawBounds,
    #[serde(flatten)]
    properties: Map<String, Value>,
}

#[derive(Debug, Default)]
pub struct MetadataCatalog {
    entries: BTreeMap<TileId, TileMetadata>,
    index: SpatialIndex,
}

impl MetadataCatalog {
    /// Builds a catalog from already validated entries
    pub fn from_entries(entries: impl IntoIterator<Item = (TileId, BoundingBox)>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(id, bounds)| {
                let meta = TileMetadata {
                    id: id.clone(),
                    bounds,
                    properties: Map::new(),
                };
                (id, meta)
            })
            .collect();
        Self::with_index(entries)
    }

    fn with_index(entries: BTreeMap<TileId, TileMetadata>) -> Self {
        let items = entries
            .values()
            .map(|meta| SpatialItem::new(meta.id.clone(), meta.bounds))
            .collect();
        Self {
            index: SpatialIndex::bulk_load(items),
            entries,
        }
    }

    /// Parses a catalog document. Any malformed entry, or an id that cannot
    /// be used as a file name, rejects the whole document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(json)
            .map_err(|e| Error::CatalogLoad(format!("invalid metadata JSON: {e}")))?;
        let Value::Object(mut object) = root else {
            return Err(Error::CatalogLoad(
                "metadata document must be a JSON object".to_string(),
            ));
        };

        let wrapper = WRAPPER_KEYS.iter().find(|key| {
            matches!(object.get(**key), Some(Value::Object(inner)) if !inner.contains_key("bounds"))
        });
        let table = match wrapper {
            Some(key) => match object.remove(*key) {
                Some(Value::Object(inner)) => inner,
                _ => Map::new(),
            },
            None => object,
        };

        let mut entries = BTreeMap::new();
        for (raw_id, value) in table {
            let id = TileId::new(raw_id);
            if !id.is_path_safe() {
                return Err(Error::CatalogLoad(format!("tile id {:?} is not path safe", id.as_str())));
            }
            let raw: RawEntry = serde_json::from_value(value)
                .map_err(|e| Error::CatalogLoad(format!("tile '{id}': {e}")))?;
            let bounds = raw
                .bounds
                .into_bounds()
                .map_err(|e| Error::CatalogLoad(format!("tile '{id}': {e}")))?;
            entries.insert(
                id.clone(),
                TileMetadata {
                    id,
                    bounds,
                    properties: raw.properties,
                },
            );
        }

        log::info!("metadata catalog loaded with {} tiles", entries.len());
        Ok(Self::with_index(entries))
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::CatalogLoad(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    /// Fetches the catalog document named by `source`, over HTTP(S) or from
    /// disk depending on its location.
    pub async fn load(source: &dyn TileSource) -> Result<Self> {
        let location = source.metadata_url();
        log::debug!("loading metadata from {}", location);
        let bytes = read_resource(&location)
            .await
            .map_err(|e| Error::CatalogLoad(format!("{location}: {e}")))?;
        let text = String::from_utf8(bytes)
            .map_err(|e| Error::CatalogLoad(format!("{location}: {e}")))?;
        Self::from_json_str(&text)
    }

    pub fn get(&self, id: &TileId) -> Option<&TileMetadata> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &TileId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, sorted by id
    pub fn iter(&self) -> impl Iterator<Item = &TileMetadata> {
        self.entries.values()
    }

    /// Entries whose box overlaps `bounds`; touching edges count
    pub fn intersecting<'a>(
        &'a self,
        bounds: &BoundingBox,
    ) -> impl Iterator<Item = &'a TileMetadata> + 'a {
        self.index
            .query(bounds)
            .into_iter()
            .filter_map(move |item| self.entries.get(&item.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiles::source::BasePathSource;

    const DOC: &str = r#"{
        "grids": {
            "austin_1": { "bounds": { "min_lat": 30.0, "max_lat": 30.5, "min_lon": -98.0, "max_lon": -97.5 }, "count": 12 },
            "austin_2": { "bounds": [-97.5, 30.0, -97.0, 30.5] }
        },
        "version": 2
    }"#;

    #[test]
    fn parses_wrapped_document_with_both_bounds_shapes() {
        let catalog = MetadataCatalog::from_json_str(DOC).unwrap();
        assert_eq!(catalog.len(), 2);

        let first = catalog.get(&TileId::from("austin_1")).unwrap();
        assert_eq!(first.bounds.min_lon, -98.0);
        assert_eq!(first.properties["count"], 12);

        let second = catalog.get(&TileId::from("austin_2")).unwrap();
        assert_eq!(second.bounds.min_lat, 30.0);
        assert_eq!(second.bounds.max_lon, -97.0);
    }

    #[test]
    fn parses_flat_document() {
        let catalog = MetadataCatalog::from_json_str(
            r#"{"b": {"bounds": [0, 0, 1, 1]}, "a": {"bounds": [1, 0, 2, 1]}}"#,
        )
        .unwrap();
        let ids: Vec<_> = catalog.iter().map(|m| m.id.to_string()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn malformed_documents_are_rejected() {
        for doc in [
            "not json",
            "[1, 2, 3]",
            r#"{"a": {"count": 1}}"#,
            r#"{"a": {"bounds": {"min_lat": 2, "max_lat": 1, "min_lon": 0, "max_lon": 1}}}"#,
            r#"{"a": {"bounds": [0, 0, 1]}}"#,
            r#"{"../etc/passwd": {"bounds": [0, 0, 1, 1]}}"#,
            r#"{"tiles": {"a/b": {"bounds": [0, 0, 1, 1]}}}"#,
        ] {
            let err = MetadataCatalog::from_json_str(doc).unwrap_err();
            assert!(matches!(err, Error::CatalogLoad(_)), "{doc}: {err:?}");
        }
    }

    #[test]
    fn intersecting_includes_touching_tiles() {
        let catalog = MetadataCatalog::from_json_str(DOC).unwrap();
        let query = BoundingBox::new(30.5, 31.0, -98.0, -97.5).unwrap();
        let ids: Vec<_> = catalog.intersecting(&query).map(|m| m.id.to_string()).collect();
        assert!(ids.contains(&"austin_1".to_string()));
        assert!(ids.contains(&"austin_2".to_string()));

        let far = BoundingBox::new(40.0, 41.0, -80.0, -79.0).unwrap();
        assert_eq!(catalog.intersecting(&far).count(), 0);
    }

    #[tokio::test]
    async fn loads_from_disk_through_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("tiles")).unwrap();
        std::fs::write(dir.path().join("tiles/metadata.json"), DOC).unwrap();

        let source = BasePathSource::new(dir.path().to_string_lossy().to_string());
        let catalog = MetadataCatalog::load(&source).await.unwrap();
        assert!(catalog.contains(&TileId::from("austin_2")));

        let missing = BasePathSource::new(dir.path().join("nope").to_string_lossy().to_string());
        assert!(matches!(
            MetadataCatalog::load(&missing).await,
            Err(Error::CatalogLoad(_))
        ));
    }
}
