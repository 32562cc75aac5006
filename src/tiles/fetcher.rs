use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use tokio::time::Instant;

use super::source::{is_remote_location, TileSource};
use crate::core::config::TileLoadingConfig;
use crate::core::constants::HTTP_TIMEOUT_SECS;
use crate::core::geo::TileId;
use crate::data::geojson::FeatureCollection;
use crate::prelude::HashMap;
use crate::{Error, Result};

/// Shared async HTTP client. Building the client once avoids the cost of
/// TLS and connection pool setup for every tile.
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(concat!("heatlet/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(10))
        .tcp_keepalive(Duration::from_secs(30))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(16)
        .build()
        .expect("failed to build reqwest async client")
});

/// Reads a resource over HTTP(S) or from the local filesystem.
pub(crate) async fn read_resource(location: &str) -> Result<Vec<u8>> {
    if is_remote_location(location) {
        let response = HTTP_CLIENT.get(location).send().await?;
        if !response.status().is_success() {
            return Err(Error::Network(format!("HTTP {} for {}", response.status(), location)));
        }
        Ok(response.bytes().await?.to_vec())
    } else {
        tokio::fs::read(location)
            .await
            .map_err(|e| Error::Network(format!("{location}: {e}")))
    }
}

/// Decoded geometry of one tile, ready to be handed to the map engine
#[derive(Debug, Clone, PartialEq)]
pub struct TilePayload {
    pub id: TileId,
    pub data: FeatureCollection,
}

impl TilePayload {
    pub fn new(id: TileId, data: FeatureCollection) -> Self {
        Self { id, data }
    }

    pub fn from_slice(id: TileId, bytes: &[u8]) -> Result<Self> {
        let data = FeatureCollection::from_slice(bytes)
            .map_err(|e| Error::Parse(format!("tile {id}: {e}")))?;
        Ok(Self { id, data })
    }
}

/// Location of the payload for `id`, refusing ids that could escape the
/// tiles directory or break the URL
fn tile_location(source: &dyn TileSource, id: &TileId) -> Result<String> {
    if !id.is_path_safe() {
        return Err(Error::InvalidTileId(id.to_string()));
    }
    Ok(source.tile_url(id))
}

/// Retrieves tile payloads.
///
/// Implementations only perform I/O and decoding; registering the result
/// with the map engine is left to the lifecycle manager so that a response
/// for a tile that is no longer wanted never reaches the screen.
#[async_trait]
pub trait TileFetcher: Send + Sync {
    /// Fails with [`Error::Network`] or [`Error::Parse`].
    async fn fetch(&self, id: &TileId) -> Result<TilePayload>;
}

/// Fetches `{base}/tiles/{id}.{format}` over HTTP(S).
///
/// Each request carries its own deadline, so an abandoned load never keeps
/// a connection open indefinitely.
pub struct HttpTileFetcher {
    source: Box<dyn TileSource>,
    request_timeout: Duration,
}

impl HttpTileFetcher {
    pub fn new(source: impl TileSource + 'static) -> Self {
        Self::from_config(source, &TileLoadingConfig::default())
    }

    pub fn from_config(source: impl TileSource + 'static, config: &TileLoadingConfig) -> Self {
        Self {
            source: Box::new(source),
            request_timeout: config.request_timeout(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[async_trait]
impl TileFetcher for HttpTileFetcher {
    async fn fetch(&self, id: &TileId) -> Result<TilePayload> {
        let url = tile_location(self.source.as_ref(), id)?;
        log::debug!("fetch tile {} from {}", id, url);

        let response = HTTP_CLIENT
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::Network(format!("HTTP {} for tile {}", response.status(), id)));
        }
        let bytes = response.bytes().await?;
        TilePayload::from_slice(id.clone(), &bytes)
    }
}

/// Reads tile payloads from a local directory tree
pub struct FsTileFetcher {
    source: Box<dyn TileSource>,
}

impl FsTileFetcher {
    pub fn new(source: impl TileSource + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }
}

#[async_trait]
impl TileFetcher for FsTileFetcher {
    async fn fetch(&self, id: &TileId) -> Result<TilePayload> {
        let path = tile_location(self.source.as_ref(), id)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::Network(format!("tile {id} at {path}: {e}")))?;
        TilePayload::from_slice(id.clone(), &bytes)
    }
}

#[derive(Debug, Clone)]
enum Scripted {
    Payload(Vec<u8>),
    Failure(String),
}

#[derive(Debug, Default)]
struct MemoryState {
    tiles: HashMap<TileId, Scripted>,
    delays: HashMap<TileId, Duration>,
    default_delay: Duration,
    fetch_counts: HashMap<TileId, usize>,
    started: Vec<(TileId, Instant)>,
}

/// In-memory tile store with scripted latency and failures.
///
/// Serves preloaded payloads without touching the network, and records
/// every fetch so callers can check how often and when each tile was
/// requested.
#[derive(Debug, Default)]
pub struct MemoryTileFetcher {
    state: Mutex<MemoryState>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryTileFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, id: impl Into<TileId>, data: &FeatureCollection) -> Result<()> {
        let bytes = serde_json::to_vec(data)?;
        self.insert_raw(id, bytes);
        Ok(())
    }

    /// Stores raw bytes; invalid payloads surface as parse errors on fetch
    pub fn insert_raw(&self, id: impl Into<TileId>, bytes: impl Into<Vec<u8>>) {
        self.state()
            .tiles
            .insert(id.into(), Scripted::Payload(bytes.into()));
    }

    /// Makes every fetch of `id` fail with a network error
    pub fn fail(&self, id: impl Into<TileId>, message: impl Into<String>) {
        self.state()
            .tiles
            .insert(id.into(), Scripted::Failure(message.into()));
    }

    pub fn set_delay(&self, id: impl Into<TileId>, delay: Duration) {
        self.state().delays.insert(id.into(), delay);
    }

    pub fn set_default_delay(&self, delay: Duration) {
        self.state().default_delay = delay;
    }

    pub fn fetch_count(&self, id: &TileId) -> usize {
        self.state().fetch_counts.get(id).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.state().fetch_counts.values().sum()
    }

    /// Every fetch in start order with the instant it started
    pub fn started(&self) -> Vec<(TileId, Instant)> {
        self.state().started.clone()
    }

    /// Fetches pending right now
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of fetches that were pending at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TileFetcher for MemoryTileFetcher {
    async fn fetch(&self, id: &TileId) -> Result<TilePayload> {
        let (scripted, delay) = {
            let mut state = self.state();
            *state.fetch_counts.entry(id.clone()).or_insert(0) += 1;
            state.started.push((id.clone(), Instant::now()));
            let delay = state.delays.get(id).copied().unwrap_or(state.default_delay);
            (state.tiles.get(id).cloned(), delay)
        };

        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match scripted {
            Some(Scripted::Payload(bytes)) => TilePayload::from_slice(id.clone(), &bytes),
            Some(Scripted::Failure(message)) => Err(Error::Network(message)),
            None => Err(Error::Network(format!("no such tile: {id}"))),
        }
    }
}
