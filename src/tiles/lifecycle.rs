//! Tile lifecycle management.
//!
//! [`TileLifecycleManager`] owns one [`TileRecord`] per referenced tile and
//! converges the set of rendered tiles towards the desired set computed by
//! the visibility evaluator. Unloads are applied synchronously. Loads are
//! queued and dispatched in batches onto the tokio runtime; their outcomes
//! come back over a channel and are only committed to the map engine after
//! re-checking that the tile is still wanted.
//!
//! Every method takes `&mut self`, so a single owner (normally the
//! viewport dispatcher task) serialises all state changes.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::time::Instant;

use super::fetcher::{TileFetcher, TilePayload};
use super::render::{layer_name, unregister_tile, TileStyle};
use crate::core::config::TileLoadingConfig;
use crate::core::geo::TileId;
use crate::engine::MapEngine;
use crate::prelude::{HashMap, HashSet};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileStatus {
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

/// Bookkeeping for one tile
#[derive(Debug, Clone, PartialEq)]
pub struct TileRecord {
    pub id: TileId,
    pub status: TileStatus,
    /// Set while the tile is loading
    pub load_started_at: Option<Instant>,
    pub attempts: u32,
    pub last_error: Option<String>,
    ticket: u64,
}

impl TileRecord {
    fn new(id: TileId) -> Self {
        Self {
            id,
            status: TileStatus::Unloaded,
            load_started_at: None,
            attempts: 0,
            last_error: None,
            ticket: 0,
        }
    }
}

/// Result of one load attempt, tagged with the attempt it belongs to
#[derive(Debug)]
pub struct LoadOutcome {
    pub id: TileId,
    pub result: Result<TilePayload>,
    ticket: u64,
}

/// Counters over the lifetime of a manager
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub reconciles: u64,
    pub batches_dispatched: u64,
    pub loads_started: u64,
    pub loads_committed: u64,
    pub loads_failed: u64,
    pub loads_timed_out: u64,
    /// Payloads dropped because the tile was no longer wanted or the attempt
    /// had been superseded
    pub loads_discarded: u64,
    pub unloads: u64,
}

/// What a single [`TileLifecycleManager::reconcile`] call did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub unloaded: Vec<TileId>,
    /// Tiles waiting to load, nearest first
    pub queued: Vec<TileId>,
    /// Desired tiles left alone because a load is already in flight
    pub skipped_in_flight: Vec<TileId>,
    /// Loads abandoned for exceeding the load timeout
    pub expired: Vec<TileId>,
    /// Loads started by this call
    pub dispatched: usize,
}

impl ReconcileReport {
    /// True when the call changed nothing
    pub fn is_noop(&self) -> bool {
        self.unloaded.is_empty() && self.queued.is_empty() && self.expired.is_empty()
    }
}

pub struct TileLifecycleManager<E: MapEngine> {
    engine: E,
    fetcher: Arc<dyn TileFetcher>,
    style: TileStyle,
    batch_size: usize,
    load_timeout: Duration,
    /// A fetch still running this long after it started is aborted
    abandon_after: Duration,

    records: HashMap<TileId, TileRecord>,
    desired: HashSet<TileId>,
    /// Loads not yet dispatched, nearest first
    queue: VecDeque<TileId>,
    /// The running batch: tile -> ticket of its attempt
    in_flight: HashMap<TileId, u64>,
    /// Tickets expired by a reconcile whose own timeout outcome is still
    /// to arrive
    expired_tickets: HashSet<u64>,
    next_ticket: u64,

    outcome_tx: mpsc::UnboundedSender<LoadOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<LoadOutcome>,
    stats: LoadStats,
}

impl<E: MapEngine> TileLifecycleManager<E> {
    pub fn new(engine: E, fetcher: Arc<dyn TileFetcher>, config: &TileLoadingConfig) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Self {
            engine,
            fetcher,
            style: TileStyle::from_config(config),
            batch_size: config.batch_size.max(1),
            load_timeout: config.load_timeout(),
            abandon_after: config.request_timeout(),
            records: HashMap::default(),
            desired: HashSet::default(),
            queue: VecDeque::new(),
            in_flight: HashMap::default(),
            expired_tickets: HashSet::default(),
            next_ticket: 0,
            outcome_tx,
            outcome_rx,
            stats: LoadStats::default(),
        }
    }

    /// Converges the rendered tiles towards `desired` (nearest first).
    ///
    /// Tiles no longer desired are unloaded before this returns. Missing
    /// tiles replace any queue left by an earlier call and are dispatched in
    /// batches once the running batch, if any, has settled. Must be called
    /// from within a tokio runtime.
    pub fn reconcile(&mut self, desired: &[TileId]) -> ReconcileReport {
        self.reconcile_at(desired, Instant::now())
    }

    fn reconcile_at(&mut self, desired: &[TileId], now: Instant) -> ReconcileReport {
        self.stats.reconciles += 1;

        let mut wanted = HashSet::default();
        let ordered: Vec<TileId> = desired
            .iter()
            .filter(|id| wanted.insert((*id).clone()))
            .cloned()
            .collect();
        self.desired = wanted;

        self.drain_settled();
        let expired = self.expire_overdue(now);

        let mut to_unload: Vec<TileId> = self
            .records
            .values()
            .filter(|r| r.status == TileStatus::Loaded && !self.desired.contains(&r.id))
            .map(|r| r.id.clone())
            .collect();
        to_unload.sort();
        let unloaded: Vec<TileId> = to_unload
            .into_iter()
            .filter(|id| self.unload_tile(id))
            .collect();

        let mut skipped_in_flight = Vec::new();
        let mut queued = Vec::new();
        for id in ordered {
            match self.status(&id) {
                Some(TileStatus::Loaded) => {}
                Some(TileStatus::Loading) => skipped_in_flight.push(id),
                _ => queued.push(id),
            }
        }
        if !self.queue.is_empty() {
            log::debug!("superseding {} queued loads", self.queue.len());
        }
        self.queue = queued.iter().cloned().collect();
        self.prune_records();

        let started_before = self.stats.loads_started;
        self.dispatch_if_ready();
        let dispatched = (self.stats.loads_started - started_before) as usize;

        let report = ReconcileReport {
            unloaded,
            queued,
            skipped_in_flight,
            expired,
            dispatched,
        };
        log::info!(
            "reconcile: {} desired, {} unloaded, {} queued, {} in flight, {} expired",
            self.desired.len(),
            report.unloaded.len(),
            report.queued.len(),
            report.skipped_in_flight.len(),
            report.expired.len()
        );
        report
    }

    /// Commits or discards one load outcome, then starts the next batch if
    /// the running one has fully settled.
    pub fn apply_outcome(&mut self, outcome: LoadOutcome) {
        self.settle_outcome(outcome);
        self.dispatch_if_ready();
    }

    /// Waits for the next load outcome. Pair with [`Self::apply_outcome`].
    pub async fn next_outcome(&mut self) -> Option<LoadOutcome> {
        self.outcome_rx.recv().await
    }

    /// Drives outcomes until no batch is running and nothing is queued
    pub async fn settle(&mut self) {
        while !self.in_flight.is_empty() {
            match self.outcome_rx.recv().await {
                Some(outcome) => self.apply_outcome(outcome),
                None => break,
            }
        }
    }

    /// Unloads every loaded tile and forgets everything queued
    pub fn unload_all(&mut self) -> Vec<TileId> {
        self.desired.clear();
        self.queue.clear();
        let mut loaded = self.loaded_tiles();
        loaded.retain(|id| self.unload_tile(id));
        loaded
    }

    /// Sets a paint property on every loaded tile layer and on all tiles
    /// loaded afterwards. Returns the number of layers updated.
    pub fn set_paint_property(&mut self, property: &str, value: Value) -> Result<usize> {
        self.style.set_paint(property, value.clone());

        let mut updated = 0;
        let mut first_error = None;
        for id in self.loaded_tiles() {
            match self
                .engine
                .set_paint_property(&layer_name(&id), property, value.clone())
            {
                Ok(()) => updated += 1,
                Err(err) => {
                    log::error!("could not set {} on tile {}: {}", property, id, err);
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) if updated == 0 => Err(err),
            _ => Ok(updated),
        }
    }

    pub fn status(&self, id: &TileId) -> Option<TileStatus> {
        self.records.get(id).map(|r| r.status)
    }

    pub fn record(&self, id: &TileId) -> Option<&TileRecord> {
        self.records.get(id)
    }

    pub fn loaded_tiles(&self) -> Vec<TileId> {
        self.tiles_with(TileStatus::Loaded)
    }

    pub fn loading_tiles(&self) -> Vec<TileId> {
        self.tiles_with(TileStatus::Loading)
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// No load running and none queued
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty() && self.queue.is_empty()
    }

    pub fn stats(&self) -> &LoadStats {
        &self.stats
    }

    fn tiles_with(&self, status: TileStatus) -> Vec<TileId> {
        let mut ids: Vec<TileId> = self
            .records
            .values()
            .filter(|r| r.status == status)
            .map(|r| r.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Applies outcomes that already arrived, without dispatching
    fn drain_settled(&mut self) {
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            self.settle_outcome(outcome);
        }
    }

    fn expire_overdue(&mut self, now: Instant) -> Vec<TileId> {
        let timeout = self.load_timeout;
        let mut expired = Vec::new();
        for record in self.records.values_mut() {
            let overdue = matches!(
                record.load_started_at,
                Some(started) if record.status == TileStatus::Loading
                    && now.saturating_duration_since(started) >= timeout
            );
            if overdue {
                log::warn!("tile {} exceeded load timeout of {:?}", record.id, timeout);
                record.status = TileStatus::Unloaded;
                record.load_started_at = None;
                record.last_error = Some(
                    Error::Timeout {
                        tile: record.id.clone(),
                        after: timeout,
                    }
                    .to_string(),
                );
                expired.push((record.id.clone(), record.ticket));
            }
        }
        for (id, ticket) in &expired {
            self.in_flight.remove(id);
            self.expired_tickets.insert(*ticket);
        }
        let mut expired: Vec<TileId> = expired.into_iter().map(|(id, _)| id).collect();
        self.stats.loads_timed_out += expired.len() as u64;
        expired.sort();
        expired
    }

    /// Returns false, keeping the tile loaded, if the engine refused
    fn unload_tile(&mut self, id: &TileId) -> bool {
        if let Err(err) = unregister_tile(&mut self.engine, id) {
            log::error!("failed to unload tile {}: {}", id, err);
            return false;
        }
        if let Some(record) = self.records.get_mut(id) {
            record.status = TileStatus::Unloaded;
            record.load_started_at = None;
        }
        self.stats.unloads += 1;
        log::debug!("unloaded tile {}", id);
        true
    }

    fn prune_records(&mut self) {
        let desired = &self.desired;
        self.records.retain(|id, record| {
            desired.contains(id)
                || matches!(record.status, TileStatus::Loading | TileStatus::Loaded)
        });
    }

    fn settle_outcome(&mut self, outcome: LoadOutcome) {
        let LoadOutcome { id, result, ticket } = outcome;
        if self.in_flight.get(&id) == Some(&ticket) {
            self.in_flight.remove(&id);
        }

        if self.expired_tickets.remove(&ticket) {
            if matches!(result, Err(Error::Timeout { .. })) {
                // Already counted when the reconcile expired it
                log::debug!("timeout of expired load of tile {} arrived", id);
                return;
            }
            // Finished without reporting a timeout; nothing else follows
            log::debug!("discarding result of expired load of tile {}", id);
            self.stats.loads_discarded += 1;
            return;
        }

        let current = matches!(
            self.records.get(&id),
            Some(r) if r.status == TileStatus::Loading && r.ticket == ticket
        );
        if !current {
            log::debug!("discarding superseded result for tile {}", id);
            self.stats.loads_discarded += 1;
            return;
        }

        let (status, error) = match result {
            Ok(payload) if self.desired.contains(&id) => {
                match self.style.register_tile(&mut self.engine, payload) {
                    Ok(()) => {
                        self.stats.loads_committed += 1;
                        log::debug!("loaded tile {}", id);
                        (TileStatus::Loaded, None)
                    }
                    Err(err) => {
                        log::warn!("tile {} could not be registered: {}", id, err);
                        self.stats.loads_failed += 1;
                        (TileStatus::Failed, Some(err.to_string()))
                    }
                }
            }
            Ok(_) => {
                log::debug!("tile {} no longer visible, dropping payload", id);
                self.stats.loads_discarded += 1;
                (TileStatus::Unloaded, None)
            }
            Err(err @ Error::Timeout { .. }) => {
                log::warn!("{}", err);
                self.stats.loads_timed_out += 1;
                (TileStatus::Unloaded, Some(err.to_string()))
            }
            Err(err) => {
                log::warn!("tile {} failed to load: {}", id, err);
                self.stats.loads_failed += 1;
                (TileStatus::Failed, Some(err.to_string()))
            }
        };

        if let Some(record) = self.records.get_mut(&id) {
            record.status = status;
            record.load_started_at = None;
            if error.is_some() || status == TileStatus::Loaded {
                record.last_error = error;
            }
        }
    }

    fn dispatch_if_ready(&mut self) {
        if !self.in_flight.is_empty() {
            return;
        }

        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            let Some(id) = self.queue.pop_front() else {
                break;
            };
            let ready = self.desired.contains(&id)
                && !matches!(
                    self.status(&id),
                    Some(TileStatus::Loading | TileStatus::Loaded)
                );
            if ready {
                batch.push(id);
            }
        }
        if batch.is_empty() {
            return;
        }

        self.stats.batches_dispatched += 1;
        log::info!(
            "dispatching batch of {} tiles ({} still queued)",
            batch.len(),
            self.queue.len()
        );
        for id in batch {
            self.start_load(id);
        }
    }

    fn start_load(&mut self, id: TileId) {
        self.next_ticket += 1;
        let ticket = self.next_ticket;

        let record = self
            .records
            .entry(id.clone())
            .or_insert_with(|| TileRecord::new(id.clone()));
        record.status = TileStatus::Loading;
        record.load_started_at = Some(Instant::now());
        record.attempts += 1;
        record.ticket = ticket;

        self.in_flight.insert(id.clone(), ticket);
        self.stats.loads_started += 1;
        log::debug!("loading tile {} (attempt {})", id, record.attempts);

        spawn_load(
            Arc::clone(&self.fetcher),
            id,
            ticket,
            self.load_timeout,
            self.abandon_after,
            self.outcome_tx.clone(),
        );
    }
}

/// Runs one fetch under the load deadline.
///
/// On timeout a [`Error::Timeout`] outcome is reported and the fetch is left
/// running until `abandon_after`; a late result is reported under the same
/// ticket so the manager can discard it. A fetch still running after that
/// is aborted and reports nothing more.
fn spawn_load(
    fetcher: Arc<dyn TileFetcher>,
    id: TileId,
    ticket: u64,
    timeout: Duration,
    abandon_after: Duration,
    outcomes: mpsc::UnboundedSender<LoadOutcome>,
) {
    tokio::spawn(async move {
        let fetch_id = id.clone();
        let mut fetch = tokio::spawn(async move { fetcher.fetch(&fetch_id).await });

        let result = match tokio::time::timeout(timeout, &mut fetch).await {
            Ok(joined) => flatten_join(joined, &id),
            Err(_) => {
                let timed_out = LoadOutcome {
                    id: id.clone(),
                    result: Err(Error::Timeout {
                        tile: id.clone(),
                        after: timeout,
                    }),
                    ticket,
                };
                if outcomes.send(timed_out).is_err() {
                    fetch.abort();
                    return;
                }
                let grace = abandon_after.saturating_sub(timeout);
                match tokio::time::timeout(grace, &mut fetch).await {
                    Ok(joined) => flatten_join(joined, &id),
                    Err(_) => {
                        log::warn!("abandoning fetch of tile {} after {:?}", id, abandon_after);
                        fetch.abort();
                        return;
                    }
                }
            }
        };

        // The manager may be gone already
        let _ = outcomes.send(LoadOutcome { id, result, ticket });
    });
}

fn flatten_join(
    joined: std::result::Result<Result<TilePayload>, JoinError>,
    id: &TileId,
) -> Result<TilePayload> {
    joined.unwrap_or_else(|err| Err(Error::Network(format!("fetch task for {id} failed: {err}"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::LatLng;
    use crate::core::viewport::ViewportState;
    use crate::data::geojson::FeatureCollection;
    use crate::engine::memory::{EngineOp, InMemoryEngine};
    use crate::tiles::fetcher::MemoryTileFetcher;
    use crate::tiles::render::source_name;

    fn ids(names: &[&str]) -> Vec<TileId> {
        names.iter().map(|n| TileId::from(*n)).collect()
    }

    fn setup(names: &[&str]) -> (TileLifecycleManager<InMemoryEngine>, InMemoryEngine, Arc<MemoryTileFetcher>) {
        let engine = InMemoryEngine::new(
            ViewportState::from_center_span(LatLng::new(0.0, 0.0), 2.0, 2.0, 8.0).unwrap(),
        );
        let fetcher = Arc::new(MemoryTileFetcher::new());
        for name in names {
            fetcher.insert(*name, &FeatureCollection::new(Vec::new())).unwrap();
        }
        let manager = TileLifecycleManager::new(
            engine.clone(),
            fetcher.clone(),
            &TileLoadingConfig::for_testing(),
        );
        (manager, engine, fetcher)
    }

    #[tokio::test(start_paused = true)]
    async fn loads_then_unloads_on_empty_desired() {
        let (mut manager, engine, _) = setup(&["a", "b"]);

        let report = manager.reconcile(&ids(&["a", "b"]));
        assert_eq!(report.queued, ids(&["a", "b"]));
        assert_eq!(report.dispatched, 2);
        manager.settle().await;

        assert_eq!(manager.loaded_tiles(), ids(&["a", "b"]));
        assert!(engine.has_source(&source_name(&TileId::from("a"))));

        let report = manager.reconcile(&[]);
        assert_eq!(report.unloaded, ids(&["a", "b"]));
        assert!(manager.loaded_tiles().is_empty());
        assert!(engine.layer_ids().is_empty());
        assert!(engine.source_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn second_reconcile_is_a_noop() {
        let (mut manager, engine, fetcher) = setup(&["a", "b"]);
        manager.reconcile(&ids(&["a", "b"]));
        manager.settle().await;
        engine.take_ops();

        let report = manager.reconcile(&ids(&["a", "b"]));
        assert!(report.is_noop());
        assert_eq!(report.dispatched, 0);
        assert!(engine.take_ops().is_empty());
        assert_eq!(fetcher.total_fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_tiles_are_not_fetched_twice() {
        let (mut manager, _, fetcher) = setup(&["a"]);
        fetcher.set_delay("a", Duration::from_millis(500));

        manager.reconcile(&ids(&["a"]));
        let report = manager.reconcile(&ids(&["a"]));
        assert_eq!(report.skipped_in_flight, ids(&["a"]));
        assert!(report.queued.is_empty());

        manager.settle().await;
        assert_eq!(fetcher.fetch_count(&TileId::from("a")), 1);
        assert_eq!(manager.status(&TileId::from("a")), Some(TileStatus::Loaded));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_desired_ids_load_once() {
        let (mut manager, _, fetcher) = setup(&["a"]);
        let report = manager.reconcile(&ids(&["a", "a"]));
        assert_eq!(report.queued, ids(&["a"]));
        manager.settle().await;
        assert_eq!(fetcher.total_fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_marks_failed_and_retries_on_next_reconcile() {
        let (mut manager, _, fetcher) = setup(&["a"]);
        fetcher.fail("b", "503 Service Unavailable");

        manager.reconcile(&ids(&["a", "b"]));
        manager.settle().await;

        assert_eq!(manager.status(&TileId::from("a")), Some(TileStatus::Loaded));
        let failed = manager.record(&TileId::from("b")).unwrap();
        assert_eq!(failed.status, TileStatus::Failed);
        assert!(failed.last_error.as_deref().unwrap().contains("503"));
        assert_eq!(manager.stats().loads_failed, 1);

        let report = manager.reconcile(&ids(&["a", "b"]));
        assert_eq!(report.queued, ids(&["b"]));
        manager.settle().await;
        assert_eq!(fetcher.fetch_count(&TileId::from("b")), 2);
        assert_eq!(manager.record(&TileId::from("b")).unwrap().attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn undesired_completion_is_discarded() {
        let (mut manager, engine, fetcher) = setup(&["a"]);
        fetcher.set_delay("a", Duration::from_millis(300));

        manager.reconcile(&ids(&["a"]));
        manager.reconcile(&[]);
        manager.settle().await;

        assert!(manager.loaded_tiles().is_empty());
        assert!(!engine.has_source(&source_name(&TileId::from("a"))));
        assert_eq!(manager.stats().loads_discarded, 1);
        assert!(!engine
            .take_ops()
            .iter()
            .any(|op| matches!(op, EngineOp::AddSource(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn paint_overrides_apply_to_loaded_and_future_tiles() {
        let (mut manager, engine, _) = setup(&["a", "b"]);
        manager.reconcile(&ids(&["a"]));
        manager.settle().await;

        let updated = manager
            .set_paint_property("fill-color", serde_json::json!("#00ff00"))
            .unwrap();
        assert_eq!(updated, 1);

        manager.reconcile(&ids(&["a", "b"]));
        manager.settle().await;
        for id in ["a", "b"] {
            let layer = engine.layer(&layer_name(&TileId::from(id))).unwrap();
            assert_eq!(layer.paint["fill-color"], serde_json::json!("#00ff00"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn overdue_load_expires_on_reconcile_and_redispatches() {
        let (mut manager, engine, fetcher) = setup(&["a"]);
        fetcher.set_delay("a", Duration::from_secs(3));
        let tile = TileId::from("a");

        manager.reconcile(&ids(&["a"]));
        let first_ticket = manager.record(&tile).unwrap().ticket;

        // Past the deadline before the fetch task has reported anything
        let report = manager.reconcile_at(&ids(&["a"]), Instant::now() + Duration::from_secs(5));
        assert_eq!(report.expired, ids(&["a"]));
        assert_eq!(report.queued, ids(&["a"]));
        assert_eq!(report.dispatched, 1);

        let record = manager.record(&tile).unwrap();
        assert_eq!(record.status, TileStatus::Loading);
        assert_eq!(record.attempts, 2);
        assert_ne!(record.ticket, first_ticket);

        manager.settle().await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        manager.reconcile(&ids(&["a"]));

        assert_eq!(manager.status(&tile), Some(TileStatus::Loaded));
        let stats = manager.stats();
        assert_eq!(stats.loads_timed_out, 1);
        assert_eq!(stats.loads_committed, 1);
        assert_eq!(stats.loads_discarded, 1);
        let added = engine
            .take_ops()
            .into_iter()
            .filter(|op| matches!(op, EngineOp::AddSource(_)))
            .count();
        assert_eq!(added, 1);
        assert_eq!(fetcher.fetch_count(&tile), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_load_timeout_is_counted_once() {
        let (mut manager, engine, fetcher) = setup(&["a"]);
        fetcher.set_delay("a", Duration::from_secs(8));

        manager.reconcile(&ids(&["a"]));
        let report = manager.reconcile_at(&ids(&["a"]), Instant::now() + Duration::from_secs(5));
        assert_eq!(report.expired, ids(&["a"]));

        manager.settle().await;
        tokio::time::sleep(Duration::from_secs(4)).await;
        manager.reconcile(&[]);

        let stats = manager.stats();
        // One from the reconcile, one from the retry's own deadline
        assert_eq!(stats.loads_timed_out, 2);
        // Only the two late payloads
        assert_eq!(stats.loads_discarded, 2);
        assert_eq!(stats.loads_committed, 0);
        assert!(manager.expired_tickets.is_empty());
        assert!(engine.source_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_fetch_is_abandoned() {
        let (mut manager, _, fetcher) = setup(&["a"]);
        fetcher.set_delay("a", Duration::from_secs(3600));

        manager.reconcile(&ids(&["a"]));
        manager.settle().await;
        assert_eq!(manager.stats().loads_timed_out, 1);
        assert_eq!(fetcher.in_flight(), 1);

        // for_testing: 5s load timeout, abandoned at 10s
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(fetcher.in_flight(), 0);

        let report = manager.reconcile(&ids(&["a"]));
        assert_eq!(report.queued, ids(&["a"]));
        assert_eq!(manager.stats().loads_discarded, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unload_all_clears_engine() {
        let (mut manager, engine, _) = setup(&["a", "b", "c"]);
        manager.reconcile(&ids(&["a", "b", "c"]));
        manager.settle().await;

        assert_eq!(manager.unload_all(), ids(&["a", "b", "c"]));
        assert!(engine.layer_ids().is_empty());
        assert!(manager.is_idle());
    }
}
