//! Viewport change dispatcher.
//!
//! A single task owns the [`TileLifecycleManager`] and serialises everything
//! that touches it: debounced viewport changes, load outcomes, paint
//! updates and status queries. Because reconciliation and outcome handling
//! run on the same loop, two reconciliations can never interleave; a
//! reconcile that fires while a batch is loading replaces the queued
//! remainder and its loads start after the running batch settles.

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant, Sleep};

use super::events::ViewportEvent;
use crate::core::config::TileLoadingConfig;
use crate::core::geo::TileId;
use crate::core::viewport::ViewportState;
use crate::engine::MapEngine;
use crate::tiles::catalog::MetadataCatalog;
use crate::tiles::lifecycle::{LoadStats, TileLifecycleManager};
use crate::tiles::visibility::compute_visible_tiles;
use crate::{Error, Result};

/// Single-slot trailing-edge timer.
///
/// Every [`reset`](Self::reset) pushes the deadline to `now + window`;
/// [`fired`](Self::fired) completes once the deadline passes without
/// another reset. An unarmed timer never fires. The underlying [`Sleep`]
/// is created on the first reset, so a timer can be built outside a
/// runtime.
#[derive(Debug)]
pub struct DebounceTimer {
    window: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
    armed: bool,
}

impl DebounceTimer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            sleep: None,
            armed: false,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn reset(&mut self) {
        let deadline = Instant::now() + self.window;
        match &mut self.sleep {
            Some(sleep) => sleep.as_mut().reset(deadline),
            slot @ None => *slot = Some(Box::pin(sleep_until(deadline))),
        }
        self.armed = true;
    }

    pub fn cancel(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn deadline(&self) -> Option<Instant> {
        match &self.sleep {
            Some(sleep) if self.armed => Some(sleep.deadline()),
            _ => None,
        }
    }

    /// Cancel safe; disarms the timer when it completes
    pub async fn fired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) if self.armed => sleep.as_mut().await,
            _ => pending::<()>().await,
        }
        self.armed = false;
    }
}

/// Point-in-time view of the dispatcher and its manager
#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherSnapshot {
    pub loaded: Vec<TileId>,
    pub loading: Vec<TileId>,
    pub queued: usize,
    pub stats: LoadStats,
    /// Reconciliations triggered by the debounce timer or a flush
    pub reconciles: u64,
    pub last_viewport: Option<ViewportState>,
}

enum Command {
    Viewport(ViewportEvent),
    Paint {
        property: String,
        value: Value,
        reply: oneshot::Sender<Result<usize>>,
    },
    Snapshot(oneshot::Sender<DispatcherSnapshot>),
    Flush(oneshot::Sender<DispatcherSnapshot>),
}

/// Cloneable sender side of a running [`ViewportDispatcher`].
///
/// Map engine adapters forward their movement and zoom events through
/// [`notify`](Self::notify). Once every handle is dropped the dispatcher
/// loop ends.
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Viewport(event) => write!(f, "Viewport({})", event.kind),
            Command::Paint { property, .. } => write!(f, "Paint({property})"),
            Command::Snapshot(_) => write!(f, "Snapshot"),
            Command::Flush(_) => write!(f, "Flush"),
        }
    }
}

impl DispatcherHandle {
    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::DispatcherClosed)
    }

    pub fn notify(&self, event: ViewportEvent) -> Result<()> {
        self.send(Command::Viewport(event))
    }

    /// Applies a paint property to every current and future tile layer.
    /// Returns the number of loaded layers updated.
    pub async fn set_paint_property(
        &self,
        property: impl Into<String>,
        value: Value,
    ) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Paint {
            property: property.into(),
            value,
            reply,
        })?;
        rx.await.map_err(|_| Error::DispatcherClosed)?
    }

    pub async fn snapshot(&self) -> Result<DispatcherSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply))?;
        rx.await.map_err(|_| Error::DispatcherClosed)
    }

    /// Runs any pending reconciliation now and waits until no load is
    /// running or queued
    pub async fn flush(&self) -> Result<DispatcherSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Flush(reply))?;
        rx.await.map_err(|_| Error::DispatcherClosed)
    }
}

pub struct ViewportDispatcher<E: MapEngine> {
    manager: TileLifecycleManager<E>,
    catalog: Arc<MetadataCatalog>,
    zoom_threshold: f64,
    timer: DebounceTimer,
    pending: Option<ViewportState>,
    last_viewport: Option<ViewportState>,
    reconciles: u64,
    flush_waiters: Vec<oneshot::Sender<DispatcherSnapshot>>,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl<E: MapEngine + 'static> ViewportDispatcher<E> {
    pub fn new(
        manager: TileLifecycleManager<E>,
        catalog: Arc<MetadataCatalog>,
        config: &TileLoadingConfig,
    ) -> (Self, DispatcherHandle) {
        let (tx, commands) = mpsc::unbounded_channel();
        let dispatcher = Self {
            manager,
            catalog,
            zoom_threshold: config.zoom_threshold,
            timer: DebounceTimer::new(config.debounce_window()),
            pending: None,
            last_viewport: None,
            reconciles: 0,
            flush_waiters: Vec::new(),
            commands,
        };
        (dispatcher, DispatcherHandle { commands: tx })
    }

    /// Starts the loop on the current tokio runtime. The join handle yields
    /// the manager once every [`DispatcherHandle`] has been dropped.
    pub fn spawn(self) -> JoinHandle<TileLifecycleManager<E>> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) -> TileLifecycleManager<E> {
        log::debug!("viewport dispatcher started");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(outcome) = self.manager.next_outcome() => {
                    self.manager.apply_outcome(outcome);
                    self.answer_flush_waiters();
                }
                _ = self.timer.fired() => self.fire(),
            }
        }
        log::debug!("viewport dispatcher stopped after {} reconciles", self.reconciles);
        self.manager
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Viewport(event) => {
                log::trace!("{} at zoom {:.2}", event.kind, event.viewport.zoom);
                self.pending = Some(event.viewport);
                self.timer.reset();
            }
            Command::Paint {
                property,
                value,
                reply,
            } => {
                let result = self.manager.set_paint_property(&property, value);
                let _ = reply.send(result);
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Flush(reply) => {
                if self.pending.is_some() {
                    self.timer.cancel();
                    self.fire();
                }
                self.flush_waiters.push(reply);
                self.answer_flush_waiters();
            }
        }
    }

    /// Reconciles against the last viewport seen since the timer was armed
    fn fire(&mut self) {
        let Some(viewport) = self.pending.take() else {
            return;
        };
        if !viewport.shows_tiles(self.zoom_threshold) {
            log::debug!(
                "zoom {:.2} below threshold {:.2}, unloading all tiles",
                viewport.zoom,
                self.zoom_threshold
            );
        }
        let desired = compute_visible_tiles(&self.catalog, &viewport, self.zoom_threshold);
        self.manager.reconcile(&desired);
        self.reconciles += 1;
        self.last_viewport = Some(viewport);
        self.answer_flush_waiters();
    }

    fn answer_flush_waiters(&mut self) {
        if self.flush_waiters.is_empty() || !self.manager.is_idle() || self.pending.is_some() {
            return;
        }
        let snapshot = self.snapshot();
        for waiter in self.flush_waiters.drain(..) {
            let _ = waiter.send(snapshot.clone());
        }
    }

    fn snapshot(&self) -> DispatcherSnapshot {
        DispatcherSnapshot {
            loaded: self.manager.loaded_tiles(),
            loading: self.manager.loading_tiles(),
            queued: self.manager.queued_len(),
            stats: self.manager.stats().clone(),
            reconciles: self.reconciles,
            last_viewport: self.last_viewport,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn timer_fires_once_after_quiet_window() {
        let mut timer = DebounceTimer::new(Duration::from_millis(100));
        assert!(timer.deadline().is_none());

        let start = Instant::now();
        timer.reset();
        tokio::time::sleep(Duration::from_millis(60)).await;
        timer.reset();
        timer.fired().await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(160), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(170), "{elapsed:?}");
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn unarmed_timer_never_fires() {
        let mut timer = DebounceTimer::new(Duration::from_millis(10));
        let fired = tokio::time::timeout(Duration::from_secs(1), timer.fired()).await;
        assert!(fired.is_err());

        timer.reset();
        timer.cancel();
        let fired = tokio::time::timeout(Duration::from_secs(1), timer.fired()).await;
        assert!(fired.is_err());
    }

    #[test]
    fn dispatcher_builds_without_runtime() {
        use crate::engine::memory::InMemoryEngine;
        use crate::tiles::fetcher::MemoryTileFetcher;

        let config = TileLoadingConfig::for_testing();
        let viewport = ViewportState::from_center_span(
            crate::core::geo::LatLng::new(0.0, 0.0),
            1.0,
            1.0,
            8.0,
        )
        .unwrap();
        let manager = TileLifecycleManager::new(
            InMemoryEngine::new(viewport),
            Arc::new(MemoryTileFetcher::new()),
            &config,
        );
        let (dispatcher, handle) =
            ViewportDispatcher::new(manager, Arc::new(MetadataCatalog::default()), &config);

        assert!(!dispatcher.timer.is_armed());
        assert!(dispatcher.timer.deadline().is_none());
        handle.notify(ViewportEvent::move_end(viewport)).unwrap();
    }

    #[tokio::test]
    async fn closed_dispatcher_reports_error() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = DispatcherHandle { commands: tx };
        assert!(matches!(handle.snapshot().await, Err(Error::DispatcherClosed)));
    }
}
