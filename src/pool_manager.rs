//! C3: instantiates one [`ExchangePool`] per configured venue and fans lifecycle calls out to
//! all of them (spec.md §4.3).
//!
//! `start()` re-verifies every pool's monitor-scheduling task is alive after `initialize`
//! returns, spawning a replacement if not — duplicating [`ExchangePool::initialize`]'s own
//! post-check by design, since the manager cannot assume a single pool's internal check ran
//! correctly.

use crate::config::{timing, VenueCatalog};
use crate::pool::ExchangePool;
use crate::pipeline::model::RawEvent;
use crate::status::StatusReporter;
use crate::store::Store;
use crate::symbol::CanonicalSymbol;
use crate::transport::WsTransport;
use crate::venue::Venue;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// One monitor-scheduling task per venue, held so the manager can verify liveness and cancel
/// cleanly at shutdown (spec.md §5: "every long-lived task is held by handle").
struct VenueHandle {
    pool: Arc<Mutex<ExchangePool>>,
    monitor_task: Option<JoinHandle<()>>,
    fanout_task: JoinHandle<()>,
}

pub struct PoolManager {
    store: Arc<Store>,
    transport: Arc<dyn WsTransport>,
    venues: HashMap<Venue, VenueHandle>,
}

impl PoolManager {
    pub fn new(store: Arc<Store>, transport: Arc<dyn WsTransport>) -> Self {
        Self { store, transport, venues: HashMap::new() }
    }

    /// Initialize one pool per venue in `catalogs` with its configured symbol universe, then
    /// spawn each pool's monitor-scheduling task. Per-venue failures are independent — one
    /// venue failing to initialize does not stop the others (spec.md §4.2's "partial success
    /// is acceptable").
    pub async fn start(&mut self, catalogs: &[VenueCatalog], symbols_by_venue: &HashMap<Venue, Vec<CanonicalSymbol>>) {
        for catalog in catalogs {
            let symbols = symbols_by_venue.get(&catalog.venue).cloned().unwrap_or_default();
            info!(venue = %catalog.venue, symbols = symbols.len(), "starting pool");

            let (data_tx, data_rx) = mpsc::unbounded_channel();
            let mut pool = ExchangePool::new(*catalog, self.transport.clone(), data_tx);
            if let Err(err) = pool.initialize(symbols.clone()).await {
                warn!(venue = %catalog.venue, %err, "pool initialization failed");
            }

            let active: HashSet<CanonicalSymbol> = symbols.into_iter().collect();
            self.store.set_active_symbols(catalog.venue, active).await;

            let pool = Arc::new(Mutex::new(pool));
            let fanout_task = spawn_data_fanout(catalog.venue, data_rx, self.store.clone());
            let monitor_task = spawn_monitor(catalog.venue, pool.clone(), self.store.clone());

            self.venues.insert(catalog.venue, VenueHandle { pool, monitor_task: Some(monitor_task), fanout_task });
        }

        info!("pool manager start() returned, re-verifying monitor tasks");
        self.reverify_monitor_tasks().await;
    }

    /// Duplicate of [`ExchangePool::initialize`]'s post-check: if any venue's monitor-scheduling
    /// task is missing or has already finished, spawn a replacement (spec.md §4.3).
    async fn reverify_monitor_tasks(&mut self) {
        for (venue, handle) in self.venues.iter_mut() {
            let alive = handle.monitor_task.as_ref().is_some_and(|task| !task.is_finished());
            if !alive {
                warn!(%venue, "monitor-scheduling task absent or finished, recreating");
                handle.monitor_task = Some(spawn_monitor(*venue, handle.pool.clone(), self.store.clone()));
            }
        }
    }

    /// Cancel every venue's monitor task and disconnect every connection, in parallel.
    pub async fn shutdown(&mut self) {
        let mut shutdowns = Vec::with_capacity(self.venues.len());
        for (venue, handle) in self.venues.drain() {
            if let Some(task) = handle.monitor_task {
                task.abort();
            }
            handle.fanout_task.abort();
            let pool = handle.pool;
            shutdowns.push(async move {
                pool.lock().await.shutdown().await;
                info!(%venue, "pool shut down");
            });
        }
        futures::future::join_all(shutdowns).await;
    }
}

fn spawn_data_fanout(venue: Venue, mut data_rx: mpsc::UnboundedReceiver<RawEvent>, store: Arc<Store>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = data_rx.recv().await {
            if let Err(err) = store.update_market_data(event).await {
                tracing::error!(%venue, %err, "store write failed");
            }
        }
    })
}

/// Drive one venue's monitor-scheduling loop: every [`timing::MONITOR_TICK`], run a failover
/// sweep and write a fresh health snapshot (spec.md §4.2/§4.6).
fn spawn_monitor(venue: Venue, pool: Arc<Mutex<ExchangePool>>, store: Arc<Store>) -> JoinHandle<()> {
    let reporter = StatusReporter::new(store);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(timing::MONITOR_TICK);
        loop {
            ticker.tick().await;
            let mut guard = pool.lock().await;
            let failovers = guard.run_monitor_tick().await;
            let snapshot = guard.health_snapshot();
            drop(guard);
            tracing::trace!(%venue, "monitor tick complete");
            reporter.report(snapshot, failovers);
        }
    })
}
