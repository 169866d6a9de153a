//! C2: the master/warm-standby/monitor pool for a single venue (spec.md §4.2).

use crate::config::{timing, VenueCatalog};
use crate::connection::{Connection, ConnectionHealth, Role};
use crate::error::PoolError;
use crate::pipeline::model::RawEvent;
use crate::symbol::{partition_symbols, CanonicalSymbol};
use crate::transport::WsTransport;
use crate::venue::Venue;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// A promotion event, appended to the `(venue, "failover_history")` status feed (C6).
#[derive(Clone, Debug, Serialize)]
pub struct FailoverRecord {
    pub venue: Venue,
    pub instant: DateTime<Utc>,
    pub master_index: usize,
    pub promoted_symbols_count: usize,
    pub reason: String,
}

/// A snapshot of every connection's health, the shape C6 writes under `(venue, "websocket_pool")`.
#[derive(Clone, Debug, Serialize)]
pub struct PoolHealthSnapshot {
    pub venue: Venue,
    pub instant: DateTime<Utc>,
    pub masters: Vec<ConnectionHealth>,
    pub warm_standbys: Vec<ConnectionHealth>,
    pub monitor: ConnectionHealth,
}

/// Owns every connection for one venue: `masters` masters, `standbys` warm standbys, and a
/// single monitor connection watching the venue's heartbeat symbol independent of any master's
/// traffic. Not internally concurrent — callers (the pool manager) drive [`run_monitor_tick`]
/// from a single task per pool, matching the "one mutex guards one pool" shape spec.md §7 asks
/// of every shared-mutable-state component in this service.
pub struct ExchangePool {
    venue: Venue,
    catalog: VenueCatalog,
    transport: Arc<dyn WsTransport>,
    data_tx: mpsc::UnboundedSender<RawEvent>,
    masters: Vec<Connection>,
    standbys: Vec<Connection>,
    monitor: Option<Connection>,
}

impl ExchangePool {
    pub fn new(catalog: VenueCatalog, transport: Arc<dyn WsTransport>, data_tx: mpsc::UnboundedSender<RawEvent>) -> Self {
        Self {
            venue: catalog.venue,
            catalog,
            transport,
            data_tx,
            masters: Vec::new(),
            standbys: Vec::new(),
            monitor: None,
        }
    }

    fn new_connection(&self, role: Role, index: usize) -> Connection {
        Connection::new(self.venue, role, index, self.catalog.ws_url, self.transport.clone(), self.data_tx.clone())
    }

    /// Partitions `symbols` across master connections, dials every master/standby/monitor
    /// connection, and subscribes each to its share.
    /// Each master/standby's connect+subscribe is independent of its siblings: a single
    /// connection failing does not abort the others, only leaves that slot `disconnected` for
    /// the monitor-scheduling loop to pick up on its next tick (spec.md §4.2's "each
    /// sub-initialization has its own 30s timeout and is independent — partial success is
    /// acceptable"). Zero symbols yields zero master groups and the pool still initializes
    /// (spec.md §8's `N = 0` boundary).
    pub async fn initialize(&mut self, symbols: Vec<CanonicalSymbol>) -> Result<(), PoolError> {
        let groups = partition_symbols(&symbols, self.catalog.masters, self.catalog.symbols_per_master);
        let venue = self.venue;
        let heartbeat = CanonicalSymbol::from(venue.heartbeat_symbol());

        // Every master, every standby, and the monitor dial independently and concurrently
        // (spec.md §4.2: "concurrently starts masters, standbys, and the monitor ... partial
        // success is acceptable"). Each future owns its `Connection` exclusively for the
        // duration of its own dial/subscribe dance, so a standby's staggered delay only holds
        // up that one connection, never its siblings or the monitor.
        let master_futures = groups.into_iter().enumerate().map(|(index, group)| {
            let mut conn = self.new_connection(Role::Master, index);
            let venue = venue;
            async move {
                match conn.connect().await {
                    Ok(()) => {
                        if let Err(err) = conn.subscribe(group).await {
                            warn!(%venue, master_index = index, %err, "master subscribe failed during initialize, left for next monitor tick");
                        }
                    }
                    Err(err) => {
                        warn!(%venue, master_index = index, %err, "master connect failed during initialize, left for next monitor tick");
                        conn.set_intended_symbols(group);
                    }
                }
                conn
            }
        });
        let masters_fut = futures::future::join_all(master_futures);

        let standby_futures = (0..self.catalog.standbys).map(|index| {
            let mut conn = self.new_connection(Role::WarmStandby, index);
            let heartbeat = heartbeat.clone();
            let venue = venue;
            async move {
                match conn.connect().await {
                    Ok(()) => {
                        conn.wait_for_standby_delay().await;
                        if let Err(err) = conn.subscribe(vec![heartbeat]).await {
                            warn!(%venue, standby_index = index, %err, "standby subscribe failed during initialize, left for next monitor tick");
                        }
                    }
                    Err(err) => {
                        warn!(%venue, standby_index = index, %err, "standby connect failed during initialize, left for next monitor tick");
                    }
                }
                conn
            }
        });
        let standbys_fut = futures::future::join_all(standby_futures);

        // The monitor connection's post-check is mandatory (spec.md §4.2): without a connected
        // monitor the pool has no failover authority, so this is the one slot initialize()
        // retries with back-off and fails the whole pool over, rather than leaving to the next
        // tick.
        let monitor_fut = async {
            let mut monitor = self.new_connection(Role::Monitor, 0);
            let mut attempt = 0;
            loop {
                match monitor.connect().await {
                    Ok(()) => return Ok(monitor),
                    Err(err) if attempt + 1 < timing::MONITOR_INIT_MAX_ATTEMPTS => {
                        warn!(%venue, attempt, %err, "monitor connect failed, retrying");
                        tokio::time::sleep(timing::monitor_retry_backoff(attempt)).await;
                        attempt += 1;
                    }
                    Err(err) => return Err::<Connection, PoolError>(err.into()),
                }
            }
        };

        let (masters, standbys, monitor) = tokio::join!(masters_fut, standbys_fut, monitor_fut);
        let monitor = monitor?;

        self.masters = masters;
        self.standbys = standbys;
        self.monitor = Some(monitor);
        info!(%venue, masters = self.masters.len(), standbys = self.standbys.len(), "pool initialized");
        Ok(())
    }

    pub async fn shutdown(&mut self) {
        for conn in self.masters.iter_mut().chain(self.standbys.iter_mut()) {
            conn.disconnect().await;
        }
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.disconnect().await;
        }
    }

    /// One tick of the monitor schedule (spec.md §4.2, every `MONITOR_TICK`): fail over any
    /// disconnected master, and reconnect (non-blocking for the loop) any disconnected standby.
    /// Failover keys strictly on `connected == false`, per spec.md §4.2 — a quiet-but-connected
    /// master (eg. the `N < M` boundary where a master holds only a handful of low-traffic
    /// symbols) is not a failure. Returns every failover performed this tick (normally zero).
    pub async fn run_monitor_tick(&mut self) -> Vec<FailoverRecord> {
        let disconnected_indices: Vec<usize> = self
            .masters
            .iter()
            .enumerate()
            .filter(|(_, conn)| !conn.health().connected)
            .map(|(i, _)| i)
            .collect();

        let mut records = Vec::new();
        for master_index in disconnected_indices {
            match self.failover(master_index, "master disconnected").await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(err) => error!(venue = %self.venue, master_index, %err, "failover attempt failed"),
            }
        }

        let heartbeat = CanonicalSymbol::from(self.venue.heartbeat_symbol());
        for (index, standby) in self.standbys.iter_mut().enumerate() {
            if !standby.health().connected {
                if let Err(err) = standby.connect().await {
                    warn!(venue = %self.venue, standby_index = index, %err, "standby reconnect failed");
                    continue;
                }
            }
            // Non-blocking for the loop: this only fires once the staggered delay set by
            // `connect()` has actually elapsed, so a standby reconnected mid-tick still waits
            // out its full `10 + 5·index` seconds before resubscribing (spec.md §4.1/§5), it
            // just does so across ticks instead of a single blocking sleep here.
            if standby.standby_subscribe_due() {
                if let Err(err) = standby.subscribe(vec![heartbeat.clone()]).await {
                    warn!(venue = %self.venue, standby_index = index, %err, "standby resubscribe failed");
                }
            }
        }

        records
    }

    /// Promote the healthiest eligible standby into `master_index`'s place, then reconnect the
    /// failed master as a fresh standby (spec.md §4.2's failover algorithm). If no standby is
    /// `connected ∧ ¬is_active`, step 1 says to reconnect the failed master in place and stop —
    /// represented here as `Ok(None)` rather than an error, since a pool temporarily short a
    /// standby is a recoverable condition, not a failure of the failover call itself.
    async fn failover(&mut self, master_index: usize, reason: &str) -> Result<Option<FailoverRecord>, PoolError> {
        let best_standby = self
            .standbys
            .iter()
            .enumerate()
            .filter(|(_, conn)| {
                let health = conn.health();
                health.connected && !health.is_active
            })
            .min_by_key(|(_, conn)| {
                let health = conn.health();
                (health.seconds_since_last_message.unwrap_or(u64::MAX), health.reconnect_count, health.symbols_count)
            })
            .map(|(i, _)| i);

        let Some(best_standby) = best_standby else {
            warn!(venue = %self.venue, master_index, "no eligible standby, reconnecting failed master in place");
            let slice = self.masters[master_index].symbols().to_vec();
            self.masters[master_index].disconnect().await;
            self.masters[master_index].connect().await?;
            self.masters[master_index].subscribe(slice).await?;
            return Ok(None);
        };

        let symbols = self.masters[master_index].symbols().to_vec();
        let symbols_count = symbols.len();

        if let Err(err) = self.masters[master_index].unsubscribe().await {
            warn!(venue = %self.venue, master_index, %err, "unsubscribe of failed master errored, continuing failover");
        }
        self.masters[master_index].disconnect().await;

        let mut promoted = self.standbys.remove(best_standby);
        if let Err(err) = promoted.switch_role(Role::Master, symbols.clone()).await {
            // Step 3 failed: abort the promotion, but step 5 still runs (tie-break/idempotency
            // note) so the old master's connection is never left orphaned.
            warn!(venue = %self.venue, master_index, %err, "standby promotion failed, aborting and reconnecting failed master");
            self.standbys.insert(best_standby.min(self.standbys.len()), promoted);
            self.masters[master_index].connect().await?;
            self.masters[master_index].subscribe(symbols).await?;
            return Err(err);
        }
        let failed_master = std::mem::replace(&mut self.masters[master_index], promoted);

        let mut replacement = failed_master;
        replacement.note_reconnect();
        tokio::time::sleep(timing::FAILOVER_RECONNECT_PAUSE).await;
        replacement.connect().await?;
        replacement
            .switch_role(Role::WarmStandby, vec![CanonicalSymbol::from(self.venue.heartbeat_symbol())])
            .await?;
        self.standbys.push(replacement);

        info!(venue = %self.venue, master_index, reason, symbols_count, "failover completed");
        Ok(Some(FailoverRecord {
            venue: self.venue,
            instant: Utc::now(),
            master_index,
            promoted_symbols_count: symbols_count,
            reason: reason.to_string(),
        }))
    }

    pub fn health_snapshot(&self) -> PoolHealthSnapshot {
        PoolHealthSnapshot {
            venue: self.venue,
            instant: Utc::now(),
            masters: self.masters.iter().map(Connection::health).collect(),
            warm_standbys: self.standbys.iter().map(Connection::health).collect(),
            monitor: self
                .monitor
                .as_ref()
                .map(Connection::health)
                .unwrap_or(ConnectionHealth {
                    connected: false,
                    subscribed: false,
                    is_active: false,
                    symbols_count: 0,
                    seconds_since_last_message: None,
                    reconnect_count: 0,
                    messages_received: 0,
                }),
        }
    }
}
