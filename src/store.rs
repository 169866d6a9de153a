//! C4: thread-safe market-data cache, one mutex per venue (spec.md §4.4).
//!
//! `update_market_data` is the single ingress point: it stores the raw record under the venue's
//! mutex, updates the symbol-level `latest` pointer, then — *outside* that mutex — hands the
//! event to the pipeline so slow pipeline work never blocks further ingress from the same or
//! any other venue.

use crate::connection::ConnectionHealth;
use crate::error::StoreError;
use crate::pipeline::model::{EventKind, RawEvent};
use crate::pipeline::Pipeline;
use crate::pool::{FailoverRecord, PoolHealthSnapshot};
use crate::symbol::CanonicalSymbol;
use crate::venue::Venue;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;

#[derive(Clone, Debug)]
pub struct SymbolData {
    pub by_kind: HashMap<EventKind, RawEvent>,
    pub latest: EventKind,
}

#[derive(Default)]
struct VenuePartition {
    symbols: HashMap<CanonicalSymbol, SymbolData>,
}

/// Venue-partitioned connection status, written by C6 every monitor tick.
#[derive(Default)]
struct StatusPartition {
    pool_health: HashMap<Venue, PoolHealthSnapshot>,
    failover_history: HashMap<Venue, Vec<FailoverRecord>>,
}

/// `venue -> symbol -> event_kind -> record`, each venue behind its own [`parking_lot::Mutex`]
/// (spec.md §4.4/§5: "each venue partition has a dedicated mutex").
pub struct Store {
    market_data: HashMap<Venue, Mutex<VenuePartition>>,
    status: Mutex<StatusPartition>,
    pipeline: Arc<Pipeline>,
}

impl Store {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        let market_data = Venue::ALL.into_iter().map(|v| (v, Mutex::new(VenuePartition::default()))).collect();
        Self { market_data, status: Mutex::new(StatusPartition::default()), pipeline }
    }

    fn partition(&self, venue: Venue) -> &Mutex<VenuePartition> {
        self.market_data.get(&venue).expect("every Venue has a partition")
    }

    /// Store `event` under its `(venue, symbol, event_kind)` slot, update the `latest` pointer,
    /// then fan it out to the pipeline outside the venue mutex.
    pub async fn update_market_data(&self, event: RawEvent) -> Result<(), StoreError> {
        {
            let mut partition = self.partition(event.venue).lock();
            let entry = partition.symbols.entry(event.canonical_symbol.clone()).or_insert_with(|| SymbolData {
                by_kind: HashMap::new(),
                latest: event.event_kind,
            });
            entry.latest = event.event_kind;
            entry.by_kind.insert(event.event_kind, event.clone());
        }

        self.pipeline.ingest(event).await;
        Ok(())
    }

    /// Fetch every stored record for `(venue, symbol)`, or a single `event_kind` slot if given.
    pub fn get_market_data(&self, venue: Venue, symbol: &CanonicalSymbol, event_kind: Option<EventKind>) -> Option<SymbolData> {
        let partition = self.partition(venue).lock();
        let entry = partition.symbols.get(symbol)?;
        match event_kind {
            Some(kind) => entry.by_kind.get(&kind).map(|record| SymbolData {
                by_kind: HashMap::from([(kind, record.clone())]),
                latest: kind,
            }),
            None => Some(entry.clone()),
        }
    }

    pub fn symbol_count(&self, venue: Venue) -> usize {
        self.partition(venue).lock().symbols.len()
    }

    /// Re-bound S4's per-venue cache to `active`, forwarded to the pipeline (spec.md §3's
    /// bounded-cache requirement). Called by the pool manager whenever a pool (re)initializes.
    pub async fn set_active_symbols(&self, venue: Venue, active: std::collections::HashSet<CanonicalSymbol>) {
        self.pipeline.set_active_symbols(venue, &active).await;
    }

    /// Write C6's per-tick health snapshot under `(venue, "websocket_pool")`.
    pub fn record_pool_health(&self, snapshot: PoolHealthSnapshot) {
        self.status.lock().pool_health.insert(snapshot.venue, snapshot);
    }

    pub fn get_pool_health(&self, venue: Venue) -> Option<PoolHealthSnapshot> {
        self.status.lock().pool_health.get(&venue).cloned()
    }

    /// Append to `(venue, "failover_history")`.
    pub fn record_failover(&self, record: FailoverRecord) {
        self.status.lock().failover_history.entry(record.venue).or_default().push(record);
    }

    pub fn get_failover_history(&self, venue: Venue) -> Vec<FailoverRecord> {
        self.status.lock().failover_history.get(&venue).cloned().unwrap_or_default()
    }
}

/// Connection-status read surface the REST debug endpoint consumes (spec.md §6's collaborator
/// contract); populated by [`crate::pool_manager::PoolManager`] rather than by sockets directly.
pub fn connection_status_summary(snapshot: &PoolHealthSnapshot) -> Vec<(&'static str, usize, &'static ConnectionHealth)> {
    let mut out = Vec::with_capacity(snapshot.masters.len() + snapshot.warm_standbys.len() + 1);
    for (i, h) in snapshot.masters.iter().enumerate() {
        out.push(("master", i, h));
    }
    for (i, h) in snapshot.warm_standbys.iter().enumerate() {
        out.push(("warm_standby", i, h));
    }
    out.push(("monitor", 0, &snapshot.monitor));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{CountingConsumer, Pipeline};
    use chrono::Utc;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn event(venue: Venue, kind: EventKind, raw: serde_json::Value) -> RawEvent {
        RawEvent { venue, canonical_symbol: CanonicalSymbol("BTCUSDT".into()), event_kind: kind, wire_event_type: "t".into(), raw, ingest_instant: Utc::now() }
    }

    #[tokio::test]
    async fn update_market_data_stores_and_fans_out_to_pipeline() {
        let consumer = Arc::new(CountingConsumer::default());
        let pipeline = Arc::new(Pipeline::new(consumer.clone()));
        let store = Store::new(pipeline);

        store
            .update_market_data(event(Venue::BinanceFutures, EventKind::MarkPrice, json!({"s": "BTCUSDT", "r": "0.0001", "T": 1})))
            .await
            .unwrap();

        let data = store.get_market_data(Venue::BinanceFutures, &CanonicalSymbol("BTCUSDT".into()), None).unwrap();
        assert_eq!(data.latest, EventKind::MarkPrice);
        assert_eq!(store.symbol_count(Venue::BinanceFutures), 1);
        // No Okx counterpart yet, so S3 aborts and nothing reaches the pipeline's consumer.
        assert_eq!(consumer.count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn failover_history_accumulates_per_venue() {
        let consumer = Arc::new(CountingConsumer::default());
        let pipeline = Arc::new(Pipeline::new(consumer));
        let store = Store::new(pipeline);

        store.record_failover(FailoverRecord { venue: Venue::Okx, instant: Utc::now(), master_index: 0, promoted_symbols_count: 10, reason: "test".into() });
        assert_eq!(store.get_failover_history(Venue::Okx).len(), 1);
        assert!(store.get_failover_history(Venue::BinanceFutures).is_empty());
    }
}
