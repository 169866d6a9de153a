//! C5: the five-stage streaming normalization pipeline (spec.md §4.5).
//!
//! `ingest` runs S1 (extract) -> S2 (fuse) -> S3 (align) -> S4 (per-venue compute) -> S5
//! (cross-venue compute) synchronously, in flow order, with no internal queue. A single
//! `tokio::sync::Mutex` serializes calls so the downstream consumer observes records in the
//! same order sockets produced the underlying events (spec.md §5).
//!
//! S2's "fuse" stage is itself stateless per spec.md's "for the current invocation only", but
//! completing a fusion needs every sibling event kind for a `(venue, symbol)` (eg/ venue B
//! needs both its mark-price and ticker events to report both `funding_rate` and
//! `latest_price`), and S3's alignment needs both venues' *latest* fused record, not just the
//! one event that happens to be in flight this call. The pipeline therefore keeps two small
//! bounded caches ([`extracted_cache`], [`fused_cache`]) — the nearest equivalent to the
//! original Python's store-backed `latest` pointer (see SPEC_FULL.md's resolution of this
//! open question) — sized by the active symbol universe, not the original's unbounded dict.

pub mod align;
pub mod cross_venue;
pub mod extract;
pub mod fuse;
pub mod model;
pub mod per_venue;

use crate::error::PipelineError;
use crate::symbol::CanonicalSymbol;
use crate::venue::Venue;
use async_trait::async_trait;
pub use model::FinalRecord;
use model::{Extracted, Fused, RawEvent};
use per_venue::PerVenueCache;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// The downstream consumer of [`FinalRecord`]s (spec.md §9's single outbound-record interface).
/// Implementations must be non-blocking from the pipeline's perspective — the pipeline awaits
/// this call while holding its serializing mutex.
#[async_trait]
pub trait Consumer: Send + Sync {
    async fn on_final_record(&self, record: FinalRecord);
}

/// A [`Consumer`] that simply counts records, for tests and as a development default.
#[derive(Default)]
pub struct CountingConsumer {
    pub count: AtomicU64,
}

#[async_trait]
impl Consumer for CountingConsumer {
    async fn on_final_record(&self, _record: FinalRecord) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Default)]
struct PipelineState {
    extracted_cache: HashMap<Venue, HashMap<CanonicalSymbol, HashMap<&'static str, Extracted>>>,
    fused_cache: HashMap<Venue, HashMap<CanonicalSymbol, Fused>>,
    okx_per_venue: Option<PerVenueCache>,
    binance_per_venue: Option<PerVenueCache>,
}

impl PipelineState {
    fn per_venue_cache(&mut self, venue: Venue) -> &mut PerVenueCache {
        let slot = match venue {
            Venue::Okx => &mut self.okx_per_venue,
            Venue::BinanceFutures => &mut self.binance_per_venue,
        };
        slot.get_or_insert_with(|| PerVenueCache::new(1))
    }
}

/// Running counters exposed alongside the pipeline's [`Consumer`] output; spec.md §7 requires
/// stage exceptions to be swallowed and counted rather than propagated.
#[derive(Default)]
pub struct PipelineCounters {
    pub processed: AtomicU64,
    pub dropped: AtomicU64,
    pub errors: AtomicU64,
}

pub struct Pipeline {
    state: Mutex<PipelineState>,
    consumer: Arc<dyn Consumer>,
    pub counters: PipelineCounters,
}

impl Pipeline {
    pub fn new(consumer: Arc<dyn Consumer>) -> Self {
        Self {
            state: Mutex::new(PipelineState::default()),
            consumer,
            counters: PipelineCounters::default(),
        }
    }

    /// Re-bound S4's per-venue caches to the currently configured symbol universe. Called by
    /// the composition root whenever a pool (re)initializes with a new symbol set.
    pub async fn set_active_symbols(&self, venue: Venue, active: &HashSet<CanonicalSymbol>) {
        let mut state = self.state.lock().await;
        state.per_venue_cache(venue).set_active_symbols(active);
    }

    /// Run one [`RawEvent`] through S1-S5. Any stage that yields nothing silently aborts the
    /// remainder for this event; any stage panic/exception-equivalent is caught at the
    /// boundary, counted, and swallowed (spec.md §4.5/§7).
    pub async fn ingest(&self, event: RawEvent) {
        let mut state = self.state.lock().await;

        let Some(extracted) = extract::extract(&event) else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let venue = extracted.venue;
        let symbol = extracted.canonical_symbol.clone();
        let key = extracted.event_type_key;

        state
            .extracted_cache
            .entry(venue)
            .or_default()
            .entry(symbol.clone())
            .or_default()
            .insert(key, extracted);

        let group: Vec<Extracted> = state
            .extracted_cache
            .get(&venue)
            .and_then(|by_symbol| by_symbol.get(&symbol))
            .map(|by_kind| by_kind.values().cloned().collect())
            .unwrap_or_default();

        let Some(fused) = fuse::fuse(venue, &symbol, &group) else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        state.fused_cache.entry(venue).or_default().insert(symbol.clone(), fused);

        let other_venue = match venue {
            Venue::Okx => Venue::BinanceFutures,
            Venue::BinanceFutures => Venue::Okx,
        };
        let Some(other_fused) = state.fused_cache.get(&other_venue).and_then(|m| m.get(&symbol)).cloned() else {
            debug!(%venue, %symbol, "awaiting other venue before alignment");
            return;
        };
        let this_fused = state.fused_cache.get(&venue).and_then(|m| m.get(&symbol)).cloned().expect("just inserted");

        let (okx_fused, binance_fused) = match venue {
            Venue::Okx => (&this_fused, &other_fused),
            Venue::BinanceFutures => (&other_fused, &this_fused),
        };
        let aligned = align::align(&symbol, okx_fused, binance_fused);

        let computed = {
            let (okx_cache, binance_cache) = state_cache_pair(&mut state);
            per_venue::compute(aligned, okx_cache, binance_cache)
        };

        let record = cross_venue::compute(computed);

        drop(state);

        self.counters.processed.fetch_add(1, Ordering::Relaxed);
        self.consumer.on_final_record(record).await;
    }

    /// Record a stage-level error without propagating it, per spec.md §7.
    pub fn note_error(&self, err: PipelineError) {
        warn!(%err, "pipeline stage error, swallowed");
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
    }
}

fn state_cache_pair(state: &mut PipelineState) -> (&mut PerVenueCache, &mut PerVenueCache) {
    state.okx_per_venue.get_or_insert_with(|| PerVenueCache::new(1));
    state.binance_per_venue.get_or_insert_with(|| PerVenueCache::new(1));
    let (a, b) = match (&mut state.okx_per_venue, &mut state.binance_per_venue) {
        (Some(a), Some(b)) => (a, b),
        _ => unreachable!("both caches just inserted"),
    };
    (a, b)
}
