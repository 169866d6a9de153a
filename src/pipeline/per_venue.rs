//! S4 — per-venue compute. Enriches an [`Aligned`] record with derived per-venue fields
//! (next predicted settlement interval, rolling price average), writing through to a small
//! LRU cache keyed by canonical symbol (spec.md §3 / §9: bounded, unlike the Python original's
//! unbounded dictionary).

use crate::pipeline::model::{Aligned, PerVenueComputed};
use crate::symbol::CanonicalSymbol;
use lru::LruCache;
use std::collections::HashSet;
use std::num::NonZeroUsize;

/// How many recent prices feed the rolling average per symbol.
const SMA_WINDOW: usize = 5;

#[derive(Clone, Debug, Default)]
struct SymbolState {
    last_current_settlement_ts: Option<i64>,
    recent_prices: Vec<f64>,
}

/// Per-venue cache used by S4, one instance per venue. Bounded to the size of the active
/// symbol set: [`PerVenueCache::set_active_symbols`] both resizes the LRU capacity and evicts
/// any cached symbol that has dropped out of the active set.
pub struct PerVenueCache {
    cache: LruCache<CanonicalSymbol, SymbolState>,
}

impl PerVenueCache {
    pub fn new(initial_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(initial_capacity.max(1)).unwrap();
        Self { cache: LruCache::new(capacity) }
    }

    /// Re-bound the cache to the current active symbol universe: resizes capacity and drops
    /// any cached entry whose symbol is no longer active.
    pub fn set_active_symbols(&mut self, active: &HashSet<CanonicalSymbol>) {
        if let Some(capacity) = NonZeroUsize::new(active.len()) {
            self.cache.resize(capacity);
        }
        let stale: Vec<CanonicalSymbol> = self
            .cache
            .iter()
            .map(|(symbol, _)| symbol.clone())
            .filter(|symbol| !active.contains(symbol))
            .collect();
        for symbol in stale {
            self.cache.pop(&symbol);
        }
    }

    fn compute_interval(&mut self, symbol: &CanonicalSymbol, current_ts: Option<i64>) -> Option<i64> {
        let state = self.cache.get_or_insert_mut(symbol.clone(), SymbolState::default);
        let interval = match (state.last_current_settlement_ts, current_ts) {
            (Some(prev), Some(curr)) if curr > prev => Some((curr - prev) / 1000),
            _ => None,
        };
        state.last_current_settlement_ts = current_ts.or(state.last_current_settlement_ts);
        interval
    }

    fn push_price(&mut self, symbol: &CanonicalSymbol, price: Option<f64>) -> Option<f64> {
        let state = self.cache.get_or_insert_mut(symbol.clone(), SymbolState::default);
        if let Some(p) = price {
            state.recent_prices.push(p);
            if state.recent_prices.len() > SMA_WINDOW {
                state.recent_prices.remove(0);
            }
        }
        if state.recent_prices.is_empty() {
            None
        } else {
            Some(state.recent_prices.iter().sum::<f64>() / state.recent_prices.len() as f64)
        }
    }
}

/// Enrich `aligned` using venue-keyed caches. `okx_cache`/`binance_cache` are owned by the
/// pipeline for the lifetime of the process, one pair per invocation of S4.
pub fn compute(aligned: Aligned, okx_cache: &mut PerVenueCache, binance_cache: &mut PerVenueCache) -> PerVenueComputed {
    let okx_next_interval_secs = okx_cache.compute_interval(&aligned.symbol, aligned.okx_times.current_ts);
    let binance_next_interval_secs = binance_cache.compute_interval(&aligned.symbol, aligned.binance_times.current_ts);
    let okx_price_sma = okx_cache.push_price(&aligned.symbol, aligned.okx_price);
    let binance_price_sma = binance_cache.push_price(&aligned.symbol, aligned.binance_price);

    PerVenueComputed {
        aligned,
        okx_next_interval_secs,
        binance_next_interval_secs,
        okx_price_sma,
        binance_price_sma,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::model::VenueTimes;

    fn aligned_with(symbol: &str, okx_price: Option<f64>, okx_current_ts: Option<i64>) -> Aligned {
        Aligned {
            symbol: CanonicalSymbol(symbol.into()),
            okx_price,
            okx_times: VenueTimes { current_ts: okx_current_ts, ..Default::default() },
            ..Default::default()
        }
    }

    #[test]
    fn rolling_average_incorporates_successive_prices() {
        let mut okx_cache = PerVenueCache::new(4);
        let mut binance_cache = PerVenueCache::new(4);

        let first = compute(aligned_with("BTCUSDT", Some(100.0), None), &mut okx_cache, &mut binance_cache);
        assert_eq!(first.okx_price_sma, Some(100.0));

        let second = compute(aligned_with("BTCUSDT", Some(200.0), None), &mut okx_cache, &mut binance_cache);
        assert_eq!(second.okx_price_sma, Some(150.0));
    }

    #[test]
    fn settlement_interval_only_once_two_timestamps_seen() {
        let mut okx_cache = PerVenueCache::new(4);
        let mut binance_cache = PerVenueCache::new(4);

        let first = compute(aligned_with("BTCUSDT", None, Some(1_700_000_000_000)), &mut okx_cache, &mut binance_cache);
        assert_eq!(first.okx_next_interval_secs, None);

        let second = compute(aligned_with("BTCUSDT", None, Some(1_700_028_800_000)), &mut okx_cache, &mut binance_cache);
        assert_eq!(second.okx_next_interval_secs, Some(28_800));
    }

    #[test]
    fn eviction_drops_symbols_no_longer_active() {
        let mut cache = PerVenueCache::new(4);
        cache.compute_interval(&CanonicalSymbol("BTCUSDT".into()), Some(1));
        cache.compute_interval(&CanonicalSymbol("ETHUSDT".into()), Some(1));

        let active: HashSet<CanonicalSymbol> = [CanonicalSymbol("ETHUSDT".into())].into_iter().collect();
        cache.set_active_symbols(&active);

        assert!(cache.cache.get(&CanonicalSymbol("BTCUSDT".into())).is_none());
        assert!(cache.cache.get(&CanonicalSymbol("ETHUSDT".into())).is_some());
    }
}
