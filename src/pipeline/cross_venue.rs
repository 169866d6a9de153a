//! S5 — cross-venue compute. Computes inter-venue spreads and assembles the [`FinalRecord`]
//! delivered to the downstream consumer (spec.md §4.5).

use crate::pipeline::model::{FinalRecord, PerVenueComputed};

pub fn compute(input: PerVenueComputed) -> FinalRecord {
    let aligned = &input.aligned;

    let funding_rate_spread = match (aligned.okx_funding_rate, aligned.binance_funding_rate) {
        (Some(a), Some(b)) => Some(a - b),
        _ => None,
    };
    let price_basis = match (aligned.okx_price, aligned.binance_price) {
        (Some(a), Some(b)) => Some(a - b),
        _ => None,
    };

    FinalRecord {
        symbol: aligned.symbol.0.clone(),
        okx_price: aligned.okx_price,
        binance_price: aligned.binance_price,
        okx_funding_rate: aligned.okx_funding_rate,
        binance_funding_rate: aligned.binance_funding_rate,
        funding_rate_spread,
        price_basis,
        okx_current_settlement: aligned.okx_times.current_str.clone(),
        okx_next_settlement: aligned.okx_times.next_str.clone(),
        okx_last_settlement: aligned.okx_times.last_str.clone(),
        binance_current_settlement: aligned.binance_times.current_str.clone(),
        binance_next_settlement: aligned.binance_times.next_str.clone(),
        binance_last_settlement: aligned.binance_times.last_str.clone(),
        okx_next_interval_secs: input.okx_next_interval_secs,
        binance_next_interval_secs: input.binance_next_interval_secs,
        okx_price_sma: input.okx_price_sma,
        binance_price_sma: input.binance_price_sma,
    }
}
