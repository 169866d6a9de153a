//! S3 — align. Groups fused records by canonical symbol and emits only symbols present on
//! both venues, rendering every settlement timestamp as a UTC+8 string alongside the raw
//! millisecond value (spec.md §4.5).

use crate::pipeline::model::{Aligned, Fused, VenueTimes};
use crate::symbol::CanonicalSymbol;
use crate::time::millis_to_utc8_string;

fn venue_times(last: Option<i64>, current: Option<i64>, next: Option<i64>) -> VenueTimes {
    VenueTimes {
        last_ts: last,
        last_str: millis_to_utc8_string(last),
        current_ts: current,
        current_str: millis_to_utc8_string(current),
        next_ts: next,
        next_str: millis_to_utc8_string(next),
    }
}

/// Align one canonical symbol's OKX and Binance [`Fused`] records. Both must be present —
/// the caller only invokes this for symbols that exist in both venues' fused maps.
pub fn align(symbol: &CanonicalSymbol, okx: &Fused, binance: &Fused) -> Aligned {
    Aligned {
        symbol: symbol.clone(),
        okx_contract_name: okx.contract_name.clone(),
        binance_contract_name: binance.contract_name.clone(),
        okx_price: okx.latest_price,
        okx_funding_rate: okx.funding_rate,
        okx_times: venue_times(okx.last_settlement_ts, okx.current_settlement_ts, okx.next_settlement_ts),
        binance_price: binance.latest_price,
        binance_funding_rate: binance.funding_rate,
        binance_times: venue_times(binance.last_settlement_ts, binance.current_settlement_ts, binance.next_settlement_ts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligns_both_venues_into_one_record() {
        let symbol = CanonicalSymbol("BTCUSDT".into());
        let okx = Fused { contract_name: "BTC-USDT-SWAP".into(), latest_price: Some(60000.0), funding_rate: Some(0.00012), current_settlement_ts: Some(1_700_000_000_000), ..Default::default() };
        let binance = Fused { contract_name: "BTCUSDT".into(), latest_price: Some(60010.0), funding_rate: Some(0.00010), current_settlement_ts: Some(1_700_000_000_000), ..Default::default() };

        let aligned = align(&symbol, &okx, &binance);
        assert_eq!(aligned.okx_price, Some(60000.0));
        assert_eq!(aligned.binance_price, Some(60010.0));
        assert_eq!(aligned.okx_times.current_str, aligned.binance_times.current_str);
        assert!(aligned.okx_times.current_str.is_some());
    }

    #[test]
    fn invalid_timestamp_yields_null_string_without_dropping_record() {
        let symbol = CanonicalSymbol("BTCUSDT".into());
        let okx = Fused { current_settlement_ts: Some(-1), ..Default::default() };
        let binance = Fused { funding_rate: Some(0.0001), ..Default::default() };

        let aligned = align(&symbol, &okx, &binance);
        assert_eq!(aligned.okx_times.current_str, None);
        assert_eq!(aligned.okx_times.current_ts, Some(-1));
    }
}
