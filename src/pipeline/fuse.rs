//! S2 — fuse. Groups S1 output by `(venue, canonical_symbol)` for the current invocation only
//! (spec.md §4.5) and applies venue-specific merge rules.

use crate::pipeline::model::{Extracted, Fused};
use crate::symbol::CanonicalSymbol;
use crate::venue::Venue;
use serde_json::Value;
use tracing::warn;

/// Coerce a wire numeric field (string or number) to `f64`. Unparseable or missing values
/// yield `None` rather than propagating an error — spec.md §4.5's "safely coerced" contract.
fn coerce_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Coerce a wire timestamp field to `i64` milliseconds. Non-integer values warn and yield
/// `None` (spec.md §4.5).
fn coerce_millis(value: Option<&Value>, field: &str) -> Option<i64> {
    match value? {
        Value::String(s) => s.parse().ok().or_else(|| {
            warn!(field, raw = %s, "non-integer timestamp, coercing to null");
            None
        }),
        Value::Number(n) => n.as_i64(),
        _ => {
            warn!(field, "non-integer timestamp, coercing to null");
            None
        }
    }
}

/// Fuse every [`Extracted`] record for one `(venue, canonical_symbol)` group into a single
/// [`Fused`] record, or `None` if the venue's merge rule rejects the group.
///
/// Callers group `Extracted` records by `(venue, canonical_symbol)` first — there is no
/// cross-invocation state here, matching spec.md's "for the current invocation only".
pub fn fuse(venue: Venue, symbol: &CanonicalSymbol, group: &[Extracted]) -> Option<Fused> {
    match venue {
        Venue::Okx => fuse_okx(symbol, group),
        Venue::BinanceFutures => fuse_binance(symbol, group),
    }
}

fn has_kind<'a>(group: &'a [Extracted], key: &str) -> Option<&'a Extracted> {
    group.iter().find(|e| e.event_type_key == key)
}

fn fuse_okx(symbol: &CanonicalSymbol, group: &[Extracted]) -> Option<Fused> {
    let ticker = has_kind(group, "okx_ticker");
    let funding = has_kind(group, "okx_funding_rate");

    // Venue A: accept if any of ticker or funding-rate is present.
    if ticker.is_none() && funding.is_none() {
        return None;
    }

    let contract_name = ticker
        .or(funding)
        .and_then(|e| e.fields.get("contract_name"))
        .and_then(Value::as_str)
        .unwrap_or(&symbol.0)
        .to_string();

    Some(Fused {
        contract_name,
        latest_price: ticker.and_then(|e| coerce_f64(e.fields.get("latest_price"))),
        funding_rate: funding.and_then(|e| coerce_f64(e.fields.get("funding_rate"))),
        last_settlement_ts: None,
        current_settlement_ts: funding.and_then(|e| coerce_millis(e.fields.get("current_settlement_ts"), "okx current_settlement_ts")),
        next_settlement_ts: funding.and_then(|e| coerce_millis(e.fields.get("next_settlement_ts"), "okx next_settlement_ts")),
    })
}

fn fuse_binance(symbol: &CanonicalSymbol, group: &[Extracted]) -> Option<Fused> {
    let ticker = has_kind(group, "binance_ticker");
    let mark_price = has_kind(group, "binance_mark_price");
    let settlement = has_kind(group, "binance_funding_settlement");

    // Venue B: require a mark-price event — it is the sole source of funding_rate.
    let mark_price = mark_price?;
    let funding_rate = coerce_f64(mark_price.fields.get("funding_rate"));
    if funding_rate.is_none() {
        return None;
    }

    let contract_name = ticker
        .or(Some(mark_price))
        .and_then(|e| e.fields.get("contract_name"))
        .and_then(Value::as_str)
        .unwrap_or(&symbol.0)
        .to_string();

    Some(Fused {
        contract_name,
        latest_price: ticker.and_then(|e| coerce_f64(e.fields.get("latest_price"))),
        funding_rate,
        last_settlement_ts: settlement.and_then(|e| coerce_millis(e.fields.get("last_settlement_ts"), "binance last_settlement_ts")),
        current_settlement_ts: coerce_millis(mark_price.fields.get("current_settlement_ts"), "binance current_settlement_ts"),
        next_settlement_ts: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn extracted(key: &'static str, fields: &[(&'static str, Value)]) -> Extracted {
        Extracted {
            event_type_key: key,
            venue: if key.starts_with("okx") { Venue::Okx } else { Venue::BinanceFutures },
            canonical_symbol: CanonicalSymbol("BTCUSDT".into()),
            fields: fields.iter().cloned().collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn binance_requires_mark_price_for_funding_rate() {
        let symbol = CanonicalSymbol("BTCUSDT".into());
        let group = vec![extracted("binance_ticker", &[("contract_name", serde_json::json!("BTCUSDT")), ("latest_price", serde_json::json!("60010"))])];
        assert!(fuse(Venue::BinanceFutures, &symbol, &group).is_none());
    }

    #[test]
    fn binance_fuses_mark_price_and_ticker() {
        let symbol = CanonicalSymbol("BTCUSDT".into());
        let group = vec![
            extracted("binance_ticker", &[("contract_name", serde_json::json!("BTCUSDT")), ("latest_price", serde_json::json!("60010"))]),
            extracted("binance_mark_price", &[
                ("contract_name", serde_json::json!("BTCUSDT")),
                ("funding_rate", serde_json::json!("0.00010")),
                ("current_settlement_ts", serde_json::json!(1700000000000_i64)),
            ]),
        ];
        let fused = fuse(Venue::BinanceFutures, &symbol, &group).unwrap();
        assert_eq!(fused.latest_price, Some(60010.0));
        assert_eq!(fused.funding_rate, Some(0.00010));
        assert_eq!(fused.current_settlement_ts, Some(1700000000000));
    }

    #[test]
    fn okx_accepts_ticker_only() {
        let symbol = CanonicalSymbol("BTCUSDT".into());
        let group = vec![extracted("okx_ticker", &[("contract_name", serde_json::json!("BTC-USDT-SWAP")), ("latest_price", serde_json::json!("60000"))])];
        let fused = fuse(Venue::Okx, &symbol, &group).unwrap();
        assert_eq!(fused.latest_price, Some(60000.0));
        assert_eq!(fused.funding_rate, None);
    }

    #[test]
    fn okx_rejects_empty_group() {
        let symbol = CanonicalSymbol("BTCUSDT".into());
        assert!(fuse(Venue::Okx, &symbol, &[]).is_none());
    }

    #[test]
    fn non_integer_timestamp_coerces_to_none() {
        let symbol = CanonicalSymbol("BTCUSDT".into());
        let group = vec![extracted("binance_mark_price", &[
            ("contract_name", serde_json::json!("BTCUSDT")),
            ("funding_rate", serde_json::json!("0.0001")),
            ("current_settlement_ts", serde_json::json!("not-a-number")),
        ])];
        let fused = fuse(Venue::BinanceFutures, &symbol, &group).unwrap();
        assert_eq!(fused.current_settlement_ts, None);
    }
}
