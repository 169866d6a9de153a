//! Venue-specific subscription framing and message parsing (spec.md §4.1 / §6).

use crate::config::timing::SUBSCRIBE_BATCH_SIZE;
use crate::pipeline::model::EventKind;
use crate::symbol::{canonicalize, CanonicalSymbol};
use crate::venue::Venue;
use serde_json::{json, Value};

/// A single venue message that survived the ack/error filter, ready for pipeline S1.
pub struct ParsedEvent {
    pub canonical_symbol: CanonicalSymbol,
    pub event_kind: EventKind,
    pub wire_event_type: String,
    pub raw: Value,
}

/// Venue A's wire symbol for a canonical contract, eg/ `BTCUSDT` -> `BTC-USDT-SWAP`.
///
/// Invertible only for USDT-margined perpetuals, which is the only quote currency this
/// service aggregates (spec.md's heartbeat symbols are both USDT pairs).
pub fn to_wire_symbol(venue: Venue, symbol: &CanonicalSymbol) -> String {
    match venue {
        Venue::BinanceFutures => symbol.0.clone(),
        Venue::Okx => {
            let base = symbol.0.strip_suffix("USDT").unwrap_or(&symbol.0);
            format!("{base}-USDT-SWAP")
        }
    }
}

/// Batch `symbols` into `(frame_json, frame_count)` requests for venue B's combined stream.
///
/// Builds `<symbol>@ticker` and `<symbol>@markPrice` streams per symbol, batched `SUBSCRIBE_BATCH_SIZE`
/// streams at a time with a monotonically increasing request id.
pub fn binance_subscribe_batches(symbols: &[CanonicalSymbol], start_id: u64) -> Vec<String> {
    binance_batches(symbols, start_id, "SUBSCRIBE")
}

pub fn binance_unsubscribe_batches(symbols: &[CanonicalSymbol], start_id: u64) -> Vec<String> {
    binance_batches(symbols, start_id, "UNSUBSCRIBE")
}

fn binance_batches(symbols: &[CanonicalSymbol], start_id: u64, method: &str) -> Vec<String> {
    let streams: Vec<String> = symbols
        .iter()
        .flat_map(|s| {
            let lower = s.0.to_lowercase();
            [format!("{lower}@ticker"), format!("{lower}@markPrice")]
        })
        .collect();

    streams
        .chunks(SUBSCRIBE_BATCH_SIZE)
        .enumerate()
        .map(|(i, batch)| json!({"method": method, "params": batch, "id": start_id + i as u64}).to_string())
        .collect()
}

/// Batch `symbols` into venue A subscribe/unsubscribe request frames, one `tickers` and one
/// `funding-rate` channel subscription object per symbol, batched `SUBSCRIBE_BATCH_SIZE` entries.
pub fn okx_subscribe_batches(symbols: &[CanonicalSymbol]) -> Vec<String> {
    okx_batches(symbols, "subscribe")
}

pub fn okx_unsubscribe_batches(symbols: &[CanonicalSymbol]) -> Vec<String> {
    okx_batches(symbols, "unsubscribe")
}

fn okx_batches(symbols: &[CanonicalSymbol], op: &str) -> Vec<String> {
    let args: Vec<Value> = symbols
        .iter()
        .flat_map(|s| {
            let inst_id = to_wire_symbol(Venue::Okx, s);
            [
                json!({"channel": "tickers", "instId": inst_id}),
                json!({"channel": "funding-rate", "instId": inst_id}),
            ]
        })
        .collect();

    args.chunks(SUBSCRIBE_BATCH_SIZE)
        .map(|batch| json!({"op": op, "args": batch}).to_string())
        .collect()
}

/// Parse a raw venue B text frame. Subscription acknowledgements (`{"result":..,"id":..}` or
/// any frame carrying a bare `id`) are never forwarded as data.
pub fn parse_binance(raw: &Value) -> Option<ParsedEvent> {
    if raw.get("result").is_some() || (raw.get("id").is_some() && raw.get("e").is_none()) {
        return None;
    }

    let event_type = raw.get("e")?.as_str()?.to_string();
    let symbol = raw.get("s")?.as_str()?;
    let event_kind = match event_type.as_str() {
        "24hrTicker" => EventKind::Ticker,
        "markPriceUpdate" => EventKind::MarkPrice,
        _ => return None,
    };

    Some(ParsedEvent {
        canonical_symbol: canonicalize(Venue::BinanceFutures, symbol),
        event_kind,
        wire_event_type: event_type,
        raw: raw.clone(),
    })
}

/// Parse a raw venue A text frame. `event ∈ {subscribe, error}` frames are never forwarded.
pub fn parse_okx(raw: &Value) -> Option<ParsedEvent> {
    if raw.get("event").is_some() {
        return None;
    }

    let arg = raw.get("arg")?;
    let channel = arg.get("channel")?.as_str()?;
    let data = raw.get("data")?.as_array()?;
    let first = data.first()?;
    let inst_id = first.get("instId").and_then(Value::as_str).or_else(|| arg.get("instId").and_then(Value::as_str))?;

    let event_kind = match channel {
        "tickers" => EventKind::Ticker,
        "funding-rate" => EventKind::FundingRate,
        _ => return None,
    };

    Some(ParsedEvent {
        canonical_symbol: canonicalize(Venue::Okx, inst_id),
        event_kind,
        wire_event_type: channel.to_string(),
        raw: raw.clone(),
    })
}

pub fn parse(venue: Venue, raw: &Value) -> Option<ParsedEvent> {
    match venue {
        Venue::BinanceFutures => parse_binance(raw),
        Venue::Okx => parse_okx(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syms(names: &[&str]) -> Vec<CanonicalSymbol> {
        names.iter().map(|n| CanonicalSymbol(n.to_string())).collect()
    }

    #[test]
    fn binance_batches_respect_batch_size_and_monotonic_id() {
        let symbols = (0..60).map(|i| format!("SYM{i}USDT")).collect::<Vec<_>>();
        let symbols: Vec<_> = symbols.iter().map(|s| CanonicalSymbol(s.clone())).collect();
        // 60 symbols * 2 streams = 120 streams -> ceil(120/50) = 3 batches.
        let frames = binance_subscribe_batches(&symbols, 1);
        assert_eq!(frames.len(), 3);
        let ids: Vec<u64> = frames
            .iter()
            .map(|f| serde_json::from_str::<Value>(f).unwrap()["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn okx_batches_emit_ticker_and_funding_rate_per_symbol() {
        let frames = okx_subscribe_batches(&syms(&["BTCUSDT"]));
        assert_eq!(frames.len(), 1);
        let parsed: Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(parsed["op"], "subscribe");
        assert_eq!(parsed["args"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["args"][0]["instId"], "BTC-USDT-SWAP");
    }

    #[test]
    fn parse_binance_ticker() {
        let raw: Value = serde_json::json!({"e": "24hrTicker", "s": "BTCUSDT", "c": "60010"});
        let parsed = parse_binance(&raw).unwrap();
        assert_eq!(parsed.canonical_symbol, CanonicalSymbol("BTCUSDT".into()));
        assert!(matches!(parsed.event_kind, EventKind::Ticker));
    }

    #[test]
    fn parse_binance_ack_is_filtered() {
        let raw: Value = serde_json::json!({"result": null, "id": 1});
        assert!(parse_binance(&raw).is_none());
    }

    #[test]
    fn parse_okx_funding_rate_canonicalizes_symbol() {
        let raw: Value = serde_json::json!({
            "arg": {"channel": "funding-rate", "instId": "BTC-USDT-SWAP"},
            "data": [{"instId": "BTC-USDT-SWAP", "fundingRate": "0.00012"}]
        });
        let parsed = parse_okx(&raw).unwrap();
        assert_eq!(parsed.canonical_symbol, CanonicalSymbol("BTCUSDT".into()));
        assert!(matches!(parsed.event_kind, EventKind::FundingRate));
    }

    #[test]
    fn parse_okx_event_frame_is_filtered() {
        let raw: Value = serde_json::json!({"event": "subscribe", "arg": {"channel": "tickers"}});
        assert!(parse_okx(&raw).is_none());
    }

    #[test]
    fn to_wire_symbol_round_trips_for_okx() {
        let canon = CanonicalSymbol("BTCUSDT".into());
        assert_eq!(to_wire_symbol(Venue::Okx, &canon), "BTC-USDT-SWAP");
        assert_eq!(
            canonicalize(Venue::Okx, &to_wire_symbol(Venue::Okx, &canon)),
            canon
        );
    }
}
