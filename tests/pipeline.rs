//! End-to-end pipeline scenarios driven entirely through public types (spec.md §8): raw
//! venue events in, fused/aligned/computed records out, via [`Store::update_market_data`] so
//! the C4 fan-out boundary is exercised too, not just the pipeline in isolation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use venue_sync::pipeline::model::{EventKind, RawEvent};
use venue_sync::pipeline::{Consumer, FinalRecord, Pipeline};
use venue_sync::store::Store;
use venue_sync::symbol::canonicalize;
use venue_sync::venue::Venue;

#[derive(Default)]
struct RecordingConsumer {
    records: Mutex<Vec<FinalRecord>>,
    count: AtomicU64,
}

#[async_trait]
impl Consumer for RecordingConsumer {
    async fn on_final_record(&self, record: FinalRecord) {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.records.lock().unwrap().push(record);
    }
}

fn okx_event(kind: EventKind, inst_id: &str, raw: serde_json::Value) -> RawEvent {
    RawEvent {
        venue: Venue::Okx,
        canonical_symbol: canonicalize(Venue::Okx, inst_id),
        event_kind: kind,
        wire_event_type: "test".into(),
        raw,
        ingest_instant: Utc::now(),
    }
}

fn binance_event(kind: EventKind, symbol: &str, raw: serde_json::Value) -> RawEvent {
    RawEvent {
        venue: Venue::BinanceFutures,
        canonical_symbol: canonicalize(Venue::BinanceFutures, symbol),
        event_kind: kind,
        wire_event_type: "test".into(),
        raw,
        ingest_instant: Utc::now(),
    }
}

#[tokio::test]
async fn okx_and_binance_events_fuse_into_a_single_final_record() {
    let consumer = Arc::new(RecordingConsumer::default());
    let pipeline = Arc::new(Pipeline::new(consumer.clone()));
    let store = Arc::new(Store::new(pipeline));

    store
        .update_market_data(okx_event(
            EventKind::Ticker,
            "BTC-USDT-SWAP",
            json!({"arg": {"channel": "tickers", "instId": "BTC-USDT-SWAP"}, "data": [{"instId": "BTC-USDT-SWAP", "last": "65000.5"}]}),
        ))
        .await
        .unwrap();
    store
        .update_market_data(okx_event(
            EventKind::FundingRate,
            "BTC-USDT-SWAP",
            json!({"arg": {"channel": "funding-rate", "instId": "BTC-USDT-SWAP"}, "data": [{"instId": "BTC-USDT-SWAP", "fundingRate": "0.0001", "fundingTime": 1700000000000_i64, "nextFundingTime": 1700028800000_i64}]}),
        ))
        .await
        .unwrap();
    store
        .update_market_data(binance_event(
            EventKind::MarkPrice,
            "BTCUSDT",
            json!({"s": "BTCUSDT", "r": "0.00012", "T": 1700028800000_i64}),
        ))
        .await
        .unwrap();

    assert_eq!(consumer.count.load(Ordering::SeqCst), 1);
    let records = consumer.records.lock().unwrap();
    let record = &records[0];
    assert_eq!(record.okx_price, Some(65000.5));
    assert_eq!(record.okx_funding_rate, Some(0.0001));
    assert_eq!(record.binance_funding_rate, Some(0.00012));
    assert!(record.funding_rate_spread.is_some());
}

#[tokio::test]
async fn binance_mark_price_without_okx_data_emits_nothing() {
    let consumer = Arc::new(RecordingConsumer::default());
    let pipeline = Arc::new(Pipeline::new(consumer.clone()));
    let store = Arc::new(Store::new(pipeline));

    store
        .update_market_data(binance_event(
            EventKind::MarkPrice,
            "ETHUSDT",
            json!({"s": "ETHUSDT", "r": "0.0001", "T": 1700028800000_i64}),
        ))
        .await
        .unwrap();

    assert_eq!(consumer.count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn distinct_symbols_produce_independent_records() {
    let consumer = Arc::new(RecordingConsumer::default());
    let pipeline = Arc::new(Pipeline::new(consumer.clone()));
    let store = Arc::new(Store::new(pipeline));

    for (sym_okx, sym_bin) in [("BTC-USDT-SWAP", "BTCUSDT"), ("ETH-USDT-SWAP", "ETHUSDT")] {
        store
            .update_market_data(okx_event(
                EventKind::Ticker,
                sym_okx,
                json!({"arg": {"channel": "tickers", "instId": sym_okx}, "data": [{"instId": sym_okx, "last": "100.0"}]}),
            ))
            .await
            .unwrap();
        store
            .update_market_data(binance_event(
                EventKind::MarkPrice,
                sym_bin,
                json!({"s": sym_bin, "r": "0.0001", "T": 1700028800000_i64}),
            ))
            .await
            .unwrap();
    }

    assert_eq!(consumer.count.load(Ordering::SeqCst), 2);
    let records = consumer.records.lock().unwrap();
    let symbols: std::collections::HashSet<_> = records.iter().map(|r| r.symbol.clone()).collect();
    assert_eq!(symbols.len(), 2);
}
