//! Record types threaded through the five pipeline stages S1-S5 (spec.md §3 / §4.5).

use crate::symbol::CanonicalSymbol;
use crate::venue::Venue;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// The kind of market-data event a venue can emit.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Ticker,
    MarkPrice,
    FundingRate,
    /// Sourced out-of-band from venue B's REST settlement poller (a collaborator, §6); the
    /// pipeline only consumes its output. See SPEC_FULL.md §3.
    FundingSettlement,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Ticker => "ticker",
            EventKind::MarkPrice => "mark_price",
            EventKind::FundingRate => "funding_rate",
            EventKind::FundingSettlement => "funding_settlement",
        }
    }
}

/// Raw event emitted by a [`Connection`](crate::connection::Connection), immutable once produced.
#[derive(Clone, Debug)]
pub struct RawEvent {
    pub venue: Venue,
    pub canonical_symbol: CanonicalSymbol,
    pub event_kind: EventKind,
    pub wire_event_type: String,
    pub raw: Value,
    pub ingest_instant: DateTime<Utc>,
}

/// `event_type_key` used to look up a [`crate::pipeline::extract::Descriptor`] in S1.
///
/// Spec.md §4.5: `venue + "_" + event_kind`, with the one special case that
/// `funding_settlement` always maps to `B_funding_settlement` regardless of which venue
/// variant tagged the raw event (it is sourced exclusively from venue B).
pub fn event_type_key(venue: Venue, event_kind: EventKind) -> &'static str {
    match (venue, event_kind) {
        (_, EventKind::FundingSettlement) => "binance_funding_settlement",
        (Venue::Okx, EventKind::Ticker) => "okx_ticker",
        (Venue::Okx, EventKind::FundingRate) => "okx_funding_rate",
        (Venue::Okx, EventKind::MarkPrice) => "okx_mark_price",
        (Venue::BinanceFutures, EventKind::Ticker) => "binance_ticker",
        (Venue::BinanceFutures, EventKind::MarkPrice) => "binance_mark_price",
        (Venue::BinanceFutures, EventKind::FundingRate) => "binance_funding_rate",
    }
}

/// S1 output: one per raw event that survived extraction.
#[derive(Clone, Debug)]
pub struct Extracted {
    pub event_type_key: &'static str,
    pub venue: Venue,
    pub canonical_symbol: CanonicalSymbol,
    pub fields: HashMap<&'static str, Value>,
}

/// S2 output: one record per `(venue, canonical_symbol)`.
#[derive(Clone, Debug, Default)]
pub struct Fused {
    pub contract_name: String,
    pub latest_price: Option<f64>,
    pub funding_rate: Option<f64>,
    pub last_settlement_ts: Option<i64>,
    pub current_settlement_ts: Option<i64>,
    pub next_settlement_ts: Option<i64>,
}

/// Per-venue settlement timestamps/strings carried by [`Aligned`].
#[derive(Clone, Debug, Default)]
pub struct VenueTimes {
    pub last_ts: Option<i64>,
    pub last_str: Option<String>,
    pub current_ts: Option<i64>,
    pub current_str: Option<String>,
    pub next_ts: Option<i64>,
    pub next_str: Option<String>,
}

/// S3 output: one record per canonical symbol present on both venues.
#[derive(Clone, Debug, Default)]
pub struct Aligned {
    pub symbol: CanonicalSymbol,
    pub okx_contract_name: String,
    pub binance_contract_name: String,
    pub okx_price: Option<f64>,
    pub okx_funding_rate: Option<f64>,
    pub okx_times: VenueTimes,
    pub binance_price: Option<f64>,
    pub binance_funding_rate: Option<f64>,
    pub binance_times: VenueTimes,
}

/// S4 output: [`Aligned`] enriched with derived per-venue fields.
#[derive(Clone, Debug, Default)]
pub struct PerVenueComputed {
    pub aligned: Aligned,
    pub okx_next_interval_secs: Option<i64>,
    pub binance_next_interval_secs: Option<i64>,
    pub okx_price_sma: Option<f64>,
    pub binance_price_sma: Option<f64>,
}

/// S5 output: the final record delivered to the downstream consumer.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FinalRecord {
    pub symbol: String,
    pub okx_price: Option<f64>,
    pub binance_price: Option<f64>,
    pub okx_funding_rate: Option<f64>,
    pub binance_funding_rate: Option<f64>,
    pub funding_rate_spread: Option<f64>,
    pub price_basis: Option<f64>,
    pub okx_current_settlement: Option<String>,
    pub okx_next_settlement: Option<String>,
    pub okx_last_settlement: Option<String>,
    pub binance_current_settlement: Option<String>,
    pub binance_next_settlement: Option<String>,
    pub binance_last_settlement: Option<String>,
    pub okx_next_interval_secs: Option<i64>,
    pub binance_next_interval_secs: Option<i64>,
    pub okx_price_sma: Option<f64>,
    pub binance_price_sma: Option<f64>,
}
