//! S1 — extract. Dispatches on `event_type_key` and walks a static path into `raw`
//! (spec.md §4.5). One [`Descriptor`] per wire event shape; only a null/missing value at the
//! *symbol* path discards the record — an individual field missing at its own path is carried
//! through as an absent entry, matching the original's `step1_filter.py` (only `data_source`
//! traversal failure drops the record; each mapped field is read independently and defaults to
//! `None` when absent).

use crate::pipeline::model::{event_type_key, Extracted, RawEvent};
use serde_json::Value;
use tracing::{debug, warn};

/// One step of a path traversed into a [`serde_json::Value`]: either an object key or an array
/// index (OKX's `data` arrays are always read at index 0 — spec.md's venue A schema).
#[derive(Clone, Copy, Debug)]
pub enum PathStep {
    Key(&'static str),
    Index(usize),
}

/// Where to read one field from, and what to call it in the [`Extracted`] output.
pub struct FieldSpec {
    pub output_name: &'static str,
    pub path: &'static [PathStep],
}

/// The static shape of one wire event: a symbol path plus the fields to pull out of it.
pub struct Descriptor {
    pub symbol_path: &'static [PathStep],
    pub fields: &'static [FieldSpec],
}

fn walk<'a>(raw: &'a Value, path: &[PathStep]) -> Option<&'a Value> {
    let mut cursor = raw;
    for step in path {
        cursor = match step {
            PathStep::Key(key) => cursor.get(key)?,
            PathStep::Index(idx) => cursor.get(idx)?,
        };
        if cursor.is_null() {
            return None;
        }
    }
    Some(cursor)
}

use PathStep::{Index as Ix, Key as K};

const OKX_TICKER: Descriptor = Descriptor {
    symbol_path: &[K("arg"), K("instId")],
    fields: &[
        FieldSpec { output_name: "contract_name", path: &[K("arg"), K("instId")] },
        FieldSpec { output_name: "latest_price", path: &[K("data"), Ix(0), K("last")] },
    ],
};

const OKX_FUNDING_RATE: Descriptor = Descriptor {
    symbol_path: &[K("arg"), K("instId")],
    fields: &[
        FieldSpec { output_name: "contract_name", path: &[K("arg"), K("instId")] },
        FieldSpec { output_name: "funding_rate", path: &[K("data"), Ix(0), K("fundingRate")] },
        FieldSpec { output_name: "current_settlement_ts", path: &[K("data"), Ix(0), K("fundingTime")] },
        FieldSpec { output_name: "next_settlement_ts", path: &[K("data"), Ix(0), K("nextFundingTime")] },
    ],
};

const BINANCE_TICKER: Descriptor = Descriptor {
    symbol_path: &[K("s")],
    fields: &[
        FieldSpec { output_name: "contract_name", path: &[K("s")] },
        FieldSpec { output_name: "latest_price", path: &[K("c")] },
    ],
};

const BINANCE_MARK_PRICE: Descriptor = Descriptor {
    symbol_path: &[K("s")],
    fields: &[
        FieldSpec { output_name: "contract_name", path: &[K("s")] },
        FieldSpec { output_name: "funding_rate", path: &[K("r")] },
        FieldSpec { output_name: "current_settlement_ts", path: &[K("T")] },
    ],
};

const BINANCE_FUNDING_SETTLEMENT: Descriptor = Descriptor {
    symbol_path: &[K("s")],
    fields: &[
        FieldSpec { output_name: "contract_name", path: &[K("s")] },
        FieldSpec { output_name: "last_settlement_ts", path: &[K("T")] },
    ],
};

fn descriptor_for(event_type_key: &str) -> Option<&'static Descriptor> {
    match event_type_key {
        "okx_ticker" => Some(&OKX_TICKER),
        "okx_funding_rate" => Some(&OKX_FUNDING_RATE),
        "binance_ticker" => Some(&BINANCE_TICKER),
        "binance_mark_price" => Some(&BINANCE_MARK_PRICE),
        "binance_funding_settlement" => Some(&BINANCE_FUNDING_SETTLEMENT),
        _ => None,
    }
}

/// Extract one [`Extracted`] record from a [`RawEvent`], or `None` if the wire payload has no
/// symbol at the descriptor's `symbol_path`. A field missing at its own path is simply absent
/// from the result's `fields` map — downstream stages already treat an absent field the same as
/// a null one.
pub fn extract(event: &RawEvent) -> Option<Extracted> {
    let key = event_type_key(event.venue, event.event_kind);
    let descriptor = descriptor_for(key)?;

    if walk(&event.raw, descriptor.symbol_path).is_none() {
        warn!(%key, symbol = %event.canonical_symbol, "dropping event: symbol path missing");
        return None;
    }

    let mut fields = std::collections::HashMap::with_capacity(descriptor.fields.len());
    for field in descriptor.fields {
        match walk(&event.raw, field.path) {
            Some(value) => {
                fields.insert(field.output_name, value.clone());
            }
            None => {
                debug!(%key, field = field.output_name, symbol = %event.canonical_symbol, "field missing at path, carrying record with field absent");
            }
        }
    }

    Some(Extracted {
        event_type_key: key,
        venue: event.venue,
        canonical_symbol: event.canonical_symbol.clone(),
        fields,
    })
}
