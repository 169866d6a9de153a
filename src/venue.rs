use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Identifies one of the two perpetual-futures venues this service aggregates.
///
/// Named after the teacher crate's [`ExchangeId`](https://docs.rs/barter-data) enum: a
/// `Copy` identifier threaded through connections, the pool, and the pipeline rather than
/// a `String`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
#[serde(rename = "venue", rename_all = "snake_case")]
pub enum Venue {
    /// Venue A: OKX-style perpetual swaps, symbols like `BTC-USDT-SWAP`.
    Okx,
    /// Venue B: Binance-style USD-M futures, symbols like `BTCUSDT`.
    BinanceFutures,
}

impl Venue {
    pub const ALL: [Venue; 2] = [Venue::Okx, Venue::BinanceFutures];

    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Okx => "okx",
            Venue::BinanceFutures => "binance",
        }
    }

    /// Heartbeat symbol a warm standby subscribes to, as a canonical symbol string — callers
    /// pass this straight into [`CanonicalSymbol::from`](crate::symbol::CanonicalSymbol), so
    /// this must already be in canonical (venue B) form, not this venue's own wire format.
    pub fn heartbeat_symbol(&self) -> &'static str {
        "BTCUSDT"
    }
}

impl Display for Venue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_as_str() {
        for venue in Venue::ALL {
            assert_eq!(venue.to_string(), venue.as_str());
        }
    }
}
