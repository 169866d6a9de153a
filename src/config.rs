//! C7: URL catalog, timing constants, and process configuration.
//!
//! The venue URL/timing catalog is compile-time constant (the source material hard-codes it
//! too — see `websocket_pool/config.py` in the original implementation); only the handful of
//! secrets and the HTTP listen port are read from the environment, once, at startup.

use std::env;
use std::time::Duration;

use crate::venue::Venue;

/// Per-venue pool shape and endpoint, the compile-time half of C7.
#[derive(Copy, Clone, Debug)]
pub struct VenueCatalog {
    pub venue: Venue,
    pub ws_url: &'static str,
    pub masters: usize,
    pub standbys: usize,
    pub symbols_per_master: usize,
}

pub const CATALOG: &[VenueCatalog] = &[
    VenueCatalog {
        venue: Venue::Okx,
        ws_url: "wss://ws.okx.com:8443/ws/v5/public",
        masters: 3,
        standbys: 2,
        symbols_per_master: 300,
    },
    VenueCatalog {
        venue: Venue::BinanceFutures,
        ws_url: "wss://fstream.binance.com/ws",
        masters: 3,
        standbys: 2,
        symbols_per_master: 300,
    },
];

pub fn catalog_for(venue: Venue) -> &'static VenueCatalog {
    CATALOG
        .iter()
        .find(|entry| entry.venue == venue)
        .expect("every Venue variant has a VenueCatalog entry")
}

/// Timing constants from spec.md §5.
pub mod timing {
    use super::Duration;

    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const SOCKET_HEARTBEAT: Duration = Duration::from_secs(15);
    pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);
    pub const MONITOR_TICK: Duration = Duration::from_secs(3);
    pub const HEALTH_LOG_TICK: Duration = Duration::from_secs(30);
    pub const SUBSCRIBE_BATCH_SLEEP: Duration = Duration::from_millis(1_500);
    pub const UNSUBSCRIBE_BATCH_SLEEP: Duration = Duration::from_millis(1_000);
    pub const SUBSCRIBE_BATCH_SIZE: usize = 50;
    pub const STANDBY_BASE_DELAY_SECS: u64 = 10;
    pub const STANDBY_DELAY_STEP_SECS: u64 = 5;
    pub const FAILOVER_RECONNECT_PAUSE: Duration = Duration::from_secs(1);
    pub const MONITOR_INIT_MAX_ATTEMPTS: u32 = 3;

    /// Delay before warm standby at `index` within its pool subscribes to its heartbeat symbol.
    pub fn standby_subscribe_delay(index: usize) -> Duration {
        Duration::from_secs(STANDBY_BASE_DELAY_SECS + STANDBY_DELAY_STEP_SECS * index as u64)
    }

    /// Exponential back-off for monitor-connection init retries: `2^attempt` seconds.
    pub fn monitor_retry_backoff(attempt: u32) -> Duration {
        Duration::from_secs(2u64.saturating_pow(attempt))
    }
}

/// Runtime configuration sourced from the environment (§6).
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub app_url: Option<String>,
    pub access_password: Option<String>,
    /// The canonical symbol universe to subscribe both venues to. Symbol *discovery* is an
    /// external collaborator concern (spec.md §1); this is just the thin composition root's
    /// read of a static list so the pool has something to partition over.
    pub symbols: Vec<String>,
}

const DEFAULT_SYMBOLS: &[&str] = &["BTCUSDT", "ETHUSDT", "SOLUSDT"];

impl Config {
    /// Load configuration from the process environment. Never panics: every field has a
    /// sane default so the core can run (and be tested) without a configured environment.
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            app_url: env::var("APP_URL").ok(),
            access_password: env::var("ACCESS_PASSWORD").ok(),
            symbols: env::var("SYMBOLS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_uppercase()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_else(|| DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect()),
        }
    }
}
