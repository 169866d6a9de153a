use thiserror::Error;

/// Errors arising from a single venue [`Connection`](crate::connection::Connection).
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connect to {url} timed out after {timeout_secs}s")]
    ConnectTimeout { url: String, timeout_secs: u64 },

    #[error("invalid websocket url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("websocket handshake/io error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("failed to serialise subscription request: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("send on a closed or disconnected connection")]
    NotConnected,

    #[error("invalid switch_role transition: {from:?} -> {to:?}")]
    InvalidRoleTransition { from: crate::connection::Role, to: crate::connection::Role },
}

/// Errors arising from [`ExchangePool`](crate::pool::ExchangePool) orchestration. The monitor
/// connection is the only slot `initialize()` treats as fatal to the whole pool (spec.md
/// §4.2's mandatory post-check) — master/standby failures are independent and recoverable by
/// the next monitor tick, so they never surface as a [`PoolError`].
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("connection error during pool operation: {0}")]
    Connection(#[from] ConnectionError),
}

/// Errors the store propagates to its caller (it does not swallow these, per spec.md §7).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("poisoned lock for venue {0}")]
    Poisoned(String),
}

/// Pipeline stage failures. These are counted and swallowed at the pipeline boundary
/// (spec.md §7) — this type exists so stages can report *why*, not to propagate upward.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("malformed event while extracting {event_type_key}: {reason}")]
    Malformed { event_type_key: String, reason: String },

    #[error("downstream consumer callback failed: {0}")]
    Consumer(String),
}
