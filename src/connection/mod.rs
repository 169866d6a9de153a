//! C1: a single venue WebSocket connection — master, warm standby, or monitor (spec.md §4.1).

pub mod wire;

use crate::config::timing;
use crate::error::ConnectionError;
use crate::pipeline::model::RawEvent;
use crate::symbol::CanonicalSymbol;
use crate::transport::{WsEvent, WsSink, WsSource, WsTransport};
use crate::venue::Venue;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant as TokioInstant;
use tracing::{debug, info, warn};

/// The part a connection plays within its venue's pool.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Role {
    Master,
    WarmStandby,
    Monitor,
}

/// A read-only view of a connection's lifecycle, derived from its live [`ConnFlags`] rather
/// than stored redundantly — there is exactly one source of truth for "is this socket up".
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
    Active,
}

/// Shared between [`Connection`] and its background [`receive_loop`]; the loop owns the only
/// writer for `last_message_instant`/`messages_received`, the pool-facing methods own the rest.
#[derive(Debug)]
struct ConnFlags {
    connected: bool,
    subscribed: bool,
    is_active: bool,
    last_message_instant: Option<Instant>,
    reconnect_count: u32,
    messages_received: u64,
}

impl Default for ConnFlags {
    fn default() -> Self {
        Self {
            connected: false,
            subscribed: false,
            is_active: false,
            last_message_instant: None,
            reconnect_count: 0,
            messages_received: 0,
        }
    }
}

/// Snapshot returned by [`Connection::health`], matching the shape spec.md §4.1 requires for
/// status reporting.
#[derive(Clone, Debug, Serialize)]
pub struct ConnectionHealth {
    pub connected: bool,
    pub subscribed: bool,
    pub is_active: bool,
    pub symbols_count: usize,
    pub seconds_since_last_message: Option<u64>,
    pub reconnect_count: u32,
    pub messages_received: u64,
}

impl ConnectionHealth {
    pub fn state(&self) -> ConnState {
        match (self.connected, self.subscribed, self.is_active) {
            (false, _, _) => ConnState::Disconnected,
            (true, false, _) => ConnState::Connected,
            (true, true, false) => ConnState::Subscribed,
            (true, true, true) => ConnState::Active,
        }
    }
}

/// One venue WebSocket connection. Sends go through the owned [`WsSink`] half directly; a
/// spawned task owns the [`WsSource`] half and feeds parsed events onto `data_tx`, following
/// the teacher's split-sink/source pattern for independent read/write lifetimes without
/// wrapping the transport itself in a mutex.
pub struct Connection {
    pub venue: Venue,
    pub role: Role,
    pub index: usize,
    symbols: Vec<CanonicalSymbol>,
    ws_url: String,
    transport: Arc<dyn WsTransport>,
    sink: Option<Box<dyn WsSink>>,
    recv_task: Option<JoinHandle<()>>,
    flags: Arc<Mutex<ConnFlags>>,
    next_request_id: u64,
    data_tx: mpsc::UnboundedSender<RawEvent>,
    /// Set by `connect()` for a warm standby: the instant its staggered heartbeat subscribe
    /// becomes due (spec.md §4.1: `10 + 5·index` seconds after connect). Cleared once that
    /// subscribe is sent, or by `disconnect()` ("cancels pending delayed-subscribe"), so a
    /// torn-down standby never fires a stale subscribe after being reused for another role.
    /// `tokio::time::Instant` rather than `std::time::Instant` so tests can exercise the
    /// stagger under a paused/auto-advancing clock instead of sleeping in real wall time.
    subscribe_due_at: Option<TokioInstant>,
}

impl Connection {
    pub fn new(
        venue: Venue,
        role: Role,
        index: usize,
        ws_url: impl Into<String>,
        transport: Arc<dyn WsTransport>,
        data_tx: mpsc::UnboundedSender<RawEvent>,
    ) -> Self {
        Self {
            venue,
            role,
            index,
            symbols: Vec::new(),
            ws_url: ws_url.into(),
            transport,
            sink: None,
            recv_task: None,
            flags: Arc::new(Mutex::new(ConnFlags::default())),
            next_request_id: 1,
            data_tx,
            subscribe_due_at: None,
        }
    }

    pub fn symbols(&self) -> &[CanonicalSymbol] {
        &self.symbols
    }

    /// Record the symbol slice this connection is meant to own without subscribing — used when
    /// `connect()` itself fails during pool initialization, so the monitor-scheduling loop's
    /// failover algorithm still knows which slice to hand to a promoted standby (spec.md §4.2's
    /// "partial success is acceptable" clause: a master that never came up is still a master
    /// slot, not a missing one).
    pub(crate) fn set_intended_symbols(&mut self, symbols: Vec<CanonicalSymbol>) {
        self.symbols = symbols;
    }

    /// Dial the venue and spawn the background receive loop. Idempotent-unsafe: calling this
    /// twice on an already-connected instance leaks the previous receive task, so callers (the
    /// pool) only ever call it once per logical socket lifetime.
    pub async fn connect(&mut self) -> Result<(), ConnectionError> {
        let (sink, source) = self.transport.connect(&self.ws_url, timing::CONNECT_TIMEOUT).await?;
        self.sink = Some(sink);
        self.flags.lock().connected = true;

        let flags = self.flags.clone();
        let venue = self.venue;
        let data_tx = self.data_tx.clone();
        self.recv_task = Some(tokio::spawn(receive_loop(source, venue, flags, data_tx)));

        if self.role == Role::WarmStandby {
            self.subscribe_due_at = Some(TokioInstant::now() + timing::standby_subscribe_delay(self.index));
        }

        info!(venue = %self.venue, role = ?self.role, index = self.index, "connection established");
        Ok(())
    }

    /// Whether this warm standby's staggered heartbeat subscribe has become due and has not
    /// already been sent. Polled by the pool's monitor tick for standbys reconnected outside
    /// `initialize()`, so a redial never skips the rate-limit stagger (spec.md §4.1/§5).
    pub fn standby_subscribe_due(&self) -> bool {
        self.role == Role::WarmStandby
            && !self.flags.lock().subscribed
            && self.subscribe_due_at.is_some_and(|due| TokioInstant::now() >= due)
    }

    /// Blocks until this connection's staggered standby delay elapses, for the concurrent
    /// initial spin-up path where each standby's future owns it exclusively and can simply wait
    /// out its own stagger without holding up any sibling connection's initialization.
    pub(crate) async fn wait_for_standby_delay(&self) {
        if let Some(due) = self.subscribe_due_at {
            tokio::time::sleep_until(due).await;
        }
    }

    /// Subscribe to `symbols`, batched and rate-limited per spec.md §5.
    pub async fn subscribe(&mut self, symbols: Vec<CanonicalSymbol>) -> Result<(), ConnectionError> {
        let frames = match self.venue {
            Venue::BinanceFutures => wire::binance_subscribe_batches(&symbols, self.next_request_id),
            Venue::Okx => wire::okx_subscribe_batches(&symbols),
        };
        self.next_request_id += frames.len() as u64;

        for frame in frames {
            self.send(frame).await?;
            tokio::time::sleep(timing::SUBSCRIBE_BATCH_SLEEP).await;
        }

        self.symbols = symbols;
        self.subscribe_due_at = None;
        let mut flags = self.flags.lock();
        flags.subscribed = true;
        flags.is_active = self.role == Role::Master;
        Ok(())
    }

    /// Unsubscribe from every symbol currently held by this connection. A no-op if already
    /// bare, so callers can call it unconditionally before a role switch.
    pub async fn unsubscribe(&mut self) -> Result<(), ConnectionError> {
        if self.symbols.is_empty() {
            return Ok(());
        }

        let frames = match self.venue {
            Venue::BinanceFutures => wire::binance_unsubscribe_batches(&self.symbols, self.next_request_id),
            Venue::Okx => wire::okx_unsubscribe_batches(&self.symbols),
        };
        self.next_request_id += frames.len() as u64;

        for frame in frames {
            self.send(frame).await?;
            tokio::time::sleep(timing::UNSUBSCRIBE_BATCH_SLEEP).await;
        }

        self.symbols.clear();
        self.flags.lock().subscribed = false;
        Ok(())
    }

    async fn send(&mut self, frame: String) -> Result<(), ConnectionError> {
        let sink = self.sink.as_mut().ok_or(ConnectionError::NotConnected)?;
        sink.send_text(frame).await
    }

    /// Promote/demote this connection under failover, re-subscribing to `new_symbols` under
    /// `new_role`. Monitor connections never change role — they exist to detect outages, not
    /// to absorb traffic (spec.md §4.2).
    pub async fn switch_role(&mut self, new_role: Role, new_symbols: Vec<CanonicalSymbol>) -> Result<(), ConnectionError> {
        if self.role == Role::Monitor || new_role == Role::Monitor {
            return Err(ConnectionError::InvalidRoleTransition { from: self.role, to: new_role });
        }

        self.unsubscribe().await?;
        self.role = new_role;
        self.subscribe(new_symbols).await
    }

    /// Tear down the socket and background task. Safe to call on an already-disconnected
    /// connection.
    pub async fn disconnect(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            sink.close().await;
        }
        if let Some(task) = self.recv_task.take() {
            task.abort();
        }
        self.subscribe_due_at = None;

        let mut flags = self.flags.lock();
        flags.connected = false;
        flags.subscribed = false;
        flags.is_active = false;
        // A fresh socket has sent nothing yet; without this a master reconnected bare (before
        // its resubscribe lands) would immediately read as stale again on the next monitor tick
        // and loop into a reconnect storm.
        flags.last_message_instant = None;
    }

    pub fn health(&self) -> ConnectionHealth {
        let flags = self.flags.lock();
        ConnectionHealth {
            connected: flags.connected,
            subscribed: flags.subscribed,
            is_active: flags.is_active,
            symbols_count: self.symbols.len(),
            seconds_since_last_message: flags.last_message_instant.map(|t| t.elapsed().as_secs()),
            reconnect_count: flags.reconnect_count,
            messages_received: flags.messages_received,
        }
    }

    /// Record that this connection has been torn down and redialed, for the pool's standby
    /// selection heuristic (spec.md §4.2: prefer fewer prior reconnects).
    pub fn note_reconnect(&mut self) {
        self.flags.lock().reconnect_count += 1;
    }
}

/// Owns the read half of a connection's transport for its whole lifetime. Parses every text
/// frame, drops acks/heartbeats venue-side (see [`wire::parse`]), and forwards survivors.
async fn receive_loop(
    mut source: Box<dyn WsSource>,
    venue: Venue,
    flags: Arc<Mutex<ConnFlags>>,
    data_tx: mpsc::UnboundedSender<RawEvent>,
) {
    loop {
        match source.recv().await {
            Some(Ok(WsEvent::Text(text))) => {
                let now = Instant::now();
                {
                    let mut f = flags.lock();
                    f.last_message_instant = Some(now);
                    f.messages_received += 1;
                }

                let raw: Value = match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(err) => {
                        warn!(%venue, %err, "dropping unparseable frame");
                        continue;
                    }
                };

                if let Some(parsed) = wire::parse(venue, &raw) {
                    let event = RawEvent {
                        venue,
                        canonical_symbol: parsed.canonical_symbol,
                        event_kind: parsed.event_kind,
                        wire_event_type: parsed.wire_event_type,
                        raw: parsed.raw,
                        ingest_instant: Utc::now(),
                    };
                    if data_tx.send(event).is_err() {
                        debug!(%venue, "data channel closed, stopping receive loop");
                        return;
                    }
                }
            }
            Some(Ok(WsEvent::Closed)) | None => {
                flags.lock().connected = false;
                debug!(%venue, "socket closed");
                return;
            }
            Some(Err(err)) => {
                warn!(%venue, %err, "transport error, stopping receive loop");
                flags.lock().connected = false;
                return;
            }
        }
    }
}
