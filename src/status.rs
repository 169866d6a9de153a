//! C6: periodic health snapshot writer (spec.md §4.6).
//!
//! Every monitor-loop tick, [`StatusReporter::report`] writes the venue's current
//! [`PoolHealthSnapshot`] under `(venue, "websocket_pool")` and appends any new
//! [`FailoverRecord`]s under `(venue, "failover_history")`. The reporter itself holds no
//! state — it is a thin write path invoked from [`crate::pool_manager`]'s monitor-scheduling
//! loop, one call per venue per tick.

use crate::pool::{FailoverRecord, PoolHealthSnapshot};
use crate::store::Store;
use std::sync::Arc;

pub struct StatusReporter {
    store: Arc<Store>,
}

impl StatusReporter {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Record one tick's worth of status: the pool's current health snapshot, plus any
    /// failovers that occurred this tick.
    pub fn report(&self, snapshot: PoolHealthSnapshot, failovers: Vec<FailoverRecord>) {
        for record in failovers {
            self.store.record_failover(record);
        }
        self.store.record_pool_health(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionHealth;
    use crate::pipeline::{CountingConsumer, Pipeline};
    use crate::venue::Venue;
    use chrono::Utc;

    fn empty_health() -> ConnectionHealth {
        ConnectionHealth { connected: false, subscribed: false, is_active: false, symbols_count: 0, seconds_since_last_message: None, reconnect_count: 0, messages_received: 0 }
    }

    #[test]
    fn report_writes_health_and_failovers() {
        let pipeline = Arc::new(Pipeline::new(Arc::new(CountingConsumer::default())));
        let store = Arc::new(Store::new(pipeline));
        let reporter = StatusReporter::new(store.clone());

        let snapshot = PoolHealthSnapshot { venue: Venue::Okx, instant: Utc::now(), masters: vec![empty_health()], warm_standbys: vec![], monitor: empty_health() };
        let failover = FailoverRecord { venue: Venue::Okx, instant: Utc::now(), master_index: 0, promoted_symbols_count: 3, reason: "stale".into() };

        reporter.report(snapshot, vec![failover]);

        assert!(store.get_pool_health(Venue::Okx).is_some());
        assert_eq!(store.get_failover_history(Venue::Okx).len(), 1);
    }
}
