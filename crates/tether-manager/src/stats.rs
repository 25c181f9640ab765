//! Read-only snapshot of the manager.

use serde::Serialize;

use crate::manager::ManagerInner;
use crate::record::ConnectionState;

/// Counts across every record in the table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    /// Records in the table.
    pub total: usize,
    /// Records with a live link.
    pub open: usize,
    /// Records opening or reconnecting.
    pub connecting: usize,
    /// Records mid-close.
    pub closing: usize,
    /// Records without a link (reconnect pending, or dropped without reconnect).
    pub closed: usize,
    /// Per-connection listeners, including ones registered ahead of `connect`.
    pub total_listeners: usize,
    /// Global listeners.
    pub global_listeners: usize,
    /// Messages waiting in queues.
    pub total_queued_messages: usize,
}

impl ConnectionStats {
    fn count(&mut self, state: ConnectionState, queued: usize) {
        self.total += 1;
        self.total_queued_messages += queued;
        match state {
            ConnectionState::Connecting => self.connecting += 1,
            ConnectionState::Open => self.open += 1,
            ConnectionState::Closing => self.closing += 1,
            ConnectionState::Closed => self.closed += 1,
        }
    }
}

impl ManagerInner {
    pub(crate) fn stats(&self) -> ConnectionStats {
        let mut stats = ConnectionStats::default();
        {
            let table = self.records.lock();
            for record in table.values() {
                stats.count(record.state(), record.queued());
            }
        }
        stats.total_listeners = self.dispatcher.total_listeners();
        stats.global_listeners = self.dispatcher.global_listener_count();
        stats
    }

    /// Open records, for the active-connections gauge.
    pub(crate) fn open_count(&self) -> usize {
        self.records
            .lock()
            .values()
            .filter(|r| r.state() == ConnectionState::Open)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_by_state() {
        let mut stats = ConnectionStats::default();
        stats.count(ConnectionState::Open, 0);
        stats.count(ConnectionState::Closed, 3);
        stats.count(ConnectionState::Connecting, 1);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.open, 1);
        assert_eq!(stats.closed, 1);
        assert_eq!(stats.connecting, 1);
        assert_eq!(stats.total_queued_messages, 4);
    }

    #[test]
    fn serializes_camel_case() {
        let value = serde_json::to_value(ConnectionStats::default()).unwrap();
        assert_eq!(value["totalQueuedMessages"], 0);
        assert_eq!(value["globalListeners"], 0);
    }
}
