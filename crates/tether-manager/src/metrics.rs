//! Metric names recorded through the `metrics` facade.
//!
//! The library only records; installing an exporter is up to the binary.

/// Successful opens, first attempts and reconnects alike (counter).
pub const CONNECTIONS_OPENED_TOTAL: &str = "tether_connections_opened_total";
/// Closes (counter, labels: reason = requested | dropped | idle | exhausted | failed).
pub const CONNECTIONS_CLOSED_TOTAL: &str = "tether_connections_closed_total";
/// Open links (gauge).
pub const CONNECTIONS_ACTIVE: &str = "tether_connections_active";
/// Reconnect attempts started (counter).
pub const RECONNECT_ATTEMPTS_TOTAL: &str = "tether_reconnect_attempts_total";
/// Connections that gave up reconnecting (counter).
pub const RECONNECTS_EXHAUSTED_TOTAL: &str = "tether_reconnects_exhausted_total";
/// Idle connections closed by the monitor (counter).
pub const IDLE_EVICTIONS_TOTAL: &str = "tether_idle_evictions_total";
/// Messages written to a live link (counter).
pub const MESSAGES_SENT_TOTAL: &str = "tether_messages_sent_total";
/// Messages held in a queue (counter).
pub const MESSAGES_QUEUED_TOTAL: &str = "tether_messages_queued_total";
/// Messages discarded (counter, labels: reason).
pub const MESSAGES_DROPPED_TOTAL: &str = "tether_messages_dropped_total";
/// Connects rejected because the table was full (counter).
pub const CAPACITY_REJECTIONS_TOTAL: &str = "tether_capacity_rejections_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_prefixed_and_unique() {
        let names = [
            CONNECTIONS_OPENED_TOTAL,
            CONNECTIONS_CLOSED_TOTAL,
            CONNECTIONS_ACTIVE,
            RECONNECT_ATTEMPTS_TOTAL,
            RECONNECTS_EXHAUSTED_TOTAL,
            IDLE_EVICTIONS_TOTAL,
            MESSAGES_SENT_TOTAL,
            MESSAGES_QUEUED_TOTAL,
            MESSAGES_DROPPED_TOTAL,
            CAPACITY_REJECTIONS_TOTAL,
        ];
        let unique: std::collections::HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
        assert!(names.iter().all(|n| n.starts_with("tether_")));
    }
}
