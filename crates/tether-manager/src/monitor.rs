//! Periodic idle eviction and resource-pressure checks.
//!
//! Every `monitor_interval` the monitor closes non-reconnecting connections
//! that have been quiet for longer than `idle_timeout`, logs a stats
//! snapshot, and consults the [`ResourceProbe`]. Critical pressure closes
//! everything. `connect` also runs the idle sweep inline when the table is
//! full.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::manager::ManagerInner;
use crate::metrics::IDLE_EVICTIONS_TOTAL;
use crate::record::TimerHandle;
use crate::stats::ConnectionStats;

/// Close reason used for idle evictions.
pub const IDLE_TIMEOUT_REASON: &str = "Idle timeout";

/// Whether a connection should be evicted as idle.
///
/// Reconnecting connections are never idle-evicted; their liveness is
/// governed by the reconnect policy.
pub fn is_idle(reconnect: bool, last_activity_at: Instant, now: Instant, idle_timeout: Duration) -> bool {
    !reconnect && now.saturating_duration_since(last_activity_at) > idle_timeout
}

/// Resource pressure reported by a [`ResourceProbe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pressure {
    /// Carry on.
    Normal,
    /// Close every connection.
    Critical,
}

/// Consulted by the monitor on every pass.
pub trait ResourceProbe: Send + Sync {
    /// Judge the current snapshot.
    fn check(&self, stats: &ConnectionStats) -> Pressure;
}

/// Critical once more than `threshold` messages sit in queues.
#[derive(Clone, Copy, Debug)]
pub struct QueuedMessagesProbe {
    threshold: usize,
}

impl QueuedMessagesProbe {
    /// Probe with the given threshold.
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }
}

impl ResourceProbe for QueuedMessagesProbe {
    fn check(&self, stats: &ConnectionStats) -> Pressure {
        if stats.total_queued_messages > self.threshold {
            Pressure::Critical
        } else {
            Pressure::Normal
        }
    }
}

impl ManagerInner {
    /// Close every idle non-reconnecting record. Returns how many were closed.
    pub(crate) fn sweep_idle(&self) -> usize {
        let now = Instant::now();
        let idle_timeout = self.settings.idle_timeout();
        let idle: Vec<_> = {
            let table = self.records.lock();
            table
                .values()
                .filter_map(|record| {
                    let last = record.inner.lock().last_activity_at;
                    is_idle(record.config.reconnect, last, now, idle_timeout)
                        .then(|| (record.id.clone(), now.saturating_duration_since(last)))
                })
                .collect()
        };

        let mut evicted = 0;
        for (id, quiet) in idle {
            if self.close_record(&id, 1000, IDLE_TIMEOUT_REASON, "idle") {
                #[allow(clippy::cast_possible_truncation)]
                let idle_ms = quiet.as_millis() as u64;
                info!(conn_id = %id, idle_ms, "closed idle connection");
                counter!(IDLE_EVICTIONS_TOTAL).increment(1);
                evicted += 1;
            }
        }
        evicted
    }

    /// Start the monitor loop unless it is already running.
    pub(crate) fn ensure_monitor(self: &Arc<Self>) {
        let mut monitor = self.monitor.lock();
        if monitor.is_some() {
            return;
        }
        let handle = TimerHandle::child_of(&self.shutdown);
        let token = handle.token();
        let weak = Arc::downgrade(self);
        let period = self.settings.monitor_interval();

        let _ = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                manager.monitor_pass();
            }
            debug!("connection monitor stopped");
        });

        *monitor = Some(handle);
        debug!(period_ms = self.settings.monitor_interval_ms, "connection monitor started");
    }

    pub(crate) fn stop_monitor(&self) {
        // Dropping the handle cancels the loop.
        let _ = self.monitor.lock().take();
    }

    fn monitor_pass(&self) {
        let evicted = self.sweep_idle();
        let stats = self.stats();
        debug!(
            total = stats.total,
            open = stats.open,
            connecting = stats.connecting,
            closed = stats.closed,
            queued = stats.total_queued_messages,
            listeners = stats.total_listeners,
            evicted,
            "connection stats"
        );

        if let Some(probe) = &self.probe {
            if probe.check(&stats) == Pressure::Critical {
                warn!(
                    total = stats.total,
                    queued = stats.total_queued_messages,
                    "critical resource pressure, closing all connections"
                );
                self.close_all();
            }
        }
    }
}
