//! Application-level heartbeat.
//!
//! While a link is open, a `{"type":"ping","timestamp":…}` probe goes out
//! every period through the live write path. Replies are only surfaced as
//! `pong` events; liveness is judged by the idle monitor, not here.

use std::sync::Arc;
use std::time::Duration;

use tether_core::events::ping_message;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::manager::ManagerInner;
use crate::record::{ConnectionRecord, TimerHandle};

/// Tick every `period` (first tick one period from now) until `cancel`
/// fires. `beat` reports whether a probe went out; a skipped tick is not an
/// error. Returns the number of probes sent.
pub async fn run_heartbeat<F>(period: Duration, cancel: CancellationToken, mut beat: F) -> u64
where
    F: FnMut() -> bool,
{
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sent = 0;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return sent,
            _ = ticker.tick() => {
                if beat() {
                    sent += 1;
                } else {
                    trace!("heartbeat tick skipped, link not open");
                }
            }
        }
    }
}

impl ManagerInner {
    /// Spawn the heartbeat for an open record.
    pub(crate) fn start_heartbeat(record: &Arc<ConnectionRecord>, period: Duration) -> TimerHandle {
        let handle = TimerHandle::child_of(&record.cancel);
        let token = handle.token();
        let record = Arc::clone(record);
        let _ = tokio::spawn(async move {
            let sent = run_heartbeat(period, token, || {
                let ping = ping_message(chrono::Utc::now().timestamp_millis()).into_text();
                record.send_live(&ping)
            })
            .await;
            debug!(conn_id = %record.id, pings = sent, "heartbeat stopped");
        });
        handle
    }
}
