//! Reaction to an unexpected link loss: schedule a backoff retry, or give
//! up and retire the record.
//!
//! Only records configured with `reconnect` and not being closed by the
//! caller are retried. A failed reconnect attempt (transport error or
//! connect timeout) is handled exactly like another drop.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tether_core::backoff::{ReconnectDecision, next_reconnect};
use tether_core::{CloseInfo, ConnectionError, ConnectionEvent};
use tracing::{debug, info, warn};

use crate::manager::ManagerInner;
use crate::metrics::{CONNECTIONS_CLOSED_TOTAL, RECONNECTS_EXHAUSTED_TOTAL, RECONNECT_ATTEMPTS_TOTAL};
use crate::record::{ConnectionRecord, ConnectionState, TimerHandle};

impl ManagerInner {
    /// The link of `generation` is gone without the caller asking.
    pub(crate) fn handle_link_closed(
        self: &Arc<Self>,
        record: &Arc<ConnectionRecord>,
        generation: u64,
        code: Option<u16>,
        reason: &str,
    ) {
        let decision = {
            let mut inner = record.inner.lock();
            if inner.generation != generation || inner.is_closing || record.cancel.is_cancelled() {
                return;
            }
            inner.link = None;
            inner.heartbeat_timer = None;
            inner.state = ConnectionState::Closed;

            if record.config.reconnect {
                let decision = next_reconnect(
                    inner.reconnect_attempts,
                    record.config.max_reconnect_attempts,
                    record.config.reconnect_interval_ms,
                    self.settings.max_reconnect_delay_ms,
                );
                if let ReconnectDecision::Retry { delay, .. } = decision {
                    inner.reconnect_timer = Some(self.schedule_reconnect(record, delay));
                }
                Some(decision)
            } else {
                inner.close_reported = true;
                None
            }
        };
        self.update_active_gauge();

        let reason = reason.to_owned();
        match decision {
            None => {
                info!(conn_id = %record.id, code, reason = %reason, "connection dropped");
                counter!(CONNECTIONS_CLOSED_TOTAL, "reason" => "dropped").increment(1);
                self.dispatcher.emit(
                    &record.id,
                    &ConnectionEvent::Close(CloseInfo {
                        code,
                        reason,
                        will_reconnect: false,
                        exhausted: false,
                    }),
                );
            }
            Some(ReconnectDecision::Retry { attempt, delay }) => {
                #[allow(clippy::cast_possible_truncation)]
                let delay_ms = delay.as_millis() as u64;
                info!(conn_id = %record.id, code, attempt, delay_ms, "connection dropped, scheduling reconnect");
                self.dispatcher.emit(
                    &record.id,
                    &ConnectionEvent::Close(CloseInfo {
                        code,
                        reason,
                        will_reconnect: true,
                        exhausted: false,
                    }),
                );
            }
            Some(ReconnectDecision::Exhausted { attempts }) => {
                let _ = self.remove_if_current(record);
                record.cancel.cancel();
                let err = ConnectionError::ReconnectExhausted {
                    id: record.id.to_string(),
                    attempts,
                };
                warn!(conn_id = %record.id, attempts, code = err.code(), "{err}");
                counter!(RECONNECTS_EXHAUSTED_TOTAL).increment(1);
                counter!(CONNECTIONS_CLOSED_TOTAL, "reason" => "exhausted").increment(1);
                self.dispatcher.emit(
                    &record.id,
                    &ConnectionEvent::Close(CloseInfo {
                        code,
                        reason,
                        will_reconnect: false,
                        exhausted: true,
                    }),
                );
                let _ = self.dispatcher.clear_connection(&record.id);
            }
        }
    }

    /// Arm the reconnect timer. The attempt runs once `delay` elapses unless
    /// the returned handle is dropped first.
    fn schedule_reconnect(self: &Arc<Self>, record: &Arc<ConnectionRecord>, delay: Duration) -> TimerHandle {
        let handle = TimerHandle::child_of(&record.cancel);
        let token = handle.token();
        let weak = Arc::downgrade(self);
        let record = Arc::clone(record);
        let _ = tokio::spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
            if let Some(manager) = weak.upgrade() {
                manager.reconnect(&record).await;
            }
        });
        handle
    }

    async fn reconnect(self: &Arc<Self>, record: &Arc<ConnectionRecord>) {
        let attempt = {
            let mut inner = record.inner.lock();
            if inner.is_closing || record.cancel.is_cancelled() || inner.state != ConnectionState::Closed {
                return;
            }
            // The timer has fired; releasing its handle only cancels a token
            // nothing waits on any more.
            inner.reconnect_timer = None;
            inner.reconnect_attempts += 1;
            inner.state = ConnectionState::Connecting;
            inner.reconnect_attempts
        };
        info!(conn_id = %record.id, attempt, max = record.config.max_reconnect_attempts, "reconnecting");
        counter!(RECONNECT_ATTEMPTS_TOTAL).increment(1);

        match self.establish(record).await {
            Ok(link) => {
                if self.attach(record, link) {
                    info!(conn_id = %record.id, attempt, "reconnected");
                }
            }
            Err(ConnectionError::Cancelled { .. }) => {
                debug!(conn_id = %record.id, attempt, "reconnect cancelled");
            }
            Err(err) => {
                warn!(conn_id = %record.id, attempt, error = %err, "reconnect attempt failed");
                self.dispatcher
                    .emit(&record.id, &ConnectionEvent::Error { message: err.to_string() });
                let generation = record.inner.lock().generation;
                self.handle_link_closed(record, generation, None, &err.to_string());
            }
        }
    }
}
