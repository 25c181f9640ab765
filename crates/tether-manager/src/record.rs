//! Per-connection state owned by the manager.
//!
//! A record lives in the manager's table from `connect` until it is closed,
//! fails its first open, or exhausts its reconnect attempts. Its mutable part
//! sits behind a short `parking_lot` lock that is never held across an
//! `.await` or while listeners run.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tether_core::{ConnectionConfig, ConnectionId};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::queue::{MessageQueue, SendOutcome};
use crate::transport::LinkWriter;

/// Where a connection is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Opening (first attempt or a reconnect).
    Connecting,
    /// Link is live.
    Open,
    /// A caller-requested close is in progress.
    Closing,
    /// No live link; a reconnect may be pending.
    Closed,
}

impl ConnectionState {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner of a scheduled task; dropping it cancels the task.
pub(crate) struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    /// Handle whose token is cancelled with `parent` or on drop.
    pub(crate) fn child_of(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
        }
    }

    /// Token the scheduled task waits on.
    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

pub(crate) struct RecordInner {
    pub(crate) state: ConnectionState,
    pub(crate) link: Option<Arc<dyn LinkWriter>>,
    /// Bumped on every successful open; frames from older links are ignored.
    pub(crate) generation: u64,
    pub(crate) reconnect_attempts: u32,
    pub(crate) queue: MessageQueue,
    pub(crate) is_closing: bool,
    /// A terminal `close` already went out for the current link.
    pub(crate) close_reported: bool,
    pub(crate) last_activity_at: Instant,
    pub(crate) reconnect_timer: Option<TimerHandle>,
    pub(crate) heartbeat_timer: Option<TimerHandle>,
}

impl RecordInner {
    fn touch(&mut self) {
        self.last_activity_at = Instant::now();
    }

    fn live_link(&self) -> Option<&Arc<dyn LinkWriter>> {
        match (&self.state, &self.link) {
            (ConnectionState::Open, Some(link)) => Some(link),
            _ => None,
        }
    }
}

pub(crate) struct ConnectionRecord {
    pub(crate) id: ConnectionId,
    pub(crate) config: ConnectionConfig,
    /// Cancelled when the record leaves the table; parent of its timers.
    pub(crate) cancel: CancellationToken,
    pub(crate) inner: Mutex<RecordInner>,
}

impl ConnectionRecord {
    pub(crate) fn new(id: ConnectionId, config: ConnectionConfig, parent: &CancellationToken) -> Self {
        let queue = MessageQueue::new(config.message_queue_capacity);
        Self {
            id,
            config,
            cancel: parent.child_token(),
            inner: Mutex::new(RecordInner {
                state: ConnectionState::Connecting,
                link: None,
                generation: 0,
                reconnect_attempts: 0,
                queue,
                is_closing: false,
                close_reported: false,
                last_activity_at: Instant::now(),
                reconnect_timer: None,
                heartbeat_timer: None,
            }),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub(crate) fn queued(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub(crate) fn touch(&self) {
        self.inner.lock().touch();
    }

    /// Write live when open, otherwise queue.
    ///
    /// A failed live write falls back to the queue so the message goes out
    /// after the next open.
    pub(crate) fn send(&self, text: String) -> SendOutcome {
        let mut inner = self.inner.lock();
        let written = inner
            .live_link()
            .is_some_and(|link| link.send_text(&text).is_ok());
        if written {
            inner.touch();
            return SendOutcome::Sent;
        }
        match inner.queue.push(text) {
            Ok(()) => SendOutcome::Queued,
            Err(reason) => SendOutcome::Dropped(reason),
        }
    }

    /// Write only to a live link; never queues.
    pub(crate) fn send_live(&self, text: &str) -> bool {
        let mut inner = self.inner.lock();
        let sent = inner
            .live_link()
            .is_some_and(|link| link.send_text(text).is_ok());
        if sent {
            inner.touch();
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::DropReason;
    use crate::transport::{MemoryTransport, OpenRequest, Transport};

    fn record(config: ConnectionConfig) -> ConnectionRecord {
        ConnectionRecord::new("feed".into(), config, &CancellationToken::new())
    }

    #[test]
    fn new_record_is_connecting() {
        let r = record(ConnectionConfig::new("mem://feed"));
        assert_eq!(r.state(), ConnectionState::Connecting);
        assert_eq!(r.queued(), 0);
        assert_eq!(ConnectionState::Closing.to_string(), "closing");
    }

    #[test]
    fn send_without_link_queues_or_drops() {
        let queued = record(ConnectionConfig::new("mem://feed").with_queue_capacity(1));
        assert_eq!(queued.send("m1".into()), SendOutcome::Queued);
        assert_eq!(
            queued.send("m2".into()),
            SendOutcome::Dropped(DropReason::QueueFull)
        );

        let unqueued = record(ConnectionConfig::new("mem://feed"));
        assert_eq!(
            unqueued.send("m1".into()),
            SendOutcome::Dropped(DropReason::QueueDisabled)
        );
        assert!(!unqueued.send_live("ping"));
    }

    #[tokio::test(start_paused = true)]
    async fn live_send_touches_activity() {
        let transport = MemoryTransport::new();
        let link = transport
            .open(OpenRequest {
                endpoint: "mem://feed".into(),
                sub_protocols: Vec::new(),
            })
            .await
            .unwrap();
        let r = record(ConnectionConfig::new("mem://feed").with_queue_capacity(4));
        {
            let mut inner = r.inner.lock();
            inner.link = Some(link.writer);
            inner.state = ConnectionState::Open;
        }
        let before = r.inner.lock().last_activity_at;
        tokio::time::advance(std::time::Duration::from_secs(5)).await;

        assert_eq!(r.send("hello".into()), SendOutcome::Sent);
        assert!(r.inner.lock().last_activity_at > before);
        assert!(r.send_live("ping"));

        let peer = transport.last_peer().unwrap();
        assert_eq!(peer.written(), vec!["hello".to_string(), "ping".to_string()]);

        peer.drop_link(Some(1006), "gone");
        assert_eq!(r.send("later".into()), SendOutcome::Queued);
        assert!(!r.send_live("ping"));
    }

    #[test]
    fn dropping_timer_handle_cancels_token() {
        let parent = CancellationToken::new();
        let handle = TimerHandle::child_of(&parent);
        let token = handle.token();
        drop(handle);
        assert!(token.is_cancelled());
        assert!(!parent.is_cancelled());
    }
}
