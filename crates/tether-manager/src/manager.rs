//! The connection manager facade.
//!
//! [`ConnectionManager`] is a cheaply cloneable handle over shared state: the
//! connection table, the listener tables, and the monitor. Every background
//! task (link pump, heartbeat, reconnect timer, monitor) holds a child of the
//! manager's shutdown token, so dropping the last handle stops them all.
//!
//! Locking: the table lock may be taken before a record lock, never the
//! other way round. Neither is held across an `.await` or while listeners
//! run.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use metrics::{counter, gauge};
use parking_lot::Mutex;
use tether_core::{
    CloseInfo, ConnectionConfig, ConnectionError, ConnectionEvent, ConnectionId, EventKind,
    InboundMessage, OutboundMessage, Result,
};
use tether_settings::ManagerSettings;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatcher::{EventDispatcher, Subscription};
use crate::metrics::{
    CAPACITY_REJECTIONS_TOTAL, CONNECTIONS_ACTIVE, CONNECTIONS_CLOSED_TOTAL,
    CONNECTIONS_OPENED_TOTAL, MESSAGES_DROPPED_TOTAL, MESSAGES_QUEUED_TOTAL, MESSAGES_SENT_TOTAL,
};
use crate::monitor::{QueuedMessagesProbe, ResourceProbe};
use crate::queue::{DropReason, SendOutcome};
use crate::record::{ConnectionRecord, ConnectionState, TimerHandle};
use crate::stats::ConnectionStats;
use crate::transport::{OpenRequest, Transport, TransportFrame, TransportLink, WebSocketTransport};

/// Close code for a normal, caller-requested close.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Reason sent when the caller closes without one.
pub const DEFAULT_CLOSE_REASON: &str = "Client closed";
/// Code reported when a link ends without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;

// ─────────────────────────────────────────────────────────────────────────────
// Shared state
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) struct ManagerInner {
    pub(crate) settings: ManagerSettings,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) records: Mutex<HashMap<ConnectionId, Arc<ConnectionRecord>>>,
    pub(crate) dispatcher: EventDispatcher,
    pub(crate) monitor: Mutex<Option<TimerHandle>>,
    pub(crate) probe: Option<Arc<dyn ResourceProbe>>,
    pub(crate) shutdown: CancellationToken,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl ManagerInner {
    /// Open a link for `record`, bounded by the connect timeout and the
    /// record's lifetime.
    pub(crate) async fn establish(&self, record: &ConnectionRecord) -> Result<TransportLink> {
        let timeout = self.settings.connect_timeout();
        let request = OpenRequest::from(&record.config);
        tokio::select! {
            biased;
            () = record.cancel.cancelled() => Err(ConnectionError::Cancelled {
                id: record.id.to_string(),
            }),
            result = tokio::time::timeout(timeout, self.transport.open(request)) => match result {
                Ok(Ok(link)) => Ok(link),
                Ok(Err(e)) => Err(ConnectionError::Transport(e)),
                Err(_) => Err(ConnectionError::ConnectTimeout {
                    id: record.id.to_string(),
                    timeout_ms: self.settings.connect_timeout_ms,
                }),
            },
        }
    }

    /// Install a freshly opened link: mark the record open, flush its queue,
    /// start the heartbeat, emit `open`, then start the frame pump.
    ///
    /// Returns `false` (and closes the link) if the record was closed or
    /// superseded while the link was opening.
    pub(crate) fn attach(self: &Arc<Self>, record: &Arc<ConnectionRecord>, link: TransportLink) -> bool {
        let TransportLink { writer, frames } = link;
        let (generation, flushed, remaining) = {
            let mut inner = record.inner.lock();
            if inner.is_closing || record.cancel.is_cancelled() {
                drop(inner);
                writer.close(NORMAL_CLOSURE, DEFAULT_CLOSE_REASON);
                return false;
            }
            inner.generation += 1;
            inner.close_reported = false;
            inner.link = Some(Arc::clone(&writer));
            inner.state = ConnectionState::Open;
            inner.reconnect_attempts = 0;
            inner.reconnect_timer = None;
            inner.last_activity_at = Instant::now();

            let report = inner.queue.flush(|text| writer.send_text(text));
            inner.heartbeat_timer = record
                .config
                .heartbeat_interval()
                .map(|period| Self::start_heartbeat(record, period));
            (inner.generation, report.sent, report.remaining)
        };

        info!(conn_id = %record.id, endpoint = %record.config.endpoint, generation, "connection open");
        if flushed > 0 || remaining > 0 {
            debug!(conn_id = %record.id, flushed, remaining, "flushed queued messages");
        }
        counter!(CONNECTIONS_OPENED_TOTAL).increment(1);
        counter!(MESSAGES_SENT_TOTAL).increment(flushed as u64);
        self.dispatcher.emit(&record.id, &ConnectionEvent::Open);
        self.update_active_gauge();

        // Frames that arrived during the handshake wait in the channel until
        // `open` has been delivered.
        Self::spawn_pump(Arc::downgrade(self), Arc::clone(record), generation, frames);
        true
    }

    /// Forward inbound frames for one link generation to listeners.
    fn spawn_pump(
        weak: Weak<Self>,
        record: Arc<ConnectionRecord>,
        generation: u64,
        mut frames: mpsc::UnboundedReceiver<TransportFrame>,
    ) {
        let _ = tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    biased;
                    () = record.cancel.cancelled() => break,
                    frame = frames.recv() => frame,
                };
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                if record.inner.lock().generation != generation {
                    break;
                }
                match frame {
                    Some(TransportFrame::Text(raw)) => {
                        record.touch();
                        let payload = InboundMessage::parse(&raw);
                        let pong = payload.is_pong().then(|| ConnectionEvent::pong_from(&payload));
                        manager
                            .dispatcher
                            .emit(&record.id, &ConnectionEvent::Message { payload });
                        if let Some(pong) = pong {
                            debug!(conn_id = %record.id, "pong received");
                            manager.dispatcher.emit(&record.id, &pong);
                        }
                    }
                    Some(TransportFrame::Error(message)) => {
                        warn!(conn_id = %record.id, error = %message, "transport error");
                        manager
                            .dispatcher
                            .emit(&record.id, &ConnectionEvent::Error { message });
                    }
                    Some(TransportFrame::Closed { code, reason }) => {
                        manager.handle_link_closed(&record, generation, code, &reason);
                        break;
                    }
                    None => {
                        manager.handle_link_closed(
                            &record,
                            generation,
                            Some(ABNORMAL_CLOSURE),
                            "connection lost",
                        );
                        break;
                    }
                }
            }
        });
    }

    /// Remove `id` and tear it down. Returns `false` for unknown ids.
    ///
    /// `label` tags the closed-connections counter. A record whose drop was
    /// already reported as terminal is removed without a second `close`.
    pub(crate) fn close_record(&self, id: &str, code: u16, reason: &str, label: &'static str) -> bool {
        let Some(record) = self.records.lock().remove(id) else {
            return false;
        };

        let (link, already_reported) = {
            let mut inner = record.inner.lock();
            inner.is_closing = true;
            inner.state = ConnectionState::Closing;
            inner.reconnect_timer = None;
            inner.heartbeat_timer = None;
            (inner.link.take(), inner.close_reported)
        };
        if let Some(link) = link {
            link.close(code, reason);
        }
        {
            let mut inner = record.inner.lock();
            inner.state = ConnectionState::Closed;
            let dropped = inner.queue.len();
            inner.queue.clear();
            if dropped > 0 {
                debug!(conn_id = %record.id, dropped, "discarded queued messages on close");
            }
        }
        record.cancel.cancel();

        if already_reported {
            debug!(conn_id = %record.id, label, "removed dropped connection");
        } else {
            info!(conn_id = %record.id, code, reason, "connection closed");
            counter!(CONNECTIONS_CLOSED_TOTAL, "reason" => label).increment(1);
            self.dispatcher
                .emit(&record.id, &ConnectionEvent::Close(CloseInfo::requested(code, reason)));
        }
        let _ = self.dispatcher.clear_connection(&record.id);
        self.update_active_gauge();
        true
    }

    /// Close every record, drop global listeners, stop the monitor.
    pub(crate) fn close_all(&self) {
        let ids: Vec<ConnectionId> = self.records.lock().keys().cloned().collect();
        let count = ids.len();
        for id in ids {
            let _ = self.close_record(&id, NORMAL_CLOSURE, DEFAULT_CLOSE_REASON, "requested");
        }
        self.dispatcher.clear_global();
        self.stop_monitor();
        info!(closed = count, "closed all connections");
    }

    /// Remove `record` from the table if it is still the entry for its id.
    pub(crate) fn remove_if_current(&self, record: &Arc<ConnectionRecord>) -> bool {
        let mut table = self.records.lock();
        let current = table
            .get(&record.id)
            .is_some_and(|existing| Arc::ptr_eq(existing, record));
        if current {
            let _ = table.remove(&record.id);
        }
        current
    }

    /// Reserve a table slot for `id`, superseding any existing record.
    fn insert_record(&self, id: &ConnectionId, config: ConnectionConfig) -> Result<Arc<ConnectionRecord>> {
        let max = self.settings.max_connections;
        let occupied = |table: &HashMap<ConnectionId, Arc<ConnectionRecord>>| {
            table.len() - usize::from(table.contains_key(id))
        };

        if occupied(&self.records.lock()) >= max {
            let evicted = self.sweep_idle();
            debug!(conn_id = %id, evicted, "table full, ran idle sweep");
        }

        let mut table = self.records.lock();
        if occupied(&table) >= max {
            warn!(conn_id = %id, max, "connection limit reached");
            counter!(CAPACITY_REJECTIONS_TOTAL).increment(1);
            return Err(ConnectionError::CapacityExceeded { max });
        }
        if let Some(previous) = table.remove(id) {
            Self::supersede(&previous);
        }
        let record = Arc::new(ConnectionRecord::new(id.clone(), config, &self.shutdown));
        let _ = table.insert(id.clone(), Arc::clone(&record));
        Ok(record)
    }

    /// Retire a record replaced by a new `connect`. Listeners stay with the id
    /// and no event is emitted.
    fn supersede(record: &ConnectionRecord) {
        record.cancel.cancel();
        let link = {
            let mut inner = record.inner.lock();
            inner.is_closing = true;
            inner.reconnect_timer = None;
            inner.heartbeat_timer = None;
            inner.state = ConnectionState::Closed;
            inner.link.take()
        };
        if let Some(link) = link {
            link.close(NORMAL_CLOSURE, "Superseded");
        }
        debug!(conn_id = %record.id, "superseded existing connection record");
    }

    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn update_active_gauge(&self) {
        gauge!(CONNECTIONS_ACTIVE).set(self.open_count() as f64);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Public facade
// ─────────────────────────────────────────────────────────────────────────────

/// Bounded pool of named, self-healing connections.
///
/// Clones share state. Must be used from within a tokio runtime.
#[derive(Clone)]
pub struct ConnectionManager {
    pub(crate) inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager").finish_non_exhaustive()
    }
}

/// Builds a [`ConnectionManager`].
pub struct ConnectionManagerBuilder {
    settings: ManagerSettings,
    transport: Option<Arc<dyn Transport>>,
    probe: Option<Arc<dyn ResourceProbe>>,
}

impl ConnectionManagerBuilder {
    /// Use `transport` instead of WebSockets.
    #[must_use]
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Use `probe` for resource-pressure checks instead of the
    /// queued-messages probe derived from settings.
    #[must_use]
    pub fn resource_probe(mut self, probe: impl ResourceProbe + 'static) -> Self {
        self.probe = Some(Arc::new(probe));
        self
    }

    /// Finish building.
    ///
    /// Fails with [`ConnectionError::InvalidConfig`] when the settings carry
    /// values the timers cannot run with.
    pub fn build(self) -> Result<ConnectionManager> {
        self.settings
            .validate()
            .map_err(|e| ConnectionError::InvalidConfig(e.to_string()))?;
        let probe = self.probe.or_else(|| {
            self.settings
                .critical_queued_messages
                .map(|threshold| Arc::new(QueuedMessagesProbe::new(threshold)) as Arc<dyn ResourceProbe>)
        });
        Ok(ConnectionManager {
            inner: Arc::new(ManagerInner {
                transport: self
                    .transport
                    .unwrap_or_else(|| Arc::new(WebSocketTransport::new())),
                settings: self.settings,
                records: Mutex::new(HashMap::new()),
                dispatcher: EventDispatcher::new(),
                monitor: Mutex::new(None),
                probe,
                shutdown: CancellationToken::new(),
            }),
        })
    }
}

impl ConnectionManager {
    /// Manager dialing WebSockets with the given settings.
    pub fn new(settings: ManagerSettings) -> Result<Self> {
        Self::builder(settings).build()
    }

    /// Start building a manager.
    pub fn builder(settings: ManagerSettings) -> ConnectionManagerBuilder {
        ConnectionManagerBuilder {
            settings,
            transport: None,
            probe: None,
        }
    }

    /// Settings in effect.
    pub fn settings(&self) -> &ManagerSettings {
        &self.inner.settings
    }

    /// Open (or reuse) the connection named `id`.
    ///
    /// Resolves immediately if `id` is already open. Any other existing
    /// record for `id` is superseded; its pending `connect` fails with
    /// [`ConnectionError::Cancelled`]. Listeners registered for `id` are
    /// kept.
    pub async fn connect(
        &self,
        id: impl Into<ConnectionId>,
        config: ConnectionConfig,
    ) -> Result<ConnectionHandle> {
        let id = id.into();
        config.validate()?;
        self.inner.ensure_monitor();

        if self.inner.records.lock().get(&id).is_some_and(|r| r.state() == ConnectionState::Open) {
            debug!(conn_id = %id, "already open");
            return Ok(self.handle(id));
        }

        let record = self.inner.insert_record(&id, config)?;
        debug!(conn_id = %id, endpoint = %record.config.endpoint, "connecting");

        let outcome = match self.inner.establish(&record).await {
            Ok(link) => {
                if self.inner.attach(&record, link) {
                    Ok(())
                } else {
                    Err(ConnectionError::Cancelled { id: id.to_string() })
                }
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => Ok(self.handle(id)),
            Err(err @ ConnectionError::Cancelled { .. }) => {
                debug!(conn_id = %id, "connect cancelled");
                Err(err)
            }
            Err(err) => {
                warn!(conn_id = %id, error = %err, code = err.code(), "connect failed");
                self.inner
                    .dispatcher
                    .emit(&id, &ConnectionEvent::Error { message: err.to_string() });
                if self.inner.remove_if_current(&record) {
                    record.cancel.cancel();
                    let _ = self.inner.dispatcher.clear_connection(&id);
                    counter!(CONNECTIONS_CLOSED_TOTAL, "reason" => "failed").increment(1);
                }
                Err(err)
            }
        }
    }

    /// Send `message` to `id`. Returns `true` only if it was written live.
    pub fn send(&self, id: &str, message: impl Into<OutboundMessage>) -> bool {
        self.send_detailed(id, message).is_sent()
    }

    /// Send `message` to `id`, reporting exactly what happened to it.
    pub fn send_detailed(&self, id: &str, message: impl Into<OutboundMessage>) -> SendOutcome {
        let record = self.inner.records.lock().get(id).cloned();
        let outcome = match record {
            Some(record) => record.send(message.into().into_text()),
            None => SendOutcome::Dropped(DropReason::UnknownConnection),
        };
        match outcome {
            SendOutcome::Sent => counter!(MESSAGES_SENT_TOTAL).increment(1),
            SendOutcome::Queued => {
                debug!(conn_id = id, "message queued");
                counter!(MESSAGES_QUEUED_TOTAL).increment(1);
            }
            SendOutcome::Dropped(reason) => {
                debug!(conn_id = id, %reason, "message dropped");
                counter!(MESSAGES_DROPPED_TOTAL, "reason" => reason.to_string()).increment(1);
            }
        }
        outcome
    }

    /// Close `id` with code 1000. No-op for unknown ids.
    pub fn close(&self, id: &str) {
        self.close_with(id, NORMAL_CLOSURE, DEFAULT_CLOSE_REASON);
    }

    /// Close `id` with an explicit code and reason. No-op for unknown ids.
    pub fn close_with(&self, id: &str, code: u16, reason: &str) {
        let _ = self.inner.close_record(id, code, reason, "requested");
    }

    /// Close everything, drop global listeners and stop the monitor.
    ///
    /// The manager stays usable; the next `connect` restarts the monitor.
    pub fn close_all(&self) {
        self.inner.close_all();
    }

    /// Tear down for process exit.
    pub fn shutdown(&self) {
        info!("connection manager shutting down");
        self.close_all();
    }

    /// Listen for `kind` events on `id`. `id` need not exist yet.
    pub fn on<F>(&self, id: impl Into<ConnectionId>, kind: EventKind, callback: F) -> Subscription
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.inner
            .dispatcher
            .subscribe(id.into(), kind, Arc::new(callback))
    }

    /// Listen for `kind` events on every connection.
    pub fn on_global<F>(&self, kind: EventKind, callback: F) -> Subscription
    where
        F: Fn(&ConnectionId, &ConnectionEvent) + Send + Sync + 'static,
    {
        self.inner
            .dispatcher
            .subscribe_global(kind, Arc::new(callback))
    }

    /// Remove a listener. Idempotent.
    pub fn off(&self, subscription: &Subscription) {
        let _ = subscription.unsubscribe();
    }

    /// Snapshot of table and listener counts.
    pub fn get_stats(&self) -> ConnectionStats {
        self.inner.stats()
    }

    /// Current state of `id`.
    pub fn state(&self, id: &str) -> Option<ConnectionState> {
        self.inner.records.lock().get(id).map(|r| r.state())
    }

    /// Whether `id` has a live link.
    pub fn is_open(&self, id: &str) -> bool {
        self.state(id) == Some(ConnectionState::Open)
    }

    /// Ids currently in the table, sorted.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.inner.records.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn handle(&self, id: ConnectionId) -> ConnectionHandle {
        ConnectionHandle {
            id,
            manager: self.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Returned by `connect`; scopes manager operations to one id.
///
/// Holds no link. Once the connection is closed the handle's operations
/// behave as they do for an unknown id.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    manager: ConnectionManager,
}

impl ConnectionHandle {
    /// The connection's id.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// See [`ConnectionManager::send`].
    pub fn send(&self, message: impl Into<OutboundMessage>) -> bool {
        self.manager.send(&self.id, message)
    }

    /// See [`ConnectionManager::send_detailed`].
    pub fn send_detailed(&self, message: impl Into<OutboundMessage>) -> SendOutcome {
        self.manager.send_detailed(&self.id, message)
    }

    /// See [`ConnectionManager::close`].
    pub fn close(&self) {
        self.manager.close(&self.id);
    }

    /// Listen for `kind` events on this connection.
    pub fn on<F>(&self, kind: EventKind, callback: F) -> Subscription
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        self.manager.on(self.id.clone(), kind, callback)
    }

    /// Current state, or `None` once the record is gone.
    pub fn state(&self) -> Option<ConnectionState> {
        self.manager.state(&self.id)
    }

    /// Whether the link is live.
    pub fn is_open(&self) -> bool {
        self.manager.is_open(&self.id)
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle").field("id", &self.id).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryTransport, OpenBehavior};
    use assert_matches::assert_matches;
    use std::time::Duration;

    fn manager(transport: &MemoryTransport) -> ConnectionManager {
        ConnectionManager::builder(ManagerSettings::default())
            .transport(transport.clone())
            .build()
            .unwrap()
    }

    #[test]
    fn build_rejects_unusable_settings() {
        let settings = ManagerSettings {
            monitor_interval_ms: 0,
            ..ManagerSettings::default()
        };
        let err = ConnectionManager::builder(settings)
            .transport(MemoryTransport::new())
            .build()
            .unwrap_err();
        assert_matches!(err, ConnectionError::InvalidConfig(ref msg) if msg.contains("monitorIntervalMs"));

        let err = ConnectionManager::new(ManagerSettings {
            max_connections: 0,
            ..ManagerSettings::default()
        })
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_CONFIG");
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_config_rejected_before_dial() {
        let transport = MemoryTransport::new();
        let m = manager(&transport);
        let err = m.connect("feed", ConnectionConfig::new("")).await.unwrap_err();
        assert_matches!(err, ConnectionError::InvalidConfig(_));
        assert_eq!(transport.attempts(), 0);
        assert_eq!(m.get_stats().total, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_open_fast_path_does_not_redial() {
        let transport = MemoryTransport::new();
        let m = manager(&transport);
        let h1 = m.connect("feed", ConnectionConfig::new("mem://feed")).await.unwrap();
        let h2 = m.connect("feed", ConnectionConfig::new("mem://feed")).await.unwrap();
        assert_eq!(h1.id(), h2.id());
        assert_eq!(transport.attempts(), 1);
        assert!(h1.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn send_to_unknown_id_is_dropped() {
        let m = manager(&MemoryTransport::new());
        assert!(!m.send("nope", "hi"));
        assert_eq!(
            m.send_detailed("nope", "hi"),
            SendOutcome::Dropped(DropReason::UnknownConnection)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_removes_record_and_emits_error() {
        let transport = MemoryTransport::new();
        transport.push_behavior(OpenBehavior::Fail("refused".into()));
        let m = manager(&transport);
        let errors = Arc::new(Mutex::new(Vec::new()));
        let e = Arc::clone(&errors);
        let _ = m.on("feed", EventKind::Error, move |event| {
            if let ConnectionEvent::Error { message } = event {
                e.lock().push(message.clone());
            }
        });

        let err = m.connect("feed", ConnectionConfig::new("mem://feed")).await.unwrap_err();
        assert_matches!(err, ConnectionError::Transport(_));
        assert_eq!(errors.lock().len(), 1);
        assert!(m.state("feed").is_none());
        assert_eq!(m.get_stats().total_listeners, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_tears_down() {
        let transport = MemoryTransport::new();
        transport.push_behavior(OpenBehavior::Hang);
        let m = manager(&transport);
        let started = Instant::now();
        let err = m
            .connect("feed", ConnectionConfig::new("mem://feed").with_reconnect(true))
            .await
            .unwrap_err();
        assert_matches!(err, ConnectionError::ConnectTimeout { timeout_ms: 30_000, .. });
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(30) && waited < Duration::from_millis(30_005));
        assert!(m.connection_ids().is_empty());
        // No reconnect after a failed first attempt.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn close_is_idempotent_and_clears_listeners() {
        let transport = MemoryTransport::new();
        let m = manager(&transport);
        let closes = Arc::new(Mutex::new(Vec::new()));
        let c = Arc::clone(&closes);
        let _ = m.on("feed", EventKind::Close, move |event| {
            if let ConnectionEvent::Close(info) = event {
                c.lock().push(info.clone());
            }
        });
        let _ = m.connect("feed", ConnectionConfig::new("mem://feed")).await.unwrap();

        m.close("feed");
        m.close("feed");

        let closes = closes.lock();
        assert_eq!(closes.len(), 1);
        assert_eq!(closes[0], CloseInfo::requested(1000, "Client closed"));
        assert_eq!(m.get_stats().total_listeners, 0);
        let peer = transport.last_peer().unwrap();
        assert_eq!(peer.closed_with(), Some((1000, "Client closed".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn handle_scopes_operations() {
        let transport = MemoryTransport::new();
        let m = manager(&transport);
        let handle = m.connect("feed", ConnectionConfig::new("mem://feed")).await.unwrap();
        assert!(handle.send(serde_json::json!({"type": "hello"})));
        assert_eq!(handle.state(), Some(ConnectionState::Open));
        handle.close();
        assert_eq!(handle.state(), None);
        assert!(!handle.send("late"));
        assert_eq!(
            transport.last_peer().unwrap().written_json(),
            vec![serde_json::json!({"type": "hello"})]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_manager_stops_background_tasks() {
        let transport = MemoryTransport::new();
        let m = manager(&transport);
        let _ = m
            .connect("feed", ConnectionConfig::new("mem://feed").with_heartbeat_ms(1_000))
            .await
            .unwrap();
        let peer = transport.last_peer().unwrap();
        let token = m.inner.shutdown.clone();
        drop(m);
        assert!(token.is_cancelled());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(peer.written().is_empty());
    }
}
