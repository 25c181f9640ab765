//! In-process transport with a scriptable peer.
//!
//! Used by the test suites and by embedders that want to exercise
//! connection handling without a network. Each `open` consumes the next
//! scripted [`OpenBehavior`] (falling back to a default), and every accepted
//! link is exposed as a [`MemoryPeer`] the caller can drive.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tether_core::TransportError;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{LinkWriter, OpenRequest, Transport, TransportFrame, TransportLink};

/// How the next `open` call behaves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpenBehavior {
    /// Complete the handshake immediately.
    Accept,
    /// Fail with [`TransportError::Connect`].
    Fail(String),
    /// Never complete (exercises connect timeouts and cancellation).
    Hang,
}

struct MemoryState {
    script: VecDeque<OpenBehavior>,
    fallback: OpenBehavior,
    attempts: Vec<(Instant, OpenRequest)>,
    peers: Vec<MemoryPeer>,
}

/// Scriptable in-memory [`Transport`].
#[derive(Clone)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    /// Transport that accepts every open.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                script: VecDeque::new(),
                fallback: OpenBehavior::Accept,
                attempts: Vec::new(),
                peers: Vec::new(),
            })),
        }
    }

    /// Queue a behaviour for the next unscripted `open`.
    pub fn push_behavior(&self, behavior: OpenBehavior) {
        self.state.lock().script.push_back(behavior);
    }

    /// Behaviour used once the script is empty.
    pub fn set_fallback(&self, behavior: OpenBehavior) {
        self.state.lock().fallback = behavior;
    }

    /// Number of `open` calls so far.
    pub fn attempts(&self) -> usize {
        self.state.lock().attempts.len()
    }

    /// When each `open` call happened.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.state.lock().attempts.iter().map(|(at, _)| *at).collect()
    }

    /// Every request seen, in order.
    pub fn requests(&self) -> Vec<OpenRequest> {
        self.state
            .lock()
            .attempts
            .iter()
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Every accepted link, in order.
    pub fn peers(&self) -> Vec<MemoryPeer> {
        self.state.lock().peers.clone()
    }

    /// The most recently accepted link.
    pub fn last_peer(&self) -> Option<MemoryPeer> {
        self.state.lock().peers.last().cloned()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, request: OpenRequest) -> Result<TransportLink, TransportError> {
        let behavior = {
            let mut state = self.state.lock();
            state.attempts.push((Instant::now(), request.clone()));
            state
                .script
                .pop_front()
                .unwrap_or_else(|| state.fallback.clone())
        };

        match behavior {
            OpenBehavior::Accept => {
                let (tx, rx) = mpsc::unbounded_channel();
                let peer = MemoryPeer {
                    shared: Arc::new(PeerShared {
                        endpoint: request.endpoint,
                        written: Mutex::new(Vec::new()),
                        write_budget: Mutex::new(None),
                        closed_with: Mutex::new(None),
                        open: AtomicBool::new(true),
                        frames: tx,
                    }),
                };
                self.state.lock().peers.push(peer.clone());
                Ok(TransportLink {
                    writer: Arc::new(MemoryWriter {
                        shared: Arc::clone(&peer.shared),
                    }),
                    frames: rx,
                })
            }
            OpenBehavior::Fail(reason) => Err(TransportError::Connect(reason)),
            OpenBehavior::Hang => std::future::pending().await,
        }
    }
}

struct PeerShared {
    endpoint: String,
    written: Mutex<Vec<String>>,
    write_budget: Mutex<Option<usize>>,
    closed_with: Mutex<Option<(u16, String)>>,
    open: AtomicBool,
    frames: mpsc::UnboundedSender<TransportFrame>,
}

impl PeerShared {
    fn shut(&self, code: Option<u16>, reason: &str) -> bool {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.frames.send(TransportFrame::Closed {
                code,
                reason: reason.to_owned(),
            });
            true
        } else {
            false
        }
    }
}

/// Server side of an accepted in-memory link.
#[derive(Clone)]
pub struct MemoryPeer {
    shared: Arc<PeerShared>,
}

impl MemoryPeer {
    /// Endpoint this link was opened for.
    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    /// Text frames the client wrote, in order.
    pub fn written(&self) -> Vec<String> {
        self.shared.written.lock().clone()
    }

    /// Written frames parsed as JSON (non-JSON frames are skipped).
    pub fn written_json(&self) -> Vec<serde_json::Value> {
        self.shared
            .written
            .lock()
            .iter()
            .filter_map(|t| serde_json::from_str(t).ok())
            .collect()
    }

    /// Deliver a text frame to the client.
    pub fn push_text(&self, text: impl Into<String>) -> bool {
        self.shared.open.load(Ordering::SeqCst)
            && self
                .shared
                .frames
                .send(TransportFrame::Text(text.into()))
                .is_ok()
    }

    /// Report a non-fatal transport error to the client.
    pub fn push_error(&self, message: impl Into<String>) {
        let _ = self
            .shared
            .frames
            .send(TransportFrame::Error(message.into()));
    }

    /// Drop the link from the server side.
    pub fn drop_link(&self, code: Option<u16>, reason: &str) {
        let _ = self.shared.shut(code, reason);
    }

    /// Allow `n` more writes; the next one closes the link and fails.
    pub fn fail_writes_after(&self, n: usize) {
        *self.shared.write_budget.lock() = Some(n);
    }

    /// Whether the link is still open.
    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Code and reason of a client-initiated close.
    pub fn closed_with(&self) -> Option<(u16, String)> {
        self.shared.closed_with.lock().clone()
    }
}

struct MemoryWriter {
    shared: Arc<PeerShared>,
}

impl LinkWriter for MemoryWriter {
    fn send_text(&self, text: &str) -> Result<(), TransportError> {
        if !self.shared.open.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let exhausted = {
            let mut budget = self.shared.write_budget.lock();
            match budget.as_mut() {
                Some(remaining) if *remaining == 0 => true,
                Some(remaining) => {
                    *remaining -= 1;
                    false
                }
                None => false,
            }
        };
        if exhausted {
            let _ = self.shared.shut(Some(1006), "write failed");
            return Err(TransportError::Send("peer stopped reading".into()));
        }
        self.shared.written.lock().push(text.to_owned());
        Ok(())
    }

    fn close(&self, code: u16, reason: &str) {
        if self.shared.shut(Some(code), reason) {
            *self.shared.closed_with.lock() = Some((code, reason.to_owned()));
        }
    }

    fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }
}
