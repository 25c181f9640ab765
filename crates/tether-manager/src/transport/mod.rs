//! The seam between the manager and the wire.
//!
//! A [`Transport`] dials an endpoint and hands back a [`TransportLink`]: a
//! writer for outbound text and a receiver of inbound [`TransportFrame`]s.
//! The manager owns every link it receives; nothing outside the crate can
//! reach one.

pub mod memory;
pub mod websocket;

use std::sync::Arc;

use async_trait::async_trait;
use tether_core::{ConnectionConfig, TransportError};
use tokio::sync::mpsc;

pub use memory::{MemoryPeer, MemoryTransport, OpenBehavior};
pub use websocket::WebSocketTransport;

/// What to dial.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenRequest {
    /// Address to dial.
    pub endpoint: String,
    /// Sub-protocols to offer.
    pub sub_protocols: Vec<String>,
}

impl From<&ConnectionConfig> for OpenRequest {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            sub_protocols: config.sub_protocols.clone(),
        }
    }
}

/// Inbound event produced by a live link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportFrame {
    /// A text frame.
    Text(String),
    /// A non-fatal error report.
    Error(String),
    /// The link is gone. No frames follow.
    Closed {
        /// Close code, if the peer sent one.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },
}

/// Write half of a live link.
///
/// Writes are non-blocking: implementations hand the text to their own
/// writer task and report failure only when the link is already gone.
pub trait LinkWriter: Send + Sync {
    /// Queue a text frame for the peer.
    fn send_text(&self, text: &str) -> Result<(), TransportError>;

    /// Start a close handshake. Idempotent.
    fn close(&self, code: u16, reason: &str);

    /// Whether writes can still succeed.
    fn is_open(&self) -> bool;
}

/// An established link.
pub struct TransportLink {
    /// Outbound half.
    pub writer: Arc<dyn LinkWriter>,
    /// Inbound frames, ending with [`TransportFrame::Closed`].
    pub frames: mpsc::UnboundedReceiver<TransportFrame>,
}

impl std::fmt::Debug for TransportLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportLink").finish_non_exhaustive()
    }
}

/// Something that can dial endpoints.
///
/// `open` resolving is the transport's "open" event; returning an error is
/// its "error before open". The manager applies the connect timeout.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Dial `request.endpoint`.
    async fn open(&self, request: OpenRequest) -> Result<TransportLink, TransportError>;
}
