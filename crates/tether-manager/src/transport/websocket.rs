//! WebSocket transport over `tokio-tungstenite`.
//!
//! Each link runs two tasks: a writer draining an unbounded command channel
//! into the socket sink, and a reader forwarding socket messages as
//! [`TransportFrame`]s. Server pings are answered by tungstenite itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tether_core::TransportError;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use super::{LinkWriter, OpenRequest, Transport, TransportFrame, TransportLink};

/// Close code reported when the socket ends without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;

/// Dials `ws://` (and, with the `native-tls` feature, `wss://`) endpoints.
#[derive(Clone, Debug, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Create the transport.
    pub fn new() -> Self {
        Self
    }
}

enum Command {
    Text(String),
    Close(u16, String),
}

struct WebSocketWriter {
    tx: mpsc::UnboundedSender<Command>,
    open: Arc<AtomicBool>,
}

impl LinkWriter for WebSocketWriter {
    fn send_text(&self, text: &str) -> Result<(), TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.tx
            .send(Command::Text(text.to_owned()))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self, code: u16, reason: &str) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.tx.send(Command::Close(code, reason.to_owned()));
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, request: OpenRequest) -> Result<TransportLink, TransportError> {
        let mut http_request = request
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(format!("invalid endpoint: {e}")))?;

        if !request.sub_protocols.is_empty() {
            let value = HeaderValue::from_str(&request.sub_protocols.join(", "))
                .map_err(|e| TransportError::Connect(format!("invalid sub-protocol: {e}")))?;
            let _ = http_request
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, value);
        }

        let (ws, _response) = connect_async(http_request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        debug!(endpoint = %request.endpoint, "websocket handshake complete");

        let (mut sink, mut stream) = ws.split();
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
        let (frame_tx, frame_rx) = mpsc::unbounded_channel::<TransportFrame>();
        let open = Arc::new(AtomicBool::new(true));

        let writer_open = Arc::clone(&open);
        let writer_frames = frame_tx.clone();
        let _writer = tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                match cmd {
                    Command::Text(text) => {
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            warn!(error = %e, "websocket write failed");
                            writer_open.store(false, Ordering::SeqCst);
                            let _ = writer_frames.send(TransportFrame::Error(e.to_string()));
                            break;
                        }
                    }
                    Command::Close(code, reason) => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        };
                        let _ = sink.send(Message::Close(Some(frame))).await;
                        break;
                    }
                }
            }
        });

        let reader_open = Arc::clone(&open);
        let _reader = tokio::spawn(async move {
            let closed = loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        let _ = frame_tx.send(TransportFrame::Text(text.as_str().to_owned()));
                    }
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => {
                            let _ = frame_tx.send(TransportFrame::Text(text));
                        }
                        Err(_) => {
                            debug!(len = data.len(), "dropping non-UTF8 binary frame");
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(f) => TransportFrame::Closed {
                                code: Some(u16::from(f.code)),
                                reason: f.reason.as_str().to_owned(),
                            },
                            None => TransportFrame::Closed {
                                code: None,
                                reason: String::new(),
                            },
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let _ = frame_tx.send(TransportFrame::Error(e.to_string()));
                        break TransportFrame::Closed {
                            code: Some(ABNORMAL_CLOSURE),
                            reason: e.to_string(),
                        };
                    }
                    None => {
                        break TransportFrame::Closed {
                            code: Some(ABNORMAL_CLOSURE),
                            reason: "connection lost".into(),
                        };
                    }
                }
            };
            reader_open.store(false, Ordering::SeqCst);
            let _ = frame_tx.send(closed);
        });

        Ok(TransportLink {
            writer: Arc::new(WebSocketWriter { tx: cmd_tx, open }),
            frames: frame_rx,
        })
    }
}
