//! Events delivered to listeners and the payload wrappers around them.
//!
//! The core never interprets payloads beyond the `type` field needed to
//! recognise heartbeat replies. Everything else travels as an opaque
//! [`InboundMessage`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message `type` sent by the heartbeat.
pub const PING_TYPE: &str = "ping";
/// Message `type` recognised as a heartbeat reply.
pub const PONG_TYPE: &str = "pong";

// ─────────────────────────────────────────────────────────────────────────────
// Event kinds
// ─────────────────────────────────────────────────────────────────────────────

/// Names listeners subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// The link completed its open handshake.
    Open,
    /// An inbound message arrived.
    Message,
    /// A heartbeat reply arrived.
    Pong,
    /// The transport reported an error.
    Error,
    /// The link closed (retryable or terminal).
    Close,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [EventKind; 5] = [
        EventKind::Open,
        EventKind::Message,
        EventKind::Pong,
        EventKind::Error,
        EventKind::Close,
    ];

    /// Wire name of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Message => "message",
            Self::Pong => "pong",
            Self::Error => "error",
            Self::Close => "close",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Inbound payload: parsed JSON when possible, raw text otherwise.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InboundMessage {
    /// The frame was valid JSON.
    Json(Value),
    /// The frame was not JSON.
    Text(String),
}

impl InboundMessage {
    /// Parse a text frame.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(raw.to_owned()),
        }
    }

    /// The `type` field of a JSON object payload.
    #[must_use]
    pub fn message_type(&self) -> Option<&str> {
        match self {
            Self::Json(value) => value.get("type").and_then(Value::as_str),
            Self::Text(_) => None,
        }
    }

    /// Whether this is a heartbeat reply.
    #[must_use]
    pub fn is_pong(&self) -> bool {
        self.message_type() == Some(PONG_TYPE)
    }

    /// The JSON value, if any.
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }
}

/// Outbound payload accepted by `send`.
///
/// Strings pass through untouched; JSON values are serialized.
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundMessage {
    /// Pre-serialized text.
    Text(String),
    /// A JSON value to serialize.
    Json(Value),
}

impl OutboundMessage {
    /// Serialize any `Serialize` value into a JSON payload.
    pub fn json<T: Serialize>(value: &T) -> serde_json::Result<Self> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    /// Wire text for the payload.
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Json(value) => value.to_string(),
        }
    }
}

impl From<String> for OutboundMessage {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for OutboundMessage {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Value> for OutboundMessage {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// Heartbeat probe payload `{"type":"ping","timestamp":<unix ms>}`.
#[must_use]
pub fn ping_message(timestamp_ms: i64) -> OutboundMessage {
    OutboundMessage::Json(serde_json::json!({
        "type": PING_TYPE,
        "timestamp": timestamp_ms,
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Details of a `close` event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseInfo {
    /// Close code, when the transport supplied one.
    pub code: Option<u16>,
    /// Close reason.
    pub reason: String,
    /// A reconnect attempt has been scheduled.
    pub will_reconnect: bool,
    /// Reconnect attempts ran out; the connection is gone for good.
    pub exhausted: bool,
}

impl CloseInfo {
    /// Close requested by the caller.
    #[must_use]
    pub fn requested(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            reason: reason.into(),
            will_reconnect: false,
            exhausted: false,
        }
    }

    /// Whether no further events will follow for this connection.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !self.will_reconnect
    }
}

/// Event fanned out to listeners.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionEvent {
    /// The link is open.
    Open,
    /// An inbound message arrived.
    Message {
        /// Payload as received.
        payload: InboundMessage,
    },
    /// A heartbeat reply arrived.
    Pong {
        /// The reply's `timestamp` field, if present.
        timestamp: Option<i64>,
    },
    /// The transport reported an error.
    Error {
        /// Human-readable description.
        message: String,
    },
    /// The link closed.
    Close(CloseInfo),
}

impl ConnectionEvent {
    /// Kind used for listener lookup.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Open => EventKind::Open,
            Self::Message { .. } => EventKind::Message,
            Self::Pong { .. } => EventKind::Pong,
            Self::Error { .. } => EventKind::Error,
            Self::Close(_) => EventKind::Close,
        }
    }

    /// Build a `pong` event from an inbound heartbeat reply.
    #[must_use]
    pub fn pong_from(message: &InboundMessage) -> Self {
        let timestamp = message
            .as_json()
            .and_then(|v| v.get("timestamp"))
            .and_then(Value::as_i64);
        Self::Pong { timestamp }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_json_and_text() {
        let msg = InboundMessage::parse(r#"{"type":"pong","timestamp":5}"#);
        assert!(msg.is_pong());
        assert_eq!(msg.message_type(), Some("pong"));

        let raw = InboundMessage::parse("hello there");
        assert_eq!(raw, InboundMessage::Text("hello there".into()));
        assert!(raw.message_type().is_none());
    }

    #[test]
    fn json_without_type_is_not_pong() {
        let msg = InboundMessage::parse("[1,2,3]");
        assert!(!msg.is_pong());
        assert!(msg.as_json().is_some());
    }

    #[test]
    fn outbound_string_passes_through() {
        let text = OutboundMessage::from("{\"already\":\"encoded\"}").into_text();
        assert_eq!(text, "{\"already\":\"encoded\"}");
    }

    #[test]
    fn outbound_json_serializes() {
        let text = OutboundMessage::from(json!({"type": "reaction", "emoji": "🔥"})).into_text();
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back["type"], "reaction");
    }

    #[test]
    fn outbound_from_serialize() {
        #[derive(Serialize)]
        struct Pick {
            round: u32,
        }
        let msg = OutboundMessage::json(&Pick { round: 2 }).unwrap();
        assert_eq!(msg.into_text(), r#"{"round":2}"#);
    }

    #[test]
    fn ping_shape() {
        let text = ping_message(1_700_000_000_000).into_text();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "ping");
        assert_eq!(value["timestamp"], 1_700_000_000_000_i64);
    }

    #[test]
    fn pong_event_reads_timestamp() {
        let msg = InboundMessage::parse(r#"{"type":"pong","timestamp":42}"#);
        assert_eq!(
            ConnectionEvent::pong_from(&msg),
            ConnectionEvent::Pong {
                timestamp: Some(42)
            }
        );
    }

    #[test]
    fn event_kind_mapping() {
        assert_eq!(ConnectionEvent::Open.kind(), EventKind::Open);
        assert_eq!(
            ConnectionEvent::Close(CloseInfo::requested(1000, "bye")).kind(),
            EventKind::Close
        );
        assert_eq!(EventKind::Pong.to_string(), "pong");
        assert_eq!(EventKind::ALL.len(), 5);
    }

    #[test]
    fn close_event_serializes_flags() {
        let event = ConnectionEvent::Close(CloseInfo {
            code: Some(1006),
            reason: "gone".into(),
            will_reconnect: false,
            exhausted: true,
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "close");
        assert_eq!(value["exhausted"], true);
        assert_eq!(value["willReconnect"], false);
    }

    #[test]
    fn requested_close_is_terminal() {
        let info = CloseInfo::requested(1000, "Idle timeout");
        assert!(info.is_terminal());
        assert!(!info.exhausted);
    }
}
