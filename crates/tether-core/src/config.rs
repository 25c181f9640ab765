//! Per-connection configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::{DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_INTERVAL_MS};
use crate::errors::{ConnectionError, Result};

/// Longest accepted heartbeat period: one day.
pub const MAX_HEARTBEAT_INTERVAL_MS: u64 = 86_400_000;

/// Configuration supplied at `connect` time.
///
/// Immutable for the life of a connection record. Build with
/// [`ConnectionConfig::new`] and the `with_*` methods, or deserialize from
/// camelCase JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    /// Address to dial (for example `wss://rt.example.com/feed`).
    pub endpoint: String,
    /// Sub-protocols offered during the handshake.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_protocols: Vec<String>,
    /// Reconnect automatically after an unexpected close.
    #[serde(default)]
    pub reconnect: bool,
    /// Base backoff unit in milliseconds.
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    /// Reconnect attempts before giving up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Heartbeat period; `None` disables heartbeats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_ms: Option<u64>,
    /// Outbound queue capacity; `None` disables queueing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_queue_capacity: Option<usize>,
}

fn default_reconnect_interval_ms() -> u64 {
    DEFAULT_RECONNECT_INTERVAL_MS
}
fn default_max_reconnect_attempts() -> u32 {
    DEFAULT_MAX_RECONNECT_ATTEMPTS
}

impl ConnectionConfig {
    /// Config for `endpoint` with reconnect, heartbeat and queueing off.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            sub_protocols: Vec::new(),
            reconnect: false,
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            heartbeat_interval_ms: None,
            message_queue_capacity: None,
        }
    }

    /// Enable or disable automatic reconnect.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the base backoff interval.
    #[must_use]
    pub fn with_reconnect_interval_ms(mut self, ms: u64) -> Self {
        self.reconnect_interval_ms = ms;
        self
    }

    /// Set the maximum number of reconnect attempts.
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Enable heartbeats every `ms` milliseconds.
    #[must_use]
    pub fn with_heartbeat_ms(mut self, ms: u64) -> Self {
        self.heartbeat_interval_ms = Some(ms);
        self
    }

    /// Enable outbound queueing with the given capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.message_queue_capacity = Some(capacity);
        self
    }

    /// Offer a sub-protocol during the handshake.
    #[must_use]
    pub fn with_sub_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.sub_protocols.push(protocol.into());
        self
    }

    /// Heartbeat period as a [`Duration`], if enabled.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval_ms.map(Duration::from_millis)
    }

    /// Check the config before a record is created.
    pub fn validate(&self) -> Result<()> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(ConnectionError::InvalidConfig("endpoint is empty".into()));
        }
        if !endpoint.contains("://") {
            return Err(ConnectionError::InvalidConfig(format!(
                "endpoint '{endpoint}' has no scheme"
            )));
        }
        match self.heartbeat_interval_ms {
            Some(0) => {
                return Err(ConnectionError::InvalidConfig(
                    "heartbeat interval must be greater than zero".into(),
                ));
            }
            Some(ms) if ms > MAX_HEARTBEAT_INTERVAL_MS => {
                return Err(ConnectionError::InvalidConfig(format!(
                    "heartbeat interval {ms}ms exceeds {MAX_HEARTBEAT_INTERVAL_MS}ms"
                )));
            }
            _ => {}
        }
        if self.sub_protocols.iter().any(|p| p.trim().is_empty()) {
            return Err(ConnectionError::InvalidConfig(
                "sub-protocol names must not be empty".into(),
            ));
        }
        Ok(())
    }
}
