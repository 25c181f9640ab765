//! # tether-manager
//!
//! Bounded pool of named, self-healing real-time connections.
//!
//! - [`ConnectionManager`]: connect / send / close / listen, capacity limit
//! - Reconnect with exponential backoff after unexpected drops
//! - Bounded outbound queue flushed in order on (re)open
//! - Application-level heartbeat (`ping` / `pong`)
//! - Idle eviction and resource-pressure monitor
//! - Listener fan-out with typed [`Subscription`] handles
//! - Pluggable [`Transport`](transport::Transport): WebSocket via
//!   `tokio-tungstenite`, or the in-memory transport for tests
//! - Lifecycle hooks: Ctrl-C / SIGTERM → close everything

#![deny(unsafe_code)]

pub mod dispatcher;
pub mod heartbeat;
pub mod lifecycle;
pub mod manager;
pub mod metrics;
pub mod monitor;
pub mod queue;
mod reconnect;
mod record;
pub mod stats;
pub mod transport;

pub use dispatcher::{GlobalListener, Listener, Subscription};
pub use lifecycle::{LifecycleEvent, spawn_signal_hook};
pub use manager::{ConnectionHandle, ConnectionManager, ConnectionManagerBuilder};
pub use monitor::{Pressure, QueuedMessagesProbe, ResourceProbe};
pub use queue::{DropReason, SendOutcome};
pub use record::ConnectionState;
pub use stats::ConnectionStats;
pub use tether_core::{
    CloseInfo, ConnectionConfig, ConnectionError, ConnectionEvent, ConnectionId, EventKind,
    InboundMessage, OutboundMessage,
};
pub use tether_settings::ManagerSettings;
