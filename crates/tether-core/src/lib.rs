//! # tether-core
//!
//! Shared vocabulary for the tether connection manager.
//!
//! - **Identity**: [`ConnectionId`], the caller-supplied key for every operation
//! - **Configuration**: [`ConnectionConfig`], immutable per-connection settings
//! - **Events**: [`ConnectionEvent`] and [`EventKind`] delivered to listeners,
//!   [`InboundMessage`] / [`OutboundMessage`] payload wrappers
//! - **Errors**: [`ConnectionError`] and [`TransportError`] via `thiserror`
//! - **Backoff**: reconnect delay math in [`backoff`]
//! - **Logging**: `tracing` subscriber setup and test log capture

#![deny(unsafe_code)]

pub mod backoff;
pub mod config;
pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;

pub use config::{ConnectionConfig, MAX_HEARTBEAT_INTERVAL_MS};
pub use errors::{ConnectionError, Result, TransportError};
pub use events::{CloseInfo, ConnectionEvent, EventKind, InboundMessage, OutboundMessage};
pub use ids::ConnectionId;
