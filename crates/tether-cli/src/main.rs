//! # tether
//!
//! Hold one or more real-time connections open and print every event as a
//! JSON line on stdout. Logs go to stderr.
//!
//! ```text
//! tether feed=wss://rt.example.com/feed chat=ws://localhost:9000 --reconnect --heartbeat-ms 15000
//! ```

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::{Value, json};
use tether_core::logging::init_subscriber;
use tether_manager::lifecycle::wait_for_termination;
use tether_manager::{ConnectionConfig, ConnectionEvent, ConnectionManager, EventKind};
use tether_settings::TetherSettings;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Real-time connection client.
#[derive(Parser, Debug)]
#[command(name = "tether", about = "Hold real-time connections open and stream their events")]
struct Cli {
    /// Connections to open, as `id=endpoint`.
    #[arg(required = true, value_parser = parse_target)]
    targets: Vec<Target>,

    /// Reconnect after unexpected drops.
    #[arg(long)]
    reconnect: bool,

    /// Reconnect attempts before giving up.
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Base reconnect backoff in milliseconds.
    #[arg(long)]
    reconnect_interval_ms: Option<u64>,

    /// Heartbeat period in milliseconds.
    #[arg(long)]
    heartbeat_ms: Option<u64>,

    /// Outbound queue capacity while disconnected.
    #[arg(long)]
    queue: Option<usize>,

    /// Sub-protocol offered during the handshake (repeatable).
    #[arg(long = "protocol")]
    protocols: Vec<String>,

    /// Message sent to every connection once it opens (repeatable). Valid
    /// JSON is sent as JSON, anything else as text.
    #[arg(long = "send")]
    messages: Vec<String>,

    /// Settings file (defaults to `~/.tether/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,
}

/// One `id=endpoint` argument.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Target {
    id: String,
    endpoint: String,
}

fn parse_target(raw: &str) -> std::result::Result<Target, String> {
    let Some((id, endpoint)) = raw.split_once('=') else {
        return Err(format!("expected id=endpoint, got '{raw}'"));
    };
    let (id, endpoint) = (id.trim(), endpoint.trim());
    if id.is_empty() || endpoint.is_empty() {
        return Err(format!("expected id=endpoint, got '{raw}'"));
    }
    Ok(Target {
        id: id.to_owned(),
        endpoint: endpoint.to_owned(),
    })
}

impl Cli {
    fn connection_config(&self, endpoint: &str) -> ConnectionConfig {
        let mut config = ConnectionConfig::new(endpoint).with_reconnect(self.reconnect);
        if let Some(attempts) = self.max_attempts {
            config = config.with_max_reconnect_attempts(attempts);
        }
        if let Some(ms) = self.reconnect_interval_ms {
            config = config.with_reconnect_interval_ms(ms);
        }
        if let Some(ms) = self.heartbeat_ms {
            config = config.with_heartbeat_ms(ms);
        }
        if let Some(capacity) = self.queue {
            config = config.with_queue_capacity(capacity);
        }
        for protocol in &self.protocols {
            config = config.with_sub_protocol(protocol.clone());
        }
        config
    }

    fn load_settings(&self) -> Result<TetherSettings> {
        let path = self
            .settings
            .clone()
            .unwrap_or_else(tether_settings::settings_path);
        tether_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))
    }
}

fn outbound(raw: &str) -> tether_core::OutboundMessage {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => value.into(),
        Err(_) => raw.into(),
    }
}

fn event_line(id: &str, event: &ConnectionEvent) -> String {
    json!({ "connection": id, "event": event }).to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings = args.load_settings()?;
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| settings.logging.level.clone());
    init_subscriber(&level, args.json_logs || settings.logging.json);

    let manager = ConnectionManager::new(settings.manager).context("invalid manager settings")?;

    // One terminal close per connection that opened.
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let _ = manager.on_global(EventKind::Close, move |id, event| match event {
        ConnectionEvent::Close(info) if info.is_terminal() => {
            let _ = done_tx.send(id.clone());
        }
        _ => {}
    });
    for kind in EventKind::ALL {
        let _ = manager.on_global(kind, |id, event| println!("{}", event_line(id, event)));
    }

    let mut live = 0usize;
    for target in &args.targets {
        let config = args.connection_config(&target.endpoint);
        match manager.connect(target.id.as_str(), config).await {
            Ok(handle) => {
                live += 1;
                for message in &args.messages {
                    let _ = handle.send(outbound(message));
                }
            }
            Err(e) => warn!(conn_id = %target.id, error = %e, code = e.code(), "connect failed"),
        }
    }
    if live == 0 {
        bail!("no connection could be opened");
    }
    info!(live, "connections open");

    tokio::select! {
        () = wait_for_termination() => info!("termination signal received"),
        () = async {
            while live > 0 {
                if done_rx.recv().await.is_none() {
                    break;
                }
                live -= 1;
            }
        } => info!("all connections closed"),
    }

    manager.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::OutboundMessage;

    #[test]
    fn parses_targets() {
        assert_eq!(
            parse_target("feed=wss://rt.example.com/feed?x=1").unwrap(),
            Target {
                id: "feed".into(),
                endpoint: "wss://rt.example.com/feed?x=1".into(),
            }
        );
        assert!(parse_target("no-separator").is_err());
        assert!(parse_target("=ws://x").is_err());
        assert!(parse_target("id=").is_err());
    }

    #[test]
    fn builds_connection_config_from_flags() {
        let cli = Cli::try_parse_from([
            "tether",
            "a=ws://localhost:1",
            "--reconnect",
            "--max-attempts",
            "7",
            "--heartbeat-ms",
            "15000",
            "--queue",
            "32",
            "--protocol",
            "v2",
        ])
        .unwrap();
        let config = cli.connection_config("ws://localhost:1");
        assert!(config.reconnect);
        assert_eq!(config.max_reconnect_attempts, 7);
        assert_eq!(config.heartbeat_interval_ms, Some(15_000));
        assert_eq!(config.message_queue_capacity, Some(32));
        assert_eq!(config.sub_protocols, vec!["v2".to_string()]);
    }

    #[test]
    fn requires_a_target() {
        assert!(Cli::try_parse_from(["tether"]).is_err());
        assert!(Cli::try_parse_from(["tether", "bogus"]).is_err());
    }

    #[test]
    fn defaults_leave_features_off() {
        let cli = Cli::try_parse_from(["tether", "a=ws://x", "b=ws://y"]).unwrap();
        assert_eq!(cli.targets.len(), 2);
        let config = cli.connection_config("ws://x");
        assert_eq!(config, ConnectionConfig::new("ws://x"));
    }

    #[test]
    fn send_payloads_prefer_json() {
        assert_eq!(
            outbound(r#"{"type":"hello"}"#),
            OutboundMessage::Json(json!({"type": "hello"}))
        );
        assert_eq!(outbound("plain"), OutboundMessage::Text("plain".into()));
    }

    #[test]
    fn event_lines_are_tagged_json() {
        let line = event_line("feed", &ConnectionEvent::Open);
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value, json!({"connection": "feed", "event": {"type": "open"}}));
    }
}
