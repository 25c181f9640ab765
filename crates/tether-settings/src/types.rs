//! Settings types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Longest accepted monitor period: one day.
const MAX_MONITOR_INTERVAL_MS: u64 = 86_400_000;

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TetherSettings {
    /// Connection manager limits and timers.
    pub manager: ManagerSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl TetherSettings {
    /// Reject values the manager cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.manager.validate()
    }
}

/// Limits and timer periods for the connection manager.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagerSettings {
    /// Maximum simultaneous connection records.
    pub max_connections: usize,
    /// Inactivity after which a non-reconnecting connection is evicted.
    pub idle_timeout_ms: u64,
    /// Period of the idle/resource monitor.
    pub monitor_interval_ms: u64,
    /// How long `connect` waits for the open event.
    pub connect_timeout_ms: u64,
    /// Ceiling on any single reconnect delay.
    pub max_reconnect_delay_ms: u64,
    /// Total queued messages above which the monitor reports critical
    /// resource pressure and closes everything. `None` disables the check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical_queued_messages: Option<usize>,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            idle_timeout_ms: 300_000,
            monitor_interval_ms: 60_000,
            connect_timeout_ms: 30_000,
            max_reconnect_delay_ms: 30_000,
            critical_queued_messages: None,
        }
    }
}

impl ManagerSettings {
    /// Inactivity threshold as a [`Duration`].
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Monitor period as a [`Duration`].
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    /// Connect timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Reject values the manager cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(SettingsError::invalid("maxConnections", "must be at least 1"));
        }
        if self.monitor_interval_ms == 0 {
            return Err(SettingsError::invalid("monitorIntervalMs", "must be greater than zero"));
        }
        if self.monitor_interval_ms > MAX_MONITOR_INTERVAL_MS {
            return Err(SettingsError::invalid("monitorIntervalMs", "must not exceed one day"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(SettingsError::invalid("connectTimeoutMs", "must be greater than zero"));
        }
        if self.critical_queued_messages == Some(0) {
            return Err(SettingsError::invalid("criticalQueuedMessages", "must be greater than zero"));
        }
        Ok(())
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`RUST_LOG` wins when set).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations() {
        let m = ManagerSettings::default();
        assert_eq!(m.idle_timeout(), Duration::from_secs(300));
        assert_eq!(m.monitor_interval(), Duration::from_secs(60));
        assert_eq!(m.connect_timeout(), Duration::from_secs(30));
        assert_eq!(m.max_reconnect_delay_ms, 30_000);
        assert!(m.critical_queued_messages.is_none());
    }

    #[test]
    fn zero_max_connections_rejected() {
        let m = ManagerSettings {
            max_connections: 0,
            ..ManagerSettings::default()
        };
        let err = m.validate().unwrap_err();
        assert!(err.to_string().contains("maxConnections"));
    }

    #[test]
    fn zero_monitor_interval_rejected() {
        let m = ManagerSettings {
            monitor_interval_ms: 0,
            ..ManagerSettings::default()
        };
        assert!(m.validate().is_err());
    }

    #[test]
    fn monitor_interval_over_a_day_rejected() {
        let m = ManagerSettings {
            monitor_interval_ms: u64::MAX,
            ..ManagerSettings::default()
        };
        assert_eq!(
            m.validate().unwrap_err().to_string(),
            "monitorIntervalMs must not exceed one day"
        );
    }

    #[test]
    fn zero_pressure_threshold_rejected() {
        let m = ManagerSettings {
            critical_queued_messages: Some(0),
            ..ManagerSettings::default()
        };
        assert!(m.validate().is_err());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let s: TetherSettings =
            serde_json::from_str(r#"{"manager":{"maxConnections":3}}"#).unwrap();
        assert_eq!(s.manager.max_connections, 3);
        assert_eq!(s.manager.idle_timeout_ms, 300_000);
        assert_eq!(s.logging, LoggingSettings::default());
    }

    #[test]
    fn serde_roundtrip_uses_camel_case() {
        let s = TetherSettings::default();
        let value = serde_json::to_value(&s).unwrap();
        assert_eq!(value["manager"]["connectTimeoutMs"], 30_000);
        assert!(value["manager"].get("criticalQueuedMessages").is_none());
        let back: TetherSettings = serde_json::from_value(value).unwrap();
        assert_eq!(back, s);
    }
}
