//! Where settings come from.
//!
//! [`load_settings_from_path`] layers, lowest priority first:
//! compiled defaults, the JSON file (merged with [`deep_merge`]), then
//! `TETHER_*` environment variables. The result is validated before it is
//! returned. A missing file is not an error.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::TetherSettings;

/// Resolve the path to the settings file (`~/.tether/settings.json`).
pub fn settings_path() -> PathBuf {
    std::env::var_os("HOME")
        .map_or_else(|| PathBuf::from("/tmp"), PathBuf::from)
        .join(".tether/settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TetherSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or out-of-range values are
/// errors.
pub fn load_settings_from_path(path: &Path) -> Result<TetherSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults merged with the file at `path`, without env overrides.
fn load_file_layer(path: &Path) -> Result<TetherSettings> {
    let defaults = serde_json::to_value(TetherSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Layer `source` over `target`.
///
/// Objects merge key by key; any other `source` value replaces the target
/// outright. `null` in `source` leaves the target untouched, so a file can
/// mention a key without overriding its default.
pub fn deep_merge(mut target: Value, source: Value) -> Value {
    merge_into(&mut target, source);
    target
}

fn merge_into(target: &mut Value, source: Value) {
    match (target, source) {
        (_, Value::Null) => {}
        (Value::Object(into), Value::Object(from)) => {
            for (key, value) in from {
                match into.get_mut(&key) {
                    Some(existing) => merge_into(existing, value),
                    None if value.is_null() => {}
                    None => {
                        let _ = into.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are warned about and ignored (file/default value kept).
pub fn apply_env_overrides(settings: &mut TetherSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary lookup (testable without env vars).
pub fn apply_overrides<F>(settings: &mut TetherSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str, range: RangeInclusive<u64>| {
        let val = lookup(name)?;
        let parsed = parse_in_range(&val, &range);
        if parsed.is_none() {
            tracing::warn!(key = name, value = %val, min = range.start(), max = range.end(), "ignoring out-of-range env override");
        }
        parsed
    };

    // ── Manager ─────────────────────────────────────────────────────
    if let Some(v) = read("TETHER_MAX_CONNECTIONS", 1..=100_000) {
        settings.manager.max_connections = usize::try_from(v).unwrap_or(usize::MAX);
    }
    if let Some(v) = read("TETHER_IDLE_TIMEOUT_MS", 0..=86_400_000) {
        settings.manager.idle_timeout_ms = v;
    }
    if let Some(v) = read("TETHER_MONITOR_INTERVAL_MS", 100..=86_400_000) {
        settings.manager.monitor_interval_ms = v;
    }
    if let Some(v) = read("TETHER_CONNECT_TIMEOUT_MS", 100..=3_600_000) {
        settings.manager.connect_timeout_ms = v;
    }
    if let Some(v) = read("TETHER_MAX_RECONNECT_DELAY_MS", 0..=3_600_000) {
        settings.manager.max_reconnect_delay_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = lookup("TETHER_LOG_LEVEL").filter(|v| !v.is_empty()) {
        settings.logging.level = v;
    }
    if let Some(val) = lookup("TETHER_LOG_JSON") {
        match parse_bool(&val) {
            Some(v) => settings.logging.json = v,
            None => {
                tracing::warn!(key = "TETHER_LOG_JSON", value = %val, "invalid boolean env var, ignoring");
            }
        }
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a boolean flag: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`,
/// any case.
pub fn parse_bool(val: &str) -> Option<bool> {
    const TRUTHY: [&str; 4] = ["true", "1", "yes", "on"];
    const FALSY: [&str; 4] = ["false", "0", "no", "off"];
    let val = val.trim();
    if TRUTHY.iter().any(|t| t.eq_ignore_ascii_case(val)) {
        Some(true)
    } else if FALSY.iter().any(|f| f.eq_ignore_ascii_case(val)) {
        Some(false)
    } else {
        None
    }
}

/// Parse `val` as an integer inside `range`.
pub fn parse_in_range<T>(val: &str, range: &RangeInclusive<T>) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    val.trim().parse().ok().filter(|n| range.contains(n))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
