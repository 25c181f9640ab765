//! # tether-settings
//!
//! Configuration for the tether connection manager.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`TetherSettings::default()`]
//! 2. **User file**: `~/.tether/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `TETHER_*` overrides (highest priority)
//!
//! Unlike a process-global singleton, the loaded value is handed to
//! `ConnectionManager::new` explicitly.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{LoggingSettings, ManagerSettings, TetherSettings};

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = TetherSettings::default();
        let path = settings_path();
        assert!(path.ends_with(".tether/settings.json"));
    }

    #[test]
    fn default_settings_are_valid() {
        let settings = TetherSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.manager.max_connections, 10);
        assert_eq!(settings.manager.idle_timeout_ms, 300_000);
        assert_eq!(settings.logging.level, "warn");
    }
}
