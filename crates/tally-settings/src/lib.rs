//! # tally-settings
//!
//! Layered configuration for the tally ledger.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`TallySettings::default()`]
//! 2. **User file**: `~/.tally/settings.json`, deep-merged over defaults
//! 3. **Environment variables**: `TALLY_*` overrides (highest priority)
//!
//! The merged result is checked by [`TallySettings::validate`] before use.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{DatabaseSettings, LoggingSettings, TallySettings};

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let settings = TallySettings::default();
        assert!(settings.validate().is_ok());
        assert!(settings_path().ends_with("settings.json"));
    }
}
