//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a partial
//! JSON file fills missing fields from [`Default`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tally_core::RetryPolicy;

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "database": { "path": "/srv/tally/tally.db", "busyTimeoutMs": 2000 },
///   "retry": { "maxAttempts": 3 },
///   "logging": { "level": "debug" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TallySettings {
    /// `SQLite` location and pool tuning.
    pub database: DatabaseSettings,
    /// Bounded retry for contended ledger/log writes.
    pub retry: RetryPolicy,
    /// Log output.
    pub logging: LoggingSettings,
}

impl TallySettings {
    /// Reject values no component can run with.
    pub fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "database.path must not be empty".into(),
            ));
        }
        if self.database.pool_size == 0 {
            return Err(SettingsError::InvalidValue(
                "database.poolSize must be at least 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(SettingsError::InvalidValue(
                "retry.maxAttempts must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(SettingsError::InvalidValue(format!(
                "retry.jitterFactor must be within 0.0..=1.0, got {}",
                self.retry.jitter_factor
            )));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(SettingsError::InvalidValue(
                "retry.baseDelayMs must not exceed retry.maxDelayMs".into(),
            ));
        }
        Ok(())
    }
}

/// `SQLite` connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseSettings {
    /// Database file path.
    pub path: String,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// How long a connection waits on a held write lock before `SQLITE_BUSY`.
    pub busy_timeout_ms: u32,
    /// Page cache per connection, in KiB.
    pub cache_size_kib: i64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_db_path().to_string_lossy().into_owned(),
            pool_size: 16,
            busy_timeout_ms: 5_000,
            cache_size_kib: 8192,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of the compact format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// `~/.tally`.
pub(crate) fn tally_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tally")
}

fn default_db_path() -> PathBuf {
    tally_home().join("tally.db")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
