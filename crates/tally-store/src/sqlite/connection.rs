//! `SQLite` connection pool with WAL mode, foreign keys, and a busy timeout.
//!
//! Every connection handed out by the pool passes through
//! [`PragmaCustomizer`], so writers wait `busy_timeout_ms` on a held write
//! lock before `SQLITE_BUSY` reaches the retry loop.

use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tally_settings::DatabaseSettings;

use crate::errors::Result;

/// Alias for the connection pool type.
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Alias for a pooled connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Configuration for the connection pool.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Maximum pool size (default: 16).
    pub pool_size: u32,
    /// Busy timeout in milliseconds (default: 5000).
    pub busy_timeout_ms: u32,
    /// Cache size in KiB (default: 8192 = 8 MB).
    pub cache_size_kib: i64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::from(&DatabaseSettings::default())
    }
}

impl From<&DatabaseSettings> for ConnectionConfig {
    fn from(settings: &DatabaseSettings) -> Self {
        Self {
            pool_size: settings.pool_size,
            busy_timeout_ms: settings.busy_timeout_ms,
            cache_size_kib: settings.cache_size_kib,
        }
    }
}

#[derive(Debug)]
struct PragmaCustomizer {
    busy_timeout_ms: u32,
    cache_size_kib: i64,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;\
             PRAGMA busy_timeout = {};\
             PRAGMA foreign_keys = ON;\
             PRAGMA cache_size = -{};\
             PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms, self.cache_size_kib
        ))
    }
}

fn build(
    manager: SqliteConnectionManager,
    max_size: u32,
    config: &ConnectionConfig,
) -> Result<ConnectionPool> {
    let pool = Pool::builder()
        .max_size(max_size)
        .connection_timeout(Duration::from_secs(5))
        .connection_customizer(Box::new(PragmaCustomizer {
            busy_timeout_ms: config.busy_timeout_ms,
            cache_size_kib: config.cache_size_kib,
        }))
        .build(manager)?;
    Ok(pool)
}

/// Create an in-memory connection pool.
///
/// Each in-memory connection is its own database, so the pool always holds
/// exactly one connection regardless of `config.pool_size`.
pub fn new_in_memory(config: &ConnectionConfig) -> Result<ConnectionPool> {
    build(SqliteConnectionManager::memory(), 1, config)
}

/// Create a file-backed connection pool, creating parent directories.
pub fn new_file(path: &str, config: &ConnectionConfig) -> Result<ConnectionPool> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                crate::errors::TallyError::Internal(format!(
                    "failed to create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
    }
    build(SqliteConnectionManager::file(path), config.pool_size.max(1), config)
}

/// Pragma state for verification.
#[derive(Debug)]
pub struct PragmaState {
    /// Journal mode (`wal` on disk, `memory` in memory).
    pub journal_mode: String,
    /// Whether foreign keys are enabled.
    pub foreign_keys_enabled: bool,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: i64,
}

/// Read back the pragmas the customizer sets.
pub fn verify_pragmas(conn: &Connection) -> Result<PragmaState> {
    let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
    let busy_timeout_ms: i64 = conn.query_row("PRAGMA busy_timeout", [], |row| row.get(0))?;
    Ok(PragmaState {
        journal_mode,
        foreign_keys_enabled: foreign_keys == 1,
        busy_timeout_ms,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
