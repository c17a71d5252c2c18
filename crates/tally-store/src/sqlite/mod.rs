//! `SQLite` backend.
//!
//! - **[`connection`]**: `r2d2` pool with WAL, foreign keys, and busy timeout
//!   applied to every connection.
//! - **[`migrations`]**: version-tracked schema, embedded at compile time.
//! - **[`repositories`]**: stateless repositories taking `&Connection`.
//! - **[`row_helpers`]**: timestamp column encoding.

pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod row_helpers;
pub mod row_types;

pub use connection::{
    ConnectionConfig, ConnectionPool, PooledConnection, PragmaState, new_file, new_in_memory,
    verify_pragmas,
};
pub use migrations::{current_version, latest_version, run_migrations};

/// Migrated in-memory connection for repository tests.
#[cfg(test)]
pub(crate) fn test_conn() -> rusqlite::Connection {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
    let _ = run_migrations(&conn).unwrap();
    conn
}
