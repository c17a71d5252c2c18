//! Schema migration runner.
//!
//! Migrations are embedded at compile time via [`include_str!`] and applied
//! in version order, each inside its own transaction. The `schema_version`
//! table records what has been applied, so running the migrator twice is a
//! no-op.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::{Result, TallyError};

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Caps, ledger, admissions, claims, entities, progress log, guards",
    sql: include_str!("v001_schema.sql"),
}];

/// Run all pending migrations on the given connection.
///
/// Returns the number of migrations applied.
pub fn run_migrations(conn: &Connection) -> Result<u32> {
    ensure_version_table(conn)?;
    let current = current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version <= current {
            debug!(version = migration.version, "migration already applied, skipping");
            continue;
        }

        info!(
            version = migration.version,
            description = migration.description,
            "applying migration"
        );
        apply_migration(conn, migration)?;
        applied += 1;
    }

    if applied > 0 {
        info!(applied, "migrations complete");
    }
    Ok(applied)
}

/// Highest applied migration version, or 0 if none.
pub fn current_version(conn: &Connection) -> Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| migration_error(format!("failed to read schema_version: {e}")))
}

/// Latest migration version defined in code.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

fn migration_error(message: String) -> TallyError {
    TallyError::Migration { message }
}

fn ensure_version_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
           version     INTEGER PRIMARY KEY,
           applied_at  TEXT    NOT NULL,
           description TEXT
         );",
    )
    .map_err(|e| migration_error(format!("failed to create schema_version table: {e}")))
}

fn apply_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    let tx = conn.unchecked_transaction().map_err(|e| {
        migration_error(format!(
            "failed to begin transaction for v{}: {e}",
            migration.version
        ))
    })?;

    tx.execute_batch(migration.sql).map_err(|e| {
        migration_error(format!(
            "migration v{} ({}) failed: {e}",
            migration.version, migration.description
        ))
    })?;

    let _ = tx
        .execute(
            "INSERT INTO schema_version (version, applied_at, description)
             VALUES (?1, datetime('now'), ?2)",
            rusqlite::params![migration.version, migration.description],
        )
        .map_err(|e| {
            migration_error(format!(
                "failed to record v{} in schema_version: {e}",
                migration.version
            ))
        })?;

    tx.commit()
        .map_err(|e| migration_error(format!("failed to commit v{}: {e}", migration.version)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            > 0
    }

    #[test]
    fn fresh_database_applies_all() {
        let conn = setup();
        assert_eq!(run_migrations(&conn).unwrap(), 1);
        assert_eq!(current_version(&conn).unwrap(), latest_version());
        for table in [
            "cap_configs",
            "cap_ledger",
            "cap_admissions",
            "claims",
            "auditable_entities",
            "progress_entries",
        ] {
            assert!(table_exists(&conn, table), "missing table {table}");
        }
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = setup();
        let _ = run_migrations(&conn).unwrap();
        assert_eq!(run_migrations(&conn).unwrap(), 0);
        assert_eq!(current_version(&conn).unwrap(), 1);
    }

    #[test]
    fn progress_entries_reject_update_and_delete() {
        let conn = setup();
        let _ = run_migrations(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO auditable_entities
               (entity_id, entity_type, current_status, current_progress,
                head_sequence_no, created_at, updated_at)
             VALUES ('g1', 'goal', 'Not Started', 0, 1, 't', 't');
             INSERT INTO progress_entries
               (entity_id, sequence_no, recorded_at, status, progress, recorded_by, checksum)
             VALUES ('g1', 1, 't', 'Not Started', 0, 'actor', 'c');",
        )
        .unwrap();

        let err = conn
            .execute("UPDATE progress_entries SET progress = 50", [])
            .unwrap_err();
        assert!(err.to_string().contains("append-only"));
        let err = conn.execute("DELETE FROM progress_entries", []).unwrap_err();
        assert!(err.to_string().contains("append-only"));
    }

    #[test]
    fn ledger_rejects_decrease() {
        let conn = setup();
        let _ = run_migrations(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO cap_ledger
               (subject_id, period_id, category, annual_cap, cumulative_claimed,
                created_at, updated_at)
             VALUES ('e1', '2024', 'medical', 1000, 500, 't', 't');",
        )
        .unwrap();

        let err = conn
            .execute("UPDATE cap_ledger SET cumulative_claimed = 100", [])
            .unwrap_err();
        assert!(err.to_string().contains("cannot decrease"));
        let _ = conn
            .execute("UPDATE cap_ledger SET cumulative_claimed = 700", [])
            .unwrap();
        assert!(conn.execute("DELETE FROM cap_ledger", []).is_err());
    }

    #[test]
    fn ledger_rejects_cumulative_over_cap() {
        let conn = setup();
        let _ = run_migrations(&conn).unwrap();
        let over = conn.execute_batch(
            "INSERT INTO cap_ledger
               (subject_id, period_id, category, annual_cap, cumulative_claimed,
                created_at, updated_at)
             VALUES ('e1', '2024', 'medical', 1000, 1001, 't', 't');",
        );
        assert!(over.is_err());

        conn.execute_batch(
            "INSERT INTO cap_ledger
               (subject_id, period_id, category, annual_cap, cumulative_claimed,
                created_at, updated_at)
             VALUES ('e1', '2024', 'medical', 1000, 1000, 't', 't');",
        )
        .unwrap();
        assert!(
            conn.execute("UPDATE cap_ledger SET cumulative_claimed = 1200", [])
                .is_err()
        );
    }

    #[test]
    fn progress_primary_key_blocks_duplicate_sequence() {
        let conn = setup();
        let _ = run_migrations(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO auditable_entities
               (entity_id, entity_type, current_status, current_progress,
                head_sequence_no, created_at, updated_at)
             VALUES ('g1', 'goal', 'Not Started', 0, 1, 't', 't');
             INSERT INTO progress_entries
               (entity_id, sequence_no, recorded_at, status, progress, recorded_by, checksum)
             VALUES ('g1', 1, 't', 'Not Started', 0, 'actor', 'c');",
        )
        .unwrap();

        let err = conn
            .execute(
                "INSERT INTO progress_entries
                   (entity_id, sequence_no, recorded_at, status, progress, recorded_by, checksum)
                 VALUES ('g1', 1, 't', 'Completed', 100, 'actor', 'd')",
                [],
            )
            .unwrap_err();
        assert!(TallyError::from(err).is_contention());
    }
}
