//! Append-only progress entries.
//!
//! `(entity_id, sequence_no)` is the primary key. Two writers that both
//! compute the same next sequence number cannot both commit: the loser gets
//! a primary-key violation, which the write executor treats as contention.

use rusqlite::{Connection, OptionalExtension, Row, params};
use tally_core::EntityId;

use crate::errors::Result;
use crate::sqlite::row_helpers::{format_timestamp, get_timestamp};
use crate::types::ProgressEntry;

const ENTRY_COLUMNS: &str =
    "sequence_no, recorded_at, status, progress, note, recorded_by, prev_checksum, checksum";

/// Progress entry repository. Stateless; every method takes `&Connection`.
pub struct ProgressRepo;

impl ProgressRepo {
    /// Append `entry` to `entity_id`'s log.
    pub fn insert(conn: &Connection, entity_id: &EntityId, entry: &ProgressEntry) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO progress_entries
               (entity_id, sequence_no, recorded_at, status, progress, note,
                recorded_by, prev_checksum, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entity_id,
                entry.sequence_no,
                format_timestamp(&entry.recorded_at),
                entry.status,
                entry.progress,
                entry.note,
                entry.recorded_by,
                entry.prev_checksum,
                entry.checksum,
            ],
        )?;
        Ok(())
    }

    /// Entry with the highest sequence number.
    pub fn latest(conn: &Connection, entity_id: &EntityId) -> Result<Option<ProgressEntry>> {
        let entry = conn
            .query_row(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM progress_entries
                     WHERE entity_id = ?1 ORDER BY sequence_no DESC LIMIT 1"
                ),
                [entity_id],
                map_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// The full log, ascending by sequence number.
    pub fn list(conn: &Connection, entity_id: &EntityId) -> Result<Vec<ProgressEntry>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM progress_entries
             WHERE entity_id = ?1 ORDER BY sequence_no ASC"
        ))?;
        let entries = stmt
            .query_map([entity_id], map_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Number of entries in the log.
    pub fn count(conn: &Connection, entity_id: &EntityId) -> Result<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM progress_entries WHERE entity_id = ?1",
            [entity_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn map_entry(row: &Row<'_>) -> rusqlite::Result<ProgressEntry> {
    Ok(ProgressEntry {
        sequence_no: row.get(0)?,
        recorded_at: get_timestamp(row, 1)?,
        status: row.get(2)?,
        progress: row.get(3)?,
        note: row.get(4)?,
        recorded_by: row.get(5)?,
        prev_checksum: row.get(6)?,
        checksum: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::repositories::entity::EntityRepo;
    use crate::sqlite::row_helpers::now;
    use crate::sqlite::row_types::EntityRow;
    use crate::sqlite::test_conn;
    use tally_core::{EntityType, Progress, Status};

    fn seed_entity(conn: &Connection, id: &str) {
        let ts = now();
        EntityRepo::insert(
            conn,
            &EntityRow {
                entity_id: id.into(),
                entity_type: EntityType::Goal,
                current_status: Status::NotStarted,
                current_progress: Progress::default(),
                head_sequence_no: 1,
                version: 1,
                created_at: ts,
                updated_at: ts,
            },
        )
        .unwrap();
    }

    fn entry(seq: i64, progress: i64) -> ProgressEntry {
        ProgressEntry {
            sequence_no: seq,
            recorded_at: now(),
            status: Status::InProgress,
            progress: Progress::new(progress).unwrap(),
            note: None,
            recorded_by: "emp-1".into(),
            prev_checksum: (seq > 1).then(|| format!("c{}", seq - 1)),
            checksum: format!("c{seq}"),
        }
    }

    #[test]
    fn list_is_ordered_and_latest_is_highest() {
        let conn = test_conn();
        seed_entity(&conn, "g1");
        let id: EntityId = "g1".into();
        for (seq, p) in [(1, 0), (2, 30), (3, 60)] {
            ProgressRepo::insert(&conn, &id, &entry(seq, p)).unwrap();
        }

        let log = ProgressRepo::list(&conn, &id).unwrap();
        assert_eq!(log.iter().map(|e| e.sequence_no).collect::<Vec<_>>(), [1, 2, 3]);
        assert_eq!(log[1].prev_checksum.as_deref(), Some("c1"));
        assert_eq!(ProgressRepo::latest(&conn, &id).unwrap().unwrap().sequence_no, 3);
        assert_eq!(ProgressRepo::count(&conn, &id).unwrap(), 3);
    }

    #[test]
    fn duplicate_sequence_is_contention() {
        let conn = test_conn();
        seed_entity(&conn, "g1");
        let id: EntityId = "g1".into();
        ProgressRepo::insert(&conn, &id, &entry(1, 0)).unwrap();
        let err = ProgressRepo::insert(&conn, &id, &entry(1, 50)).unwrap_err();
        assert!(err.is_contention());
    }

    #[test]
    fn entries_require_entity() {
        let conn = test_conn();
        assert!(ProgressRepo::insert(&conn, &"ghost".into(), &entry(1, 0)).is_err());
        assert!(ProgressRepo::latest(&conn, &"ghost".into()).unwrap().is_none());
    }
}
