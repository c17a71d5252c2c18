//! Auditable entity rows and their projected current fields.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tally_core::{EntityId, Progress, Status};

use crate::errors::Result;
use crate::sqlite::row_helpers::{format_timestamp, get_timestamp};
use crate::sqlite::row_types::EntityRow;

/// Entity repository. Stateless; every method takes `&Connection`.
pub struct EntityRepo;

impl EntityRepo {
    /// Entity by ID.
    pub fn get(conn: &Connection, entity_id: &EntityId) -> Result<Option<EntityRow>> {
        let row = conn
            .query_row(
                "SELECT entity_id, entity_type, current_status, current_progress,
                        head_sequence_no, version, created_at, updated_at
                 FROM auditable_entities WHERE entity_id = ?1",
                [entity_id],
                map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Insert a new entity. `row.version` is ignored; new rows start at 1.
    pub fn insert(conn: &Connection, row: &EntityRow) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO auditable_entities
               (entity_id, entity_type, current_status, current_progress,
                head_sequence_no, version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7)",
            params![
                row.entity_id,
                row.entity_type,
                row.current_status,
                row.current_progress,
                row.head_sequence_no,
                format_timestamp(&row.created_at),
                format_timestamp(&row.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Overwrite the projected fields if the row is still at
    /// `expected_version`. Returns whether the write happened.
    pub fn update_projection(
        conn: &Connection,
        entity_id: &EntityId,
        status: Status,
        progress: Progress,
        head_sequence_no: i64,
        expected_version: i64,
        now: &DateTime<Utc>,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE auditable_entities
             SET current_status = ?2, current_progress = ?3, head_sequence_no = ?4,
                 version = version + 1, updated_at = ?5
             WHERE entity_id = ?1 AND version = ?6",
            params![
                entity_id,
                status,
                progress,
                head_sequence_no,
                format_timestamp(now),
                expected_version
            ],
        )?;
        Ok(changed == 1)
    }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<EntityRow> {
    Ok(EntityRow {
        entity_id: row.get(0)?,
        entity_type: row.get(1)?,
        current_status: row.get(2)?,
        current_progress: row.get(3)?,
        head_sequence_no: row.get(4)?,
        version: row.get(5)?,
        created_at: get_timestamp(row, 6)?,
        updated_at: get_timestamp(row, 7)?,
    })
}
