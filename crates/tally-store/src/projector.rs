//! Current-state projection for auditable entities.
//!
//! An entity's `current_status` and `current_progress` are derived from the
//! entry with the highest `sequence_no`. [`StateProjector`] computes that
//! derivation on append and stores it under a compare-and-swap. Every read
//! derives it again from the loaded log, and the stored columns never
//! override it.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tally_core::{EntityId, Progress, Status};
use tracing::warn;

use crate::errors::{Result, TallyError};
use crate::sqlite::repositories::EntityRepo;
use crate::sqlite::row_types::EntityRow;
use crate::types::ProgressEntry;

/// State derived from one log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedState {
    /// Status of the entry.
    pub status: Status,
    /// Progress of the entry.
    pub progress: Progress,
    /// Sequence number of the entry.
    pub sequence_no: i64,
}

impl From<&ProgressEntry> for ProjectedState {
    fn from(entry: &ProgressEntry) -> Self {
        Self {
            status: entry.status,
            progress: entry.progress,
            sequence_no: entry.sequence_no,
        }
    }
}

impl From<&EntityRow> for ProjectedState {
    fn from(row: &EntityRow) -> Self {
        Self {
            status: row.current_status,
            progress: row.current_progress,
            sequence_no: row.head_sequence_no,
        }
    }
}

/// Projection of logs onto entity rows. Stateless.
pub struct StateProjector;

impl StateProjector {
    /// State of the highest-sequence entry, or `None` for an empty log.
    pub fn project(log: &[ProgressEntry]) -> Option<ProjectedState> {
        log.iter()
            .max_by_key(|entry| entry.sequence_no)
            .map(ProjectedState::from)
    }

    /// Write `state` onto the entity row if it is still at `expected_version`.
    ///
    /// Losing the compare-and-swap is [`TallyError::Contended`].
    pub fn apply(
        conn: &Connection,
        entity_id: &EntityId,
        state: ProjectedState,
        expected_version: i64,
        now: &DateTime<Utc>,
    ) -> Result<()> {
        let swapped = EntityRepo::update_projection(
            conn,
            entity_id,
            state.status,
            state.progress,
            state.sequence_no,
            expected_version,
            now,
        )?;
        if swapped {
            Ok(())
        } else {
            Err(TallyError::Contended(format!("entity:{entity_id}")))
        }
    }

    /// State to serve for `row` given its full `log`.
    ///
    /// The log wins: if the stored projection disagrees, the disagreement is
    /// logged and the log-derived state returned. An empty log is an
    /// integrity error since every entity is created by its first entry.
    pub fn reconcile(row: &EntityRow, log: &[ProgressEntry]) -> Result<ProjectedState> {
        let projected = Self::project(log).ok_or_else(|| {
            TallyError::Integrity(format!("entity {} has an empty progress log", row.entity_id))
        })?;
        let stored = ProjectedState::from(row);
        if stored != projected {
            warn!(
                entity_id = %row.entity_id,
                stored_status = %stored.status,
                stored_progress = stored.progress.value(),
                stored_sequence = stored.sequence_no,
                log_status = %projected.status,
                log_progress = projected.progress.value(),
                log_sequence = projected.sequence_no,
                "stored projection diverged from progress log, serving log state"
            );
        }
        Ok(projected)
    }
}
