//! Append-only progress log.
//!
//! Each append validates the entry against its entity type, takes the next
//! gap-free sequence number, chains a SHA-256 checksum onto the previous
//! entry, and moves the entity's projected state, all inside one write
//! transaction. The first append for an unknown entity ID creates it.

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use tally_core::{ActorId, EntityId, EntityType, Progress, Status, ValidationError};
use tracing::debug;

use crate::errors::{Result, TallyError};
use crate::projector::{ProjectedState, StateProjector};
use crate::sqlite::repositories::{EntityRepo, ProgressRepo};
use crate::sqlite::row_helpers::format_timestamp;
use crate::sqlite::row_types::EntityRow;
use crate::types::{AuditableEntity, LogVerification, ProgressEntry};

/// Caller input for one progress entry.
#[derive(Clone, Debug)]
pub struct AppendEntryRequest {
    /// Target entity; created on first append.
    pub entity_id: EntityId,
    /// Entity type; must match the stored type for an existing entity.
    pub entity_type: EntityType,
    /// New status, checked against the type's vocabulary.
    pub status: Status,
    /// New progress, checked against `0..=100`.
    pub progress: i64,
    /// Free-text note. Required for improvement plans.
    pub note: Option<String>,
    /// Recording actor.
    pub recorded_by: ActorId,
    /// Entry time; defaults to the commit clock.
    pub recorded_at: Option<DateTime<Utc>>,
}

/// An [`AppendEntryRequest`] that passed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedEntry {
    entity_id: EntityId,
    entity_type: EntityType,
    status: Status,
    progress: Progress,
    note: Option<String>,
    recorded_by: ActorId,
    recorded_at: Option<DateTime<Utc>>,
}

impl ValidatedEntry {
    /// Target entity.
    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }
}

impl AppendEntryRequest {
    /// Check identifiers, status vocabulary, progress range, and note rules.
    pub fn validate(&self) -> std::result::Result<ValidatedEntry, ValidationError> {
        if self.entity_id.trim().is_empty() {
            return Err(ValidationError::Missing { field: "entity_id" });
        }
        if self.recorded_by.trim().is_empty() {
            return Err(ValidationError::Missing { field: "recorded_by" });
        }
        let progress = Progress::new(self.progress)?;
        if !self.entity_type.allows(self.status) {
            return Err(ValidationError::StatusNotAllowed {
                entity_type: self.entity_type,
                status: self.status,
            });
        }

        let note = self
            .note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_owned);
        if note.is_none() && self.entity_type.requires_note() {
            return Err(ValidationError::NoteRequired(self.entity_type));
        }

        Ok(ValidatedEntry {
            entity_id: self.entity_id.clone(),
            entity_type: self.entity_type,
            status: self.status,
            progress,
            note,
            recorded_by: self.recorded_by.clone(),
            recorded_at: self.recorded_at.map(|ts| ts.trunc_subsecs(6)),
        })
    }
}

/// What an append changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Entity after the append, with its full log.
    pub entity: AuditableEntity,
    /// Status before the append; `None` when the append created the entity.
    pub previous_status: Option<Status>,
}

impl AppendOutcome {
    /// Whether this append created the entity or moved its status.
    pub fn status_changed(&self) -> bool {
        self.previous_status != Some(self.entity.current_status)
    }
}

/// SHA-256 over an entry's content, chained to the previous checksum.
///
/// Fields are separated by `0x1f` so adjacent values cannot run together.
pub fn entry_checksum(entity_id: &EntityId, entry: &ProgressEntry) -> String {
    let sequence = entry.sequence_no.to_string();
    let recorded_at = format_timestamp(&entry.recorded_at);
    let progress = entry.progress.value().to_string();
    let parts: [&str; 8] = [
        entry.prev_checksum.as_deref().unwrap_or(""),
        entity_id.as_str(),
        &sequence,
        &recorded_at,
        entry.status.as_str(),
        &progress,
        entry.note.as_deref().unwrap_or(""),
        entry.recorded_by.as_str(),
    ];

    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    format!("{:x}", hasher.finalize())
}

/// Progress log operations. Stateless.
pub struct ProgressLog;

impl ProgressLog {
    /// Append `entry` inside the caller's write transaction.
    pub fn append(
        conn: &Connection,
        entry: &ValidatedEntry,
        now: &DateTime<Utc>,
    ) -> Result<AppendOutcome> {
        let existing = EntityRepo::get(conn, &entry.entity_id)?;
        if let Some(row) = &existing {
            if row.entity_type != entry.entity_type {
                return Err(ValidationError::EntityTypeMismatch {
                    entity_id: entry.entity_id.to_string(),
                    existing: row.entity_type,
                    requested: entry.entity_type,
                }
                .into());
            }
        }

        let latest = ProgressRepo::latest(conn, &entry.entity_id)?;
        let sequence_no = latest.as_ref().map_or(1, |e| e.sequence_no + 1);
        let mut record = ProgressEntry {
            sequence_no,
            recorded_at: entry.recorded_at.unwrap_or(*now),
            status: entry.status,
            progress: entry.progress,
            note: entry.note.clone(),
            recorded_by: entry.recorded_by.clone(),
            prev_checksum: latest.map(|e| e.checksum),
            checksum: String::new(),
        };
        record.checksum = entry_checksum(&entry.entity_id, &record);
        let state = ProjectedState::from(&record);

        let previous_status = match existing {
            Some(row) => {
                ProgressRepo::insert(conn, &entry.entity_id, &record)?;
                StateProjector::apply(conn, &entry.entity_id, state, row.version, now)?;
                Some(row.current_status)
            }
            None => {
                EntityRepo::insert(
                    conn,
                    &EntityRow {
                        entity_id: entry.entity_id.clone(),
                        entity_type: entry.entity_type,
                        current_status: state.status,
                        current_progress: state.progress,
                        head_sequence_no: state.sequence_no,
                        version: 1,
                        created_at: *now,
                        updated_at: *now,
                    },
                )?;
                ProgressRepo::insert(conn, &entry.entity_id, &record)?;
                None
            }
        };

        debug!(
            entity_id = %entry.entity_id,
            sequence_no,
            status = %entry.status,
            progress = entry.progress.value(),
            "progress entry appended"
        );

        let entity = Self::load(conn, &entry.entity_id)?.ok_or_else(|| {
            TallyError::Integrity(format!("entity {} vanished after append", entry.entity_id))
        })?;
        Ok(AppendOutcome {
            entity,
            previous_status,
        })
    }

    /// Entity with its full log, current fields derived from the log.
    pub fn load(conn: &Connection, entity_id: &EntityId) -> Result<Option<AuditableEntity>> {
        let Some(row) = EntityRepo::get(conn, entity_id)? else {
            return Ok(None);
        };
        let log = ProgressRepo::list(conn, entity_id)?;
        let state = StateProjector::reconcile(&row, &log)?;
        Ok(Some(AuditableEntity {
            entity_id: row.entity_id,
            entity_type: row.entity_type,
            current_status: state.status,
            current_progress: state.progress,
            created_at: row.created_at,
            updated_at: row.updated_at,
            log,
        }))
    }

    /// Check sequence continuity, the checksum chain, and the stored
    /// projection for `entity_id`.
    pub fn verify(conn: &Connection, entity_id: &EntityId) -> Result<LogVerification> {
        let row = EntityRepo::get(conn, entity_id)?
            .ok_or_else(|| TallyError::EntityNotFound(entity_id.to_string()))?;
        let log = ProgressRepo::list(conn, entity_id)?;

        let mut first_broken_sequence = None;
        let mut prev: Option<&str> = None;
        for (idx, entry) in log.iter().enumerate() {
            let position_ok = entry.sequence_no == idx as i64 + 1;
            let link_ok = entry.prev_checksum.as_deref() == prev;
            let checksum_ok = entry.checksum == entry_checksum(entity_id, entry);
            if !(position_ok && link_ok && checksum_ok) {
                first_broken_sequence = Some(entry.sequence_no);
                break;
            }
            prev = Some(&entry.checksum);
        }

        let projection_matches =
            StateProjector::project(&log).is_some_and(|s| s == ProjectedState::from(&row));

        Ok(LogVerification {
            entity_id: row.entity_id,
            entries: log.len(),
            first_broken_sequence,
            projection_matches,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::row_helpers::now;
    use crate::sqlite::test_conn;
    use assert_matches::assert_matches;

    fn request(entity_type: EntityType, status: Status, progress: i64) -> AppendEntryRequest {
        AppendEntryRequest {
            entity_id: "pip-1".into(),
            entity_type,
            status,
            progress,
            note: Some("weekly check-in".into()),
            recorded_by: "mgr-1".into(),
            recorded_at: None,
        }
    }

    fn append(conn: &Connection, req: &AppendEntryRequest) -> Result<AppendOutcome> {
        ProgressLog::append(conn, &req.validate()?, &now())
    }

    // ── validation ──────────────────────────────────────────────────

    #[test]
    fn progress_out_of_range_is_rejected() {
        let req = request(EntityType::Goal, Status::InProgress, 101);
        assert_eq!(req.validate(), Err(ValidationError::ProgressOutOfRange(101)));
        let req = request(EntityType::Goal, Status::InProgress, -1);
        assert_eq!(req.validate(), Err(ValidationError::ProgressOutOfRange(-1)));
    }

    #[test]
    fn status_outside_vocabulary_is_rejected() {
        let req = request(EntityType::Goal, Status::Terminated, 10);
        assert_matches!(req.validate(), Err(ValidationError::StatusNotAllowed { .. }));
        assert!(request(EntityType::ImprovementPlan, Status::Terminated, 10).validate().is_ok());
    }

    #[test]
    fn improvement_plan_requires_note() {
        let mut req = request(EntityType::ImprovementPlan, Status::Active, 0);
        req.note = Some("   ".into());
        assert_eq!(
            req.validate(),
            Err(ValidationError::NoteRequired(EntityType::ImprovementPlan))
        );

        let mut goal = request(EntityType::Goal, Status::NotStarted, 0);
        goal.note = None;
        assert!(goal.validate().is_ok());
    }

    // ── append ──────────────────────────────────────────────────────

    #[test]
    fn first_append_creates_entity() {
        let conn = test_conn();
        let outcome = append(&conn, &request(EntityType::ImprovementPlan, Status::Active, 10)).unwrap();
        assert_eq!(outcome.previous_status, None);
        assert!(outcome.status_changed());
        assert_eq!(outcome.entity.entity_type, EntityType::ImprovementPlan);
        assert_eq!(outcome.entity.current_status, Status::Active);
        assert_eq!(outcome.entity.log.len(), 1);
        assert_eq!(outcome.entity.log[0].sequence_no, 1);
        assert!(outcome.entity.log[0].prev_checksum.is_none());
    }

    #[test]
    fn appends_chain_and_project() {
        let conn = test_conn();
        let _ = append(&conn, &request(EntityType::ImprovementPlan, Status::Active, 10)).unwrap();
        let same = append(&conn, &request(EntityType::ImprovementPlan, Status::Active, 30)).unwrap();
        assert!(!same.status_changed());

        let moved = append(&conn, &request(EntityType::ImprovementPlan, Status::Extended, 40)).unwrap();
        assert_eq!(moved.previous_status, Some(Status::Active));
        assert!(moved.status_changed());

        let log = &moved.entity.log;
        assert_eq!(log.iter().map(|e| e.sequence_no).collect::<Vec<_>>(), [1, 2, 3]);
        assert_eq!(log[1].prev_checksum.as_deref(), Some(log[0].checksum.as_str()));
        assert_eq!(log[2].prev_checksum.as_deref(), Some(log[1].checksum.as_str()));
        assert_eq!(moved.entity.current_status, Status::Extended);
        assert_eq!(moved.entity.current_progress.value(), 40);
    }

    #[test]
    fn invalid_append_leaves_log_unchanged() {
        let conn = test_conn();
        let _ = append(&conn, &request(EntityType::Goal, Status::InProgress, 20)).unwrap();
        assert_matches!(
            append(&conn, &request(EntityType::Goal, Status::InProgress, 101)),
            Err(TallyError::Validation(ValidationError::ProgressOutOfRange(101)))
        );
        let entity = ProgressLog::load(&conn, &"pip-1".into()).unwrap().unwrap();
        assert_eq!(entity.log.len(), 1);
        assert_eq!(entity.current_progress.value(), 20);
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let conn = test_conn();
        let _ = append(&conn, &request(EntityType::ImprovementPlan, Status::Active, 0)).unwrap();
        assert_matches!(
            append(&conn, &request(EntityType::Goal, Status::InProgress, 10)),
            Err(TallyError::Validation(ValidationError::EntityTypeMismatch { .. }))
        );
    }

    #[test]
    fn explicit_timestamp_is_kept() {
        let conn = test_conn();
        let at = DateTime::parse_from_rfc3339("2024-03-01T10:00:00.123456789Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut req = request(EntityType::Review, Status::NotStarted, 0);
        req.recorded_at = Some(at);
        let outcome = append(&conn, &req).unwrap();
        assert_eq!(
            format_timestamp(&outcome.entity.log[0].recorded_at),
            "2024-03-01T10:00:00.123456Z"
        );
    }

    // ── load / verify ───────────────────────────────────────────────

    #[test]
    fn load_unknown_is_none() {
        let conn = test_conn();
        assert!(ProgressLog::load(&conn, &"nope".into()).unwrap().is_none());
        assert_matches!(
            ProgressLog::verify(&conn, &"nope".into()),
            Err(TallyError::EntityNotFound(_))
        );
    }

    #[test]
    fn verify_intact_log() {
        let conn = test_conn();
        for p in [0, 25, 50] {
            let _ = append(&conn, &request(EntityType::Goal, Status::InProgress, p)).unwrap();
        }
        let report = ProgressLog::verify(&conn, &"pip-1".into()).unwrap();
        assert_eq!(report.entries, 3);
        assert!(report.is_intact());
    }

    #[test]
    fn verify_detects_edited_entry() {
        let conn = test_conn();
        for p in [10, 20, 30] {
            let _ = append(&conn, &request(EntityType::Goal, Status::InProgress, p)).unwrap();
        }
        conn.execute_batch(
            "DROP TRIGGER progress_entries_no_update;
             UPDATE progress_entries SET note = 'rewritten' WHERE sequence_no = 2;",
        )
        .unwrap();

        let report = ProgressLog::verify(&conn, &"pip-1".into()).unwrap();
        assert_eq!(report.first_broken_sequence, Some(2));
        assert!(report.projection_matches);
        assert!(!report.is_intact());
    }

    #[test]
    fn verify_and_load_detect_stale_projection() {
        let conn = test_conn();
        let _ = append(&conn, &request(EntityType::Goal, Status::NotStarted, 0)).unwrap();
        let _ = append(&conn, &request(EntityType::Goal, Status::InProgress, 60)).unwrap();
        // Simulate a projection that drifted from the log
        let _ = conn
            .execute(
                "UPDATE auditable_entities SET current_status = 'Completed', current_progress = 100",
                [],
            )
            .unwrap();

        let report = ProgressLog::verify(&conn, &"pip-1".into()).unwrap();
        assert!(report.first_broken_sequence.is_none());
        assert!(!report.projection_matches);

        let entity = ProgressLog::load(&conn, &"pip-1".into()).unwrap().unwrap();
        assert_eq!(entity.current_status, Status::InProgress);
        assert_eq!(entity.current_progress.value(), 60);
    }

    #[test]
    fn checksum_depends_on_content_and_link() {
        let entry = ProgressEntry {
            sequence_no: 1,
            recorded_at: now(),
            status: Status::Active,
            progress: Progress::new(5).unwrap(),
            note: Some("n".into()),
            recorded_by: "a".into(),
            prev_checksum: None,
            checksum: String::new(),
        };
        let id: EntityId = "e".into();
        let base = entry_checksum(&id, &entry);
        assert_eq!(base.len(), 64);
        assert_eq!(base, entry_checksum(&id, &entry));

        let relinked = ProgressEntry {
            prev_checksum: Some("x".into()),
            ..entry.clone()
        };
        assert_ne!(base, entry_checksum(&id, &relinked));
        let renoted = ProgressEntry {
            note: Some("m".into()),
            ..entry
        };
        assert_ne!(base, entry_checksum(&id, &renoted));
    }
}
