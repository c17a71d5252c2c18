//! Row shapes that never leave the store.

use chrono::{DateTime, Utc};
use tally_core::{EntityId, EntityType, Progress, Status};

/// Raw row from `auditable_entities`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityRow {
    /// Entity ID.
    pub entity_id: EntityId,
    /// Entity type, fixed at creation.
    pub entity_type: EntityType,
    /// Projected status.
    pub current_status: Status,
    /// Projected progress.
    pub current_progress: Progress,
    /// Sequence number the projection was taken from.
    pub head_sequence_no: i64,
    /// Compare-and-swap version.
    pub version: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last projection update.
    pub updated_at: DateTime<Utc>,
}
