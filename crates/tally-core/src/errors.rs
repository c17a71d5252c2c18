//! Input validation errors.
//!
//! [`ValidationError`] covers every way a caller's input can be rejected
//! before any state is touched. Store-level failures (not found, conflicts,
//! persistence) live in `tally-store`.

use thiserror::Error;

use crate::domain::{EntityType, Status};

/// A malformed or out-of-range input.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field was absent or blank.
    #[error("{field} is required")]
    Missing {
        /// Field name as the caller knows it.
        field: &'static str,
    },

    /// Text could not be read as a money amount.
    #[error("invalid amount {input:?}: {reason}")]
    InvalidAmount {
        /// The offending input.
        input: String,
        /// What was wrong with it.
        reason: &'static str,
    },

    /// A claim requested nothing.
    #[error("requested amount must be greater than zero")]
    NonPositiveAmount,

    /// Category outside the fixed set.
    #[error("unknown allowance category {0:?}")]
    UnknownCategory(String),

    /// Entity type outside the fixed set.
    #[error("unknown entity type {0:?}")]
    UnknownEntityType(String),

    /// Status word outside every vocabulary.
    #[error("unknown status {0:?}")]
    UnknownStatus(String),

    /// Known status word, wrong vocabulary.
    #[error("status {status} is not allowed for {entity_type}")]
    StatusNotAllowed {
        /// Entity type being updated.
        entity_type: EntityType,
        /// Rejected status.
        status: Status,
    },

    /// Progress outside `0..=100`.
    #[error("progress must be within 0..=100, got {0}")]
    ProgressOutOfRange(i64),

    /// Progress text that is not an integer.
    #[error("progress must be an integer, got {0:?}")]
    ProgressNotNumeric(String),

    /// Note missing where the entity type requires one.
    #[error("a note is required for {0} entries")]
    NoteRequired(EntityType),

    /// Append targeted an existing entity under a different type.
    #[error("entity {entity_id} is a {existing}, not a {requested}")]
    EntityTypeMismatch {
        /// Target entity.
        entity_id: String,
        /// Type on record.
        existing: EntityType,
        /// Type supplied by the caller.
        requested: EntityType,
    },

    /// Decision status word outside the fixed set.
    #[error("unknown decision {0:?}")]
    UnknownDecision(String),

    /// `pending` was offered as a decision.
    #[error("a decision must be approved or rejected")]
    InvalidDecision,

    /// The claim already carries a decision.
    #[error("claim {claim_id} is already {status}")]
    AlreadyDecided {
        /// Target claim.
        claim_id: String,
        /// Decision on record.
        status: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_display() {
        let err = ValidationError::Missing {
            field: "proof_reference",
        };
        assert_eq!(err.to_string(), "proof_reference is required");
    }

    #[test]
    fn status_not_allowed_display() {
        let err = ValidationError::StatusNotAllowed {
            entity_type: EntityType::Goal,
            status: Status::Terminated,
        };
        assert_eq!(err.to_string(), "status Terminated is not allowed for goal");
    }

    #[test]
    fn progress_display() {
        assert_eq!(
            ValidationError::ProgressOutOfRange(101).to_string(),
            "progress must be within 0..=100, got 101"
        );
    }

    #[test]
    fn note_required_display() {
        assert_eq!(
            ValidationError::NoteRequired(EntityType::ImprovementPlan).to_string(),
            "a note is required for improvement_plan entries"
        );
    }

    #[test]
    fn type_mismatch_display() {
        let err = ValidationError::EntityTypeMismatch {
            entity_id: "pip-1".into(),
            existing: EntityType::ImprovementPlan,
            requested: EntityType::Goal,
        };
        assert_eq!(err.to_string(), "entity pip-1 is a improvement_plan, not a goal");
    }
}
