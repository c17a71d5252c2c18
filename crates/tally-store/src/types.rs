//! Public record types returned by the store.
//!
//! Everything here serializes to camelCase JSON for the CLI and for
//! collaborators that log or forward results.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tally_core::{
    ActorId, Amount, CapKey, Category, ClaimId, DecisionStatus, EntityId, EntityType, PeriodId,
    Progress, Status, SubjectId,
};

// ─────────────────────────────────────────────────────────────────────────────
// Cap ledger
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of admitting one claim amount against a cap.
///
/// `cumulative_after = cumulative_before + claimable_amount` and
/// `taxable_amount = annual_cap - cumulative_after`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Admission {
    /// Cap in force when the claim was admitted.
    pub annual_cap: Amount,
    /// Portion within the remaining cap.
    pub claimable_amount: Amount,
    /// Cap headroom left after this admission.
    pub taxable_amount: Amount,
    /// Cumulative claimed before this admission.
    pub cumulative_before: Amount,
    /// Cumulative claimed after this admission.
    pub cumulative_after: Amount,
}

/// Stored consumption for one cap key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapLedgerEntry {
    /// Cap key.
    #[serde(flatten)]
    pub key: CapKey,
    /// Cap snapshot the entry enforces.
    pub annual_cap: Amount,
    /// Sum of admitted claimable amounts. Never decreases or exceeds the cap.
    pub cumulative_claimed: Amount,
    /// Compare-and-swap version, bumped on every update.
    pub version: i64,
    /// First admission.
    pub created_at: DateTime<Utc>,
    /// Latest admission.
    pub updated_at: DateTime<Utc>,
}

impl CapLedgerEntry {
    /// Cap headroom left, floored at zero.
    pub fn remaining(&self) -> Amount {
        self.annual_cap.saturating_sub(self.cumulative_claimed)
    }
}

/// Read-only view of a cap key's consumption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapStatus {
    /// Cap key.
    #[serde(flatten)]
    pub key: CapKey,
    /// Effective annual cap.
    pub annual_cap: Amount,
    /// Sum of admitted claimable amounts.
    pub cumulative_claimed: Amount,
    /// `max(0, annual_cap - cumulative_claimed)`.
    pub remaining: Amount,
}

/// Journal row written for every admission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRecord {
    /// Journal position, increasing across all keys.
    pub sequence: i64,
    /// Admitted claim.
    pub claim_id: ClaimId,
    /// Cap key charged.
    #[serde(flatten)]
    pub key: CapKey,
    /// Amount requested.
    pub requested_amount: Amount,
    /// Split and ledger movement.
    #[serde(flatten)]
    pub admission: Admission,
    /// When the admission committed.
    pub admitted_at: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Claims
// ─────────────────────────────────────────────────────────────────────────────

/// A reimbursement claim and its review state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRecord {
    /// Claim ID.
    pub claim_id: ClaimId,
    /// Claimant.
    pub subject_id: SubjectId,
    /// Allowance period.
    pub period_id: PeriodId,
    /// Allowance category.
    pub category: Category,
    /// Amount requested.
    pub requested_amount: Amount,
    /// Portion within the cap at submission.
    pub claimable_amount: Amount,
    /// Cap headroom left after this claim was admitted.
    pub taxable_amount: Amount,
    /// Review state.
    pub decision_status: DecisionStatus,
    /// Reference to the supporting document.
    pub proof_reference: String,
    /// Submitting actor.
    pub submitted_by: ActorId,
    /// Submission time.
    pub submitted_at: DateTime<Utc>,
    /// Reviewing actor, once decided.
    pub decided_by: Option<ActorId>,
    /// Decision time, once decided.
    pub decided_at: Option<DateTime<Utc>>,
    /// Reviewer's comment.
    pub decision_comment: Option<String>,
}

impl ClaimRecord {
    /// Cap key this claim was charged against.
    pub fn key(&self) -> CapKey {
        CapKey::new(
            self.subject_id.clone(),
            self.period_id.clone(),
            self.category,
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Progress log
// ─────────────────────────────────────────────────────────────────────────────

/// One immutable entry in an entity's progress log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    /// Position in the log, starting at 1 with no gaps.
    pub sequence_no: i64,
    /// When the entry was recorded.
    pub recorded_at: DateTime<Utc>,
    /// Status at this point.
    pub status: Status,
    /// Progress at this point.
    pub progress: Progress,
    /// Free-text note.
    pub note: Option<String>,
    /// Recording actor.
    pub recorded_by: ActorId,
    /// Checksum of the previous entry, `None` for the first.
    pub prev_checksum: Option<String>,
    /// SHA-256 over this entry's content and `prev_checksum`.
    pub checksum: String,
}

/// An auditable record with its full progress log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditableEntity {
    /// Entity ID.
    pub entity_id: EntityId,
    /// Entity type.
    pub entity_type: EntityType,
    /// Status of the latest log entry.
    pub current_status: Status,
    /// Progress of the latest log entry.
    pub current_progress: Progress,
    /// First append.
    pub created_at: DateTime<Utc>,
    /// Latest append.
    pub updated_at: DateTime<Utc>,
    /// Every entry, ascending by `sequence_no`.
    pub log: Vec<ProgressEntry>,
}

/// Result of checking an entity's log against itself and its projection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogVerification {
    /// Entity checked.
    pub entity_id: EntityId,
    /// Number of log entries.
    pub entries: usize,
    /// First sequence number whose position or checksum is wrong.
    pub first_broken_sequence: Option<i64>,
    /// Whether the stored current fields match the latest entry.
    pub projection_matches: bool,
}

impl LogVerification {
    /// Chain intact and projection consistent.
    pub fn is_intact(&self) -> bool {
        self.first_broken_sequence.is_none() && self.projection_matches
    }
}
