//! Claim intake and review.
//!
//! A submission is validated, admitted against its cap, and recorded as a
//! `pending` claim in one write transaction. The split fixed at admission
//! never changes: a later decision only moves `decision_status`, and a
//! rejection does not return the amount to the cap.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tally_core::{
    ActorId, Amount, CapKey, Category, ClaimId, Decision, DecisionStatus, PeriodId, SubjectId,
    ValidationError,
};
use tracing::info;

use crate::errors::{Result, TallyError};
use crate::ledger::AllowanceCapLedger;
use crate::sqlite::repositories::ClaimRepo;
use crate::types::ClaimRecord;

/// Caller input for a new claim.
#[derive(Clone, Debug)]
pub struct ClaimSubmission {
    /// Caller-chosen ID for idempotent resubmission; generated when `None`.
    pub claim_id: Option<ClaimId>,
    /// Claimant.
    pub subject_id: SubjectId,
    /// Allowance period.
    pub period_id: PeriodId,
    /// Allowance category.
    pub category: Category,
    /// Amount requested.
    pub requested_amount: Amount,
    /// Reference to the supporting document.
    pub proof_reference: String,
    /// Submitting actor.
    pub submitted_by: ActorId,
}

impl ClaimSubmission {
    /// Cap key this submission charges.
    pub fn key(&self) -> CapKey {
        CapKey::new(
            self.subject_id.clone(),
            self.period_id.clone(),
            self.category,
        )
    }

    /// Reject blank identifiers, a blank proof reference, or a zero amount.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.subject_id.trim().is_empty() {
            return Err(ValidationError::Missing { field: "subject_id" });
        }
        if self.period_id.trim().is_empty() {
            return Err(ValidationError::Missing { field: "period_id" });
        }
        if self.submitted_by.trim().is_empty() {
            return Err(ValidationError::Missing { field: "submitted_by" });
        }
        if self.proof_reference.trim().is_empty() {
            return Err(ValidationError::Missing {
                field: "proof_reference",
            });
        }
        if self
            .claim_id
            .as_ref()
            .is_some_and(|id| id.trim().is_empty())
        {
            return Err(ValidationError::Missing { field: "claim_id" });
        }
        if self.requested_amount.is_zero() {
            return Err(ValidationError::NonPositiveAmount);
        }
        Ok(())
    }
}

/// Claim lifecycle steps. Stateless; every method runs inside the caller's
/// write transaction.
pub struct ClaimIntake;

impl ClaimIntake {
    /// Admit `submission` under `claim_id` and record it as pending.
    ///
    /// The submission must already be validated.
    pub fn submit(
        conn: &Connection,
        claim_id: &ClaimId,
        submission: &ClaimSubmission,
        configured_cap: Amount,
        now: &DateTime<Utc>,
    ) -> Result<ClaimRecord> {
        if ClaimRepo::exists(conn, claim_id)? {
            return Err(TallyError::DuplicateClaim(claim_id.to_string()));
        }

        let key = submission.key();
        let admission = AllowanceCapLedger::admit(
            conn,
            claim_id,
            &key,
            submission.requested_amount,
            configured_cap,
            now,
        )?;

        let claim = ClaimRecord {
            claim_id: claim_id.clone(),
            subject_id: key.subject_id,
            period_id: key.period_id,
            category: key.category,
            requested_amount: submission.requested_amount,
            claimable_amount: admission.claimable_amount,
            taxable_amount: admission.taxable_amount,
            decision_status: DecisionStatus::Pending,
            proof_reference: submission.proof_reference.trim().to_owned(),
            submitted_by: submission.submitted_by.clone(),
            submitted_at: *now,
            decided_by: None,
            decided_at: None,
            decision_comment: None,
        };
        ClaimRepo::insert(conn, &claim)?;
        Ok(claim)
    }

    /// Approve or reject a pending claim.
    ///
    /// Amounts are untouched. A claim that is already decided fails with
    /// [`ValidationError::AlreadyDecided`].
    pub fn decide(
        conn: &Connection,
        claim_id: &ClaimId,
        decision: Decision,
        comment: Option<&str>,
        decided_by: &ActorId,
        now: &DateTime<Utc>,
    ) -> Result<ClaimRecord> {
        let claim = ClaimRepo::get(conn, claim_id)?
            .ok_or_else(|| TallyError::ClaimNotFound(claim_id.to_string()))?;
        if claim.decision_status != DecisionStatus::Pending {
            return Err(ValidationError::AlreadyDecided {
                claim_id: claim_id.to_string(),
                status: claim.decision_status.to_string(),
            }
            .into());
        }

        let comment = comment.map(str::trim).filter(|c| !c.is_empty());
        if !ClaimRepo::record_decision(conn, claim_id, decision.into(), decided_by, comment, now)? {
            return Err(TallyError::Contended(format!("claim:{claim_id}")));
        }
        info!(claim_id = %claim_id, decision = %decision, decided_by = %decided_by, "claim decided");

        ClaimRepo::get(conn, claim_id)?
            .ok_or_else(|| TallyError::Integrity(format!("claim {claim_id} vanished after decision")))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
