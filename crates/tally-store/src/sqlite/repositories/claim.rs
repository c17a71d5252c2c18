//! Claim records and their review state.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tally_core::{ActorId, ClaimId, DecisionStatus, PeriodId, SubjectId};

use crate::errors::Result;
use crate::sqlite::row_helpers::{format_timestamp, get_opt_timestamp, get_timestamp};
use crate::types::ClaimRecord;

const CLAIM_COLUMNS: &str = "claim_id, subject_id, period_id, category, requested_amount,
     claimable_amount, taxable_amount, decision_status, proof_reference,
     submitted_by, submitted_at, decided_by, decided_at, decision_comment";

/// Claim repository. Stateless; every method takes `&Connection`.
pub struct ClaimRepo;

impl ClaimRepo {
    /// Whether a claim with this ID exists.
    pub fn exists(conn: &Connection, claim_id: &ClaimId) -> Result<bool> {
        let found: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM claims WHERE claim_id = ?1)",
            [claim_id],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    /// Insert a new claim record.
    pub fn insert(conn: &Connection, claim: &ClaimRecord) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO claims
               (claim_id, subject_id, period_id, category, requested_amount,
                claimable_amount, taxable_amount, decision_status, proof_reference,
                submitted_by, submitted_at, decided_by, decided_at, decision_comment)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                claim.claim_id,
                claim.subject_id,
                claim.period_id,
                claim.category,
                claim.requested_amount,
                claim.claimable_amount,
                claim.taxable_amount,
                claim.decision_status,
                claim.proof_reference,
                claim.submitted_by,
                format_timestamp(&claim.submitted_at),
                claim.decided_by,
                claim.decided_at.as_ref().map(format_timestamp),
                claim.decision_comment,
            ],
        )?;
        Ok(())
    }

    /// Claim by ID.
    pub fn get(conn: &Connection, claim_id: &ClaimId) -> Result<Option<ClaimRecord>> {
        let claim = conn
            .query_row(
                &format!("SELECT {CLAIM_COLUMNS} FROM claims WHERE claim_id = ?1"),
                [claim_id],
                map_claim,
            )
            .optional()?;
        Ok(claim)
    }

    /// Claims for a subject in a period, oldest first.
    pub fn list_by_subject_period(
        conn: &Connection,
        subject_id: &SubjectId,
        period_id: &PeriodId,
    ) -> Result<Vec<ClaimRecord>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {CLAIM_COLUMNS} FROM claims
             WHERE subject_id = ?1 AND period_id = ?2
             ORDER BY submitted_at ASC, claim_id ASC"
        ))?;
        let claims = stmt
            .query_map(params![subject_id, period_id], map_claim)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(claims)
    }

    /// Record a decision on a pending claim.
    ///
    /// Returns `false` if the claim is no longer pending.
    pub fn record_decision(
        conn: &Connection,
        claim_id: &ClaimId,
        status: DecisionStatus,
        decided_by: &ActorId,
        comment: Option<&str>,
        now: &DateTime<Utc>,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE claims
             SET decision_status = ?2, decided_by = ?3, decided_at = ?4, decision_comment = ?5
             WHERE claim_id = ?1 AND decision_status = 'pending'",
            params![claim_id, status, decided_by, format_timestamp(now), comment],
        )?;
        Ok(changed == 1)
    }
}

fn map_claim(row: &Row<'_>) -> rusqlite::Result<ClaimRecord> {
    Ok(ClaimRecord {
        claim_id: row.get(0)?,
        subject_id: row.get(1)?,
        period_id: row.get(2)?,
        category: row.get(3)?,
        requested_amount: row.get(4)?,
        claimable_amount: row.get(5)?,
        taxable_amount: row.get(6)?,
        decision_status: row.get(7)?,
        proof_reference: row.get(8)?,
        submitted_by: row.get(9)?,
        submitted_at: get_timestamp(row, 10)?,
        decided_by: row.get(11)?,
        decided_at: get_opt_timestamp(row, 12)?,
        decision_comment: row.get(13)?,
    })
}
