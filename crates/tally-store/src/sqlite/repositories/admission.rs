//! Admission journal, one append-only row per admitted claim.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use tally_core::{Amount, CapKey, ClaimId};

use crate::errors::Result;
use crate::sqlite::row_helpers::{format_timestamp, get_timestamp};
use crate::types::{Admission, AdmissionRecord};

/// Admission journal repository. Stateless; every method takes `&Connection`.
pub struct AdmissionRepo;

impl AdmissionRepo {
    /// Whether `claim_id` was already admitted.
    pub fn exists(conn: &Connection, claim_id: &ClaimId) -> Result<bool> {
        let found: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM cap_admissions WHERE claim_id = ?1)",
            [claim_id],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    /// Append one admission. Returns its journal sequence.
    pub fn insert(
        conn: &Connection,
        claim_id: &ClaimId,
        key: &CapKey,
        requested: Amount,
        admission: &Admission,
        now: &DateTime<Utc>,
    ) -> Result<i64> {
        let _ = conn.execute(
            "INSERT INTO cap_admissions
               (claim_id, subject_id, period_id, category, requested_amount,
                claimable_amount, taxable_amount, annual_cap,
                cumulative_before, cumulative_after, admitted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                claim_id,
                key.subject_id,
                key.period_id,
                key.category,
                requested,
                admission.claimable_amount,
                admission.taxable_amount,
                admission.annual_cap,
                admission.cumulative_before,
                admission.cumulative_after,
                format_timestamp(now),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Every admission against `key`, oldest first.
    pub fn list_by_key(conn: &Connection, key: &CapKey) -> Result<Vec<AdmissionRecord>> {
        let mut stmt = conn.prepare(
            "SELECT id, claim_id, subject_id, period_id, category, requested_amount,
                    claimable_amount, taxable_amount, annual_cap,
                    cumulative_before, cumulative_after, admitted_at
             FROM cap_admissions
             WHERE subject_id = ?1 AND period_id = ?2 AND category = ?3
             ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(
                params![key.subject_id, key.period_id, key.category],
                map_record,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Sum of requested amounts admitted against `key`.
    pub fn total_requested(conn: &Connection, key: &CapKey) -> Result<Amount> {
        let total: Amount = conn.query_row(
            "SELECT COALESCE(SUM(requested_amount), 0) FROM cap_admissions
             WHERE subject_id = ?1 AND period_id = ?2 AND category = ?3",
            params![key.subject_id, key.period_id, key.category],
            |row| row.get(0),
        )?;
        Ok(total)
    }
}

fn map_record(row: &Row<'_>) -> rusqlite::Result<AdmissionRecord> {
    Ok(AdmissionRecord {
        sequence: row.get(0)?,
        claim_id: row.get(1)?,
        key: CapKey::new(row.get(2)?, row.get(3)?, row.get(4)?),
        requested_amount: row.get(5)?,
        admission: Admission {
            claimable_amount: row.get(6)?,
            taxable_amount: row.get(7)?,
            annual_cap: row.get(8)?,
            cumulative_before: row.get(9)?,
            cumulative_after: row.get(10)?,
        },
        admitted_at: get_timestamp(row, 11)?,
    })
}
