//! Cumulative consumption per cap key.
//!
//! Updates are compare-and-swap on `version`: a caller reads the entry,
//! computes the new cumulative, and writes it only if nobody else wrote in
//! between. A `false` return means the caller lost and must retry.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tally_core::{Amount, CapKey};

use crate::errors::Result;
use crate::sqlite::row_helpers::{format_timestamp, get_timestamp};
use crate::types::CapLedgerEntry;

/// Ledger repository. Stateless; every method takes `&Connection`.
pub struct CapLedgerRepo;

impl CapLedgerRepo {
    /// Entry for `key`, if any admission has been recorded.
    pub fn get(conn: &Connection, key: &CapKey) -> Result<Option<CapLedgerEntry>> {
        let entry = conn
            .query_row(
                "SELECT subject_id, period_id, category, annual_cap, cumulative_claimed,
                        version, created_at, updated_at
                 FROM cap_ledger
                 WHERE subject_id = ?1 AND period_id = ?2 AND category = ?3",
                params![key.subject_id, key.period_id, key.category],
                map_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// Create the entry for `key` at version 1.
    ///
    /// A primary-key collision means a concurrent writer created it first.
    pub fn insert(
        conn: &Connection,
        key: &CapKey,
        annual_cap: Amount,
        cumulative_claimed: Amount,
        now: &DateTime<Utc>,
    ) -> Result<()> {
        let ts = format_timestamp(now);
        let _ = conn.execute(
            "INSERT INTO cap_ledger
               (subject_id, period_id, category, annual_cap, cumulative_claimed,
                version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
            params![
                key.subject_id,
                key.period_id,
                key.category,
                annual_cap,
                cumulative_claimed,
                ts
            ],
        )?;
        Ok(())
    }

    /// Write new cap and cumulative values if the entry is still at
    /// `expected_version`. Returns whether the write happened.
    pub fn compare_and_swap(
        conn: &Connection,
        key: &CapKey,
        annual_cap: Amount,
        cumulative_claimed: Amount,
        expected_version: i64,
        now: &DateTime<Utc>,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE cap_ledger
             SET annual_cap = ?4, cumulative_claimed = ?5, version = version + 1, updated_at = ?6
             WHERE subject_id = ?1 AND period_id = ?2 AND category = ?3 AND version = ?7",
            params![
                key.subject_id,
                key.period_id,
                key.category,
                annual_cap,
                cumulative_claimed,
                format_timestamp(now),
                expected_version
            ],
        )?;
        Ok(changed == 1)
    }
}

fn map_entry(row: &Row<'_>) -> rusqlite::Result<CapLedgerEntry> {
    Ok(CapLedgerEntry {
        key: CapKey::new(row.get(0)?, row.get(1)?, row.get(2)?),
        annual_cap: row.get(3)?,
        cumulative_claimed: row.get(4)?,
        version: row.get(5)?,
        created_at: get_timestamp(row, 6)?,
        updated_at: get_timestamp(row, 7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TallyError;
    use crate::sqlite::row_helpers::now;
    use crate::sqlite::test_conn;
    use tally_core::Category;

    fn key() -> CapKey {
        CapKey::new("e1".into(), "2024".into(), Category::Medical)
    }

    #[test]
    fn insert_and_get() {
        let conn = test_conn();
        assert!(CapLedgerRepo::get(&conn, &key()).unwrap().is_none());

        CapLedgerRepo::insert(&conn, &key(), Amount::major(1000), Amount::major(400), &now()).unwrap();
        let entry = CapLedgerRepo::get(&conn, &key()).unwrap().unwrap();
        assert_eq!(entry.key, key());
        assert_eq!(entry.annual_cap, Amount::major(1000));
        assert_eq!(entry.cumulative_claimed, Amount::major(400));
        assert_eq!(entry.remaining(), Amount::major(600));
        assert_eq!(entry.version, 1);
    }

    #[test]
    fn second_insert_collides_as_contention() {
        let conn = test_conn();
        CapLedgerRepo::insert(&conn, &key(), Amount::major(1000), Amount::major(1), &now()).unwrap();
        let err = CapLedgerRepo::insert(&conn, &key(), Amount::major(1000), Amount::major(2), &now())
            .unwrap_err();
        assert!(err.is_contention());
        assert!(matches!(err, TallyError::Sqlite(_)));
    }

    #[test]
    fn compare_and_swap_checks_version() {
        let conn = test_conn();
        CapLedgerRepo::insert(&conn, &key(), Amount::major(1000), Amount::major(100), &now()).unwrap();

        let stale = CapLedgerRepo::compare_and_swap(
            &conn,
            &key(),
            Amount::major(1000),
            Amount::major(300),
            7,
            &now(),
        )
        .unwrap();
        assert!(!stale);

        let won = CapLedgerRepo::compare_and_swap(
            &conn,
            &key(),
            Amount::major(1000),
            Amount::major(300),
            1,
            &now(),
        )
        .unwrap();
        assert!(won);

        let entry = CapLedgerRepo::get(&conn, &key()).unwrap().unwrap();
        assert_eq!(entry.cumulative_claimed, Amount::major(300));
        assert_eq!(entry.version, 2);
    }

    #[test]
    fn cumulative_cannot_exceed_cap() {
        let conn = test_conn();
        let over = CapLedgerRepo::insert(&conn, &key(), Amount::major(100), Amount::major(250), &now());
        assert!(over.is_err());

        CapLedgerRepo::insert(&conn, &key(), Amount::major(100), Amount::major(100), &now()).unwrap();
        let entry = CapLedgerRepo::get(&conn, &key()).unwrap().unwrap();
        assert_eq!(entry.remaining(), Amount::ZERO);
        let swapped = CapLedgerRepo::compare_and_swap(
            &conn,
            &key(),
            Amount::major(100),
            Amount::major(150),
            1,
            &now(),
        );
        assert!(swapped.is_err());
    }
}
