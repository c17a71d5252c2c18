//! Configured annual caps.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tally_core::{Amount, CapKey};

use crate::errors::Result;
use crate::sqlite::row_helpers::format_timestamp;

/// Cap configuration repository. Stateless; every method takes `&Connection`.
pub struct CapConfigRepo;

impl CapConfigRepo {
    /// Insert or replace the cap for `key`.
    pub fn upsert(
        conn: &Connection,
        key: &CapKey,
        annual_cap: Amount,
        now: &DateTime<Utc>,
    ) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO cap_configs (subject_id, period_id, category, annual_cap, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (subject_id, period_id, category)
             DO UPDATE SET annual_cap = excluded.annual_cap, updated_at = excluded.updated_at",
            params![
                key.subject_id,
                key.period_id,
                key.category,
                annual_cap,
                format_timestamp(now)
            ],
        )?;
        Ok(())
    }

    /// Configured cap for `key`, if any.
    pub fn get(conn: &Connection, key: &CapKey) -> Result<Option<Amount>> {
        let cap = conn
            .query_row(
                "SELECT annual_cap FROM cap_configs
                 WHERE subject_id = ?1 AND period_id = ?2 AND category = ?3",
                params![key.subject_id, key.period_id, key.category],
                |row| row.get(0),
            )
            .optional()?;
        Ok(cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::row_helpers::now;
    use crate::sqlite::test_conn;
    use tally_core::Category;

    #[test]
    fn upsert_then_replace() {
        let conn = test_conn();
        let key = CapKey::new("e1".into(), "2024".into(), Category::Medical);
        assert_eq!(CapConfigRepo::get(&conn, &key).unwrap(), None);

        CapConfigRepo::upsert(&conn, &key, Amount::major(15_000), &now()).unwrap();
        assert_eq!(CapConfigRepo::get(&conn, &key).unwrap(), Some(Amount::major(15_000)));

        CapConfigRepo::upsert(&conn, &key, Amount::major(20_000), &now()).unwrap();
        assert_eq!(CapConfigRepo::get(&conn, &key).unwrap(), Some(Amount::major(20_000)));
    }

    #[test]
    fn keys_are_independent() {
        let conn = test_conn();
        let medical = CapKey::new("e1".into(), "2024".into(), Category::Medical);
        let fuel = CapKey::new("e1".into(), "2024".into(), Category::Fuel);
        CapConfigRepo::upsert(&conn, &medical, Amount::major(100), &now()).unwrap();
        assert_eq!(CapConfigRepo::get(&conn, &fuel).unwrap(), None);
    }
}
