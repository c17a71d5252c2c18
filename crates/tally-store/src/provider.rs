//! Where annual caps come from.
//!
//! The ledger never decides a cap itself; it asks a [`CapConfigProvider`]
//! before opening its write transaction. Two implementations ship:
//!
//! - [`SqliteCapConfig`]: caps in the `cap_configs` table of the same
//!   database (what the CLI uses)
//! - [`InMemoryCapConfig`]: a map, for tests and embedding

use std::collections::HashMap;

use parking_lot::RwLock;
use tally_core::{Amount, CapKey};
use tracing::info;

use crate::errors::Result;
use crate::sqlite::ConnectionPool;
use crate::sqlite::repositories::CapConfigRepo;
use crate::sqlite::row_helpers::now;

/// Source of configured annual caps.
pub trait CapConfigProvider: Send + Sync {
    /// Configured cap for `key`, or `None` if the key has no cap.
    fn annual_cap(&self, key: &CapKey) -> Result<Option<Amount>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite
// ─────────────────────────────────────────────────────────────────────────────

/// Caps stored in the `cap_configs` table.
#[derive(Clone)]
pub struct SqliteCapConfig {
    pool: ConnectionPool,
}

impl SqliteCapConfig {
    /// Provider reading from `pool`.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Configure (or reconfigure) the cap for `key`.
    ///
    /// Existing ledger entries pick up an increase on their next admission;
    /// a decrease never lowers a cap already in force.
    pub fn set_cap(&self, key: &CapKey, annual_cap: Amount) -> Result<()> {
        let conn = self.pool.get()?;
        CapConfigRepo::upsert(&conn, key, annual_cap, &now())?;
        info!(key = %key, annual_cap = %annual_cap, "annual cap configured");
        Ok(())
    }
}

impl CapConfigProvider for SqliteCapConfig {
    fn annual_cap(&self, key: &CapKey) -> Result<Option<Amount>> {
        let conn = self.pool.get()?;
        CapConfigRepo::get(&conn, key)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────────────────────────────────────

/// Caps held in a map.
#[derive(Default)]
pub struct InMemoryCapConfig {
    caps: RwLock<HashMap<CapKey, Amount>>,
}

impl InMemoryCapConfig {
    /// Empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cap for `key`.
    pub fn set_cap(&self, key: CapKey, annual_cap: Amount) {
        let _ = self.caps.write().insert(key, annual_cap);
    }

    /// Builder form of [`set_cap`](Self::set_cap).
    #[must_use]
    pub fn with_cap(self, key: CapKey, annual_cap: Amount) -> Self {
        self.set_cap(key, annual_cap);
        self
    }
}

impl CapConfigProvider for InMemoryCapConfig {
    fn annual_cap(&self, key: &CapKey) -> Result<Option<Amount>> {
        Ok(self.caps.read().get(key).copied())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::{ConnectionConfig, new_in_memory, run_migrations};
    use tally_core::Category;

    fn key(category: Category) -> CapKey {
        CapKey::new("e1".into(), "2024".into(), category)
    }

    #[test]
    fn in_memory_lookup() {
        let caps = InMemoryCapConfig::new().with_cap(key(Category::Medical), Amount::major(500));
        assert_eq!(
            caps.annual_cap(&key(Category::Medical)).unwrap(),
            Some(Amount::major(500))
        );
        assert_eq!(caps.annual_cap(&key(Category::Books)).unwrap(), None);

        caps.set_cap(key(Category::Medical), Amount::major(800));
        assert_eq!(
            caps.annual_cap(&key(Category::Medical)).unwrap(),
            Some(Amount::major(800))
        );
    }

    #[test]
    fn sqlite_set_and_read() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let _ = run_migrations(&pool.get().unwrap()).unwrap();
        let caps = SqliteCapConfig::new(pool);

        assert_eq!(caps.annual_cap(&key(Category::Fuel)).unwrap(), None);
        caps.set_cap(&key(Category::Fuel), Amount::major(21_600)).unwrap();
        assert_eq!(
            caps.annual_cap(&key(Category::Fuel)).unwrap(),
            Some(Amount::major(21_600))
        );
    }
}
