//! Error types for ledger, claim, and progress-log operations.
//!
//! [`TallyError`] is returned by every store operation. Callers branch on
//! [`TallyError::kind`] rather than on individual variants: the kind is the
//! stable contract, variants carry detail for logs.

use tally_core::ValidationError;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum TallyError {
    /// Input rejected before any state was touched.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// No annual cap is configured for the key.
    #[error("no cap configured for {0}")]
    NotConfigured(String),

    /// Requested claim does not exist.
    #[error("claim not found: {0}")]
    ClaimNotFound(String),

    /// Requested auditable entity does not exist.
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    /// Concurrent writers kept winning for the whole retry budget.
    #[error("concurrency conflict on {key} after {attempts} attempts")]
    ConcurrencyConflict {
        /// Contended key.
        key: String,
        /// Attempts made, the first included.
        attempts: u32,
    },

    /// A claim with this ID was already admitted.
    #[error("duplicate claim: {0}")]
    DuplicateClaim(String),

    /// Stored state contradicts itself (missing log, broken projection).
    #[error("integrity error: {0}")]
    Integrity(String),

    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// Internal error (e.g. a cap provider failure).
    #[error("internal error: {0}")]
    Internal(String),

    /// A compare-and-swap lost to a concurrent writer. Retried by the
    /// write executor and never surfaced once retries are exhausted.
    #[error("write lost to a concurrent update on {0}")]
    Contended(String),
}

/// Coarse classification exposed to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; retrying the same call fails the same way.
    Validation,
    /// Missing claim, entity, or cap configuration.
    NotFound,
    /// Retry budget exhausted; the call may be retried later.
    ConcurrencyConflict,
    /// The claim ID was already used.
    DuplicateClaim,
    /// Storage failure.
    Persistence,
}

impl TallyError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotConfigured(_) | Self::ClaimNotFound(_) | Self::EntityNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::ConcurrencyConflict { .. } | Self::Contended(_) => {
                ErrorKind::ConcurrencyConflict
            }
            Self::DuplicateClaim(_) => ErrorKind::DuplicateClaim,
            Self::Integrity(_)
            | Self::Sqlite(_)
            | Self::Pool(_)
            | Self::Migration { .. }
            | Self::Internal(_) => ErrorKind::Persistence,
        }
    }

    /// Whether the write executor should retry after this error.
    ///
    /// True for `SQLITE_BUSY`/`SQLITE_LOCKED`, a lost compare-and-swap, and a
    /// primary-key collision on an append (another writer took the slot).
    pub fn is_contention(&self) -> bool {
        match self {
            Self::Contended(_) => true,
            Self::Sqlite(rusqlite::Error::SqliteFailure(code, _)) => {
                matches!(
                    code.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) || code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            }
            _ => false,
        }
    }
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, TallyError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
