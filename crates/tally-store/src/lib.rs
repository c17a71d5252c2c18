//! # tally-store
//!
//! Capped-allowance ledger, claim intake, and append-only progress logs on
//! `SQLite`.
//!
//! - **[`ledger`]**: per `(subject, period, category)` cumulative tracking
//!   with the claimable/taxable split
//! - **[`intake`]**: claim submission and review decisions
//! - **[`progress_log`]**: gap-free, checksum-chained progress entries
//! - **[`projector`]**: current status/progress derived from the log
//! - **[`executor`]**: `BEGIN IMMEDIATE` transactions with bounded retry
//! - **[`provider`]**: where annual caps come from
//! - **[`notify`]**: post-commit notifications
//! - **[`store`]**: the [`TallyStore`] facade tying them together
//!
//! ## Concurrency
//!
//! Writers for the same cap key or entity are serialized by the database
//! write lock and guarded by compare-and-swap on a per-row `version`.
//! Contention is retried with jittered backoff; an exhausted budget is
//! [`ErrorKind::ConcurrencyConflict`] and leaves no partial state.

#![deny(unsafe_code)]

pub mod errors;
pub mod executor;
pub mod intake;
pub mod ledger;
pub mod notify;
pub mod progress_log;
pub mod projector;
pub mod provider;
pub mod sqlite;
pub mod store;
pub mod types;

pub use errors::{ErrorKind, Result, TallyError};
pub use executor::WriteExecutor;
pub use intake::{ClaimIntake, ClaimSubmission};
pub use ledger::{AllowanceCapLedger, compute_admission};
pub use notify::{NoopNotifier, Notification, Notifier, TracingNotifier};
pub use progress_log::{AppendEntryRequest, AppendOutcome, ProgressLog};
pub use projector::{ProjectedState, StateProjector};
pub use provider::{CapConfigProvider, InMemoryCapConfig, SqliteCapConfig};
pub use store::TallyStore;
pub use types::{
    Admission, AdmissionRecord, AuditableEntity, CapLedgerEntry, CapStatus, ClaimRecord,
    LogVerification, ProgressEntry,
};
