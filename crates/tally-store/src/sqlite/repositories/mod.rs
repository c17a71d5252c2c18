//! Repository implementations for `SQLite` database operations.
//!
//! Each repository is a stateless struct whose methods take a `&Connection`,
//! so the same calls work on a pooled connection or inside a transaction.

pub mod admission;
pub mod cap_config;
pub mod cap_ledger;
pub mod claim;
pub mod entity;
pub mod progress;

pub use admission::AdmissionRepo;
pub use cap_config::CapConfigRepo;
pub use cap_ledger::CapLedgerRepo;
pub use claim::ClaimRepo;
pub use entity::EntityRepo;
pub use progress::ProgressRepo;
