//! # tally-core
//!
//! Foundation types shared by every tally crate:
//!
//! - **Branded IDs**: `SubjectId`, `PeriodId`, `ClaimId`, `EntityId`, `ActorId`
//! - **Amounts**: [`Amount`], exact money in minor units (cents)
//! - **Vocabularies**: allowance [`Category`], auditable [`EntityType`] and its
//!   per-type [`Status`] set, bounded [`Progress`], claim decisions
//! - **Errors**: [`ValidationError`], every way an input can be rejected
//! - **Retry**: [`RetryPolicy`] with jittered exponential backoff
//! - **Logging**: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod amount;
pub mod domain;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod retry;

pub use amount::Amount;
pub use domain::{CapKey, Category, Decision, DecisionStatus, EntityType, Progress, Status};
pub use errors::ValidationError;
pub use ids::{ActorId, ClaimId, EntityId, PeriodId, SubjectId};
pub use retry::RetryPolicy;
