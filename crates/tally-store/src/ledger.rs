//! Allowance cap ledger.
//!
//! Tracks cumulative claimed per `(subject, period, category)`. Each request
//! is admitted up to the cap headroom; the rest is never counted:
//!
//! ```text
//! remaining       = max(0, cap - cumulative)
//! claimable       = min(requested, remaining)
//! cumulative'     = min(cap, cumulative + claimable)
//! taxable         = max(0, cap - cumulative')
//! ```
//!
//! `taxable` is the headroom left after the admission. `cumulative` never
//! exceeds the cap and never decreases.
//!
//! The split is computed by [`compute_admission`] and persisted by
//! [`AllowanceCapLedger::admit`] inside the caller's write transaction, so
//! the read of `cumulative` and the write of `cumulative'` are one
//! serialized step.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tally_core::{Amount, CapKey, ClaimId, ValidationError};
use tracing::{debug, info, warn};

use crate::errors::{Result, TallyError};
use crate::provider::CapConfigProvider;
use crate::sqlite::repositories::{AdmissionRepo, CapLedgerRepo};
use crate::types::{Admission, CapStatus};

/// Admit `requested` against a cap with `cumulative` already consumed.
pub fn compute_admission(annual_cap: Amount, cumulative: Amount, requested: Amount) -> Admission {
    let remaining = annual_cap.saturating_sub(cumulative);
    let claimable = requested.min(remaining);
    let cumulative_after = annual_cap.min(cumulative.saturating_add(claimable));
    let taxable = annual_cap.saturating_sub(cumulative_after);
    Admission {
        annual_cap,
        claimable_amount: claimable,
        taxable_amount: taxable,
        cumulative_before: cumulative,
        cumulative_after,
    }
}

/// Cap to enforce given the ledger's snapshot and the current configuration.
///
/// Increases take effect; decreases are ignored so a claim already admitted
/// as claimable is never retroactively pushed over the cap.
fn effective_cap(key: &CapKey, snapshot: Amount, configured: Amount) -> Amount {
    if configured > snapshot {
        info!(key = %key, from = %snapshot, to = %configured, "annual cap raised");
        configured
    } else {
        if configured < snapshot {
            warn!(key = %key, snapshot = %snapshot, configured = %configured, "ignoring lowered annual cap");
        }
        snapshot
    }
}

/// Cap-enforcing ledger over a [`CapConfigProvider`].
#[derive(Clone)]
pub struct AllowanceCapLedger {
    caps: Arc<dyn CapConfigProvider>,
}

impl AllowanceCapLedger {
    /// Ledger resolving caps through `caps`.
    pub fn new(caps: Arc<dyn CapConfigProvider>) -> Self {
        Self { caps }
    }

    /// Configured cap for `key`.
    ///
    /// Called before the write transaction opens; a key with no cap is
    /// [`TallyError::NotConfigured`].
    pub fn configured_cap(&self, key: &CapKey) -> Result<Amount> {
        self.caps
            .annual_cap(key)?
            .ok_or_else(|| TallyError::NotConfigured(key.to_string()))
    }

    /// Admit `requested` for `claim_id` against `key`.
    ///
    /// Must run inside a write transaction. Creates the ledger entry on the
    /// first admission, otherwise updates it with a compare-and-swap, then
    /// journals the admission. A replayed `claim_id` is
    /// [`TallyError::DuplicateClaim`] and leaves the ledger untouched.
    pub fn admit(
        conn: &Connection,
        claim_id: &ClaimId,
        key: &CapKey,
        requested: Amount,
        configured_cap: Amount,
        now: &DateTime<Utc>,
    ) -> Result<Admission> {
        if requested.is_zero() {
            return Err(ValidationError::NonPositiveAmount.into());
        }
        if AdmissionRepo::exists(conn, claim_id)? {
            return Err(TallyError::DuplicateClaim(claim_id.to_string()));
        }

        let admission = match CapLedgerRepo::get(conn, key)? {
            Some(entry) => {
                let cap = effective_cap(key, entry.annual_cap, configured_cap);
                let admission = compute_admission(cap, entry.cumulative_claimed, requested);
                let swapped = CapLedgerRepo::compare_and_swap(
                    conn,
                    key,
                    cap,
                    admission.cumulative_after,
                    entry.version,
                    now,
                )?;
                if !swapped {
                    return Err(TallyError::Contended(format!("cap:{key}")));
                }
                admission
            }
            None => {
                let admission = compute_admission(configured_cap, Amount::ZERO, requested);
                CapLedgerRepo::insert(conn, key, configured_cap, admission.cumulative_after, now)?;
                admission
            }
        };

        let _ = AdmissionRepo::insert(conn, claim_id, key, requested, &admission, now)?;
        debug!(
            claim_id = %claim_id,
            key = %key,
            requested = %requested,
            claimable = %admission.claimable_amount,
            taxable = %admission.taxable_amount,
            cumulative = %admission.cumulative_after,
            "claim admitted"
        );
        Ok(admission)
    }

    /// Current consumption for `key`.
    ///
    /// Before any admission the configured cap is reported with nothing
    /// claimed. With neither an entry nor a configured cap the key is
    /// [`TallyError::NotConfigured`].
    pub fn status(&self, conn: &Connection, key: &CapKey) -> Result<CapStatus> {
        let configured = self.caps.annual_cap(key)?;
        let (annual_cap, cumulative_claimed) = match CapLedgerRepo::get(conn, key)? {
            Some(entry) => (
                entry.annual_cap.max(configured.unwrap_or(Amount::ZERO)),
                entry.cumulative_claimed,
            ),
            None => (
                configured.ok_or_else(|| TallyError::NotConfigured(key.to_string()))?,
                Amount::ZERO,
            ),
        };
        Ok(CapStatus {
            key: key.clone(),
            annual_cap,
            cumulative_claimed,
            remaining: annual_cap.saturating_sub(cumulative_claimed),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
