//! High-level `TallyStore` API.
//!
//! Composes the ledger, claim intake, and progress log into the operations
//! collaborators call. Every mutation runs through the [`WriteExecutor`], so
//! it is one serialized, retried transaction: callers never observe partial
//! state, and concurrent writers to the same cap key or entity are applied
//! one after another.
//!
//! Notifications go out after commit and never fail the write.

use std::sync::Arc;

use tally_core::{
    ActorId, Amount, CapKey, ClaimId, Decision, EntityId, PeriodId, RetryPolicy, SubjectId,
    ValidationError,
};
use tally_settings::TallySettings;
use tracing::{debug, instrument};

use crate::errors::{Result, TallyError};
use crate::executor::WriteExecutor;
use crate::intake::{ClaimIntake, ClaimSubmission};
use crate::ledger::AllowanceCapLedger;
use crate::notify::{Notification, Notifier, TracingNotifier};
use crate::progress_log::{AppendEntryRequest, ProgressLog};
use crate::provider::{CapConfigProvider, SqliteCapConfig};
use crate::sqlite::repositories::{AdmissionRepo, ClaimRepo};
use crate::sqlite::row_helpers::now;
use crate::sqlite::{ConnectionConfig, ConnectionPool, new_file, new_in_memory, run_migrations};
use crate::types::{
    Admission, AdmissionRecord, AuditableEntity, CapStatus, ClaimRecord, LogVerification,
};

/// Ledger, claims, and progress logs over one `SQLite` database.
pub struct TallyStore {
    pool: ConnectionPool,
    executor: WriteExecutor,
    ledger: AllowanceCapLedger,
    notifier: Arc<dyn Notifier>,
}

impl TallyStore {
    /// Wrap `pool`, running pending migrations first.
    pub fn new(
        pool: ConnectionPool,
        caps: Arc<dyn CapConfigProvider>,
        notifier: Arc<dyn Notifier>,
        policy: RetryPolicy,
    ) -> Result<Self> {
        {
            let conn = pool.get()?;
            let _ = run_migrations(&conn)?;
        }
        Ok(Self {
            executor: WriteExecutor::new(pool.clone(), policy),
            pool,
            ledger: AllowanceCapLedger::new(caps),
            notifier,
        })
    }

    /// Open the database named in `settings`, with caps read from its
    /// `cap_configs` table and notifications logged.
    pub fn open(settings: &TallySettings) -> Result<Self> {
        let pool = new_file(
            &settings.database.path,
            &ConnectionConfig::from(&settings.database),
        )?;
        let caps = Arc::new(SqliteCapConfig::new(pool.clone()));
        Self::new(pool, caps, Arc::new(TracingNotifier), settings.retry.clone())
    }

    /// Fresh in-memory store.
    pub fn open_in_memory(
        caps: Arc<dyn CapConfigProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let pool = new_in_memory(&ConnectionConfig::default())?;
        Self::new(pool, caps, notifier, RetryPolicy::default())
    }

    /// Underlying connection pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    // ── Allowance cap ledger ────────────────────────────────────────

    /// Admit `requested` against `key` under `claim_id` without recording a
    /// claim.
    #[instrument(skip_all, fields(claim_id = %claim_id, key = %key, requested = %requested))]
    pub fn admit_claim(
        &self,
        claim_id: &ClaimId,
        key: &CapKey,
        requested: Amount,
    ) -> Result<Admission> {
        if claim_id.trim().is_empty() {
            return Err(ValidationError::Missing { field: "claim_id" }.into());
        }
        if requested.is_zero() {
            return Err(ValidationError::NonPositiveAmount.into());
        }
        self.ensure_unadmitted(claim_id)?;
        let cap = self.ledger.configured_cap(key)?;
        self.executor.run(&format!("cap:{key}"), |conn| {
            AllowanceCapLedger::admit(conn, claim_id, key, requested, cap, &now())
        })
    }

    /// A replayed claim ID is a duplicate even when its cap has since been
    /// unconfigured. The write transaction checks again.
    fn ensure_unadmitted(&self, claim_id: &ClaimId) -> Result<()> {
        let conn = self.pool.get()?;
        if AdmissionRepo::exists(&conn, claim_id)? {
            return Err(TallyError::DuplicateClaim(claim_id.to_string()));
        }
        Ok(())
    }

    /// Current consumption for `key`.
    pub fn cap_status(&self, key: &CapKey) -> Result<CapStatus> {
        let conn = self.pool.get()?;
        self.ledger.status(&conn, key)
    }

    /// Admission journal for `key`, oldest first.
    pub fn list_admissions(&self, key: &CapKey) -> Result<Vec<AdmissionRecord>> {
        let conn = self.pool.get()?;
        AdmissionRepo::list_by_key(&conn, key)
    }

    // ── Claims ──────────────────────────────────────────────────────

    /// Validate, admit, and record a claim as pending.
    #[instrument(skip_all, fields(
        subject_id = %submission.subject_id,
        period_id = %submission.period_id,
        category = %submission.category,
    ))]
    pub fn submit_claim(&self, submission: &ClaimSubmission) -> Result<ClaimRecord> {
        submission.validate()?;
        if let Some(claim_id) = &submission.claim_id {
            self.ensure_unadmitted(claim_id)?;
        }
        let key = submission.key();
        let cap = self.ledger.configured_cap(&key)?;
        let claim_id = submission
            .claim_id
            .clone()
            .unwrap_or_else(ClaimId::generate);

        let claim = self.executor.run(&format!("cap:{key}"), |conn| {
            ClaimIntake::submit(conn, &claim_id, submission, cap, &now())
        })?;
        debug!(
            claim_id = %claim.claim_id,
            claimable = %claim.claimable_amount,
            taxable = %claim.taxable_amount,
            "claim submitted"
        );
        Ok(claim)
    }

    /// Approve or reject a pending claim and notify the claimant.
    #[instrument(skip_all, fields(claim_id = %claim_id, decision = %decision))]
    pub fn decide_claim(
        &self,
        claim_id: &ClaimId,
        decision: Decision,
        comment: Option<&str>,
        decided_by: &ActorId,
    ) -> Result<ClaimRecord> {
        if decided_by.trim().is_empty() {
            return Err(ValidationError::Missing { field: "decided_by" }.into());
        }
        let claim = self.executor.run(&format!("claim:{claim_id}"), |conn| {
            ClaimIntake::decide(conn, claim_id, decision, comment, decided_by, &now())
        })?;
        self.notifier.notify(&Notification::ClaimDecided {
            claim_id: claim.claim_id.clone(),
            subject_id: claim.subject_id.clone(),
            decision,
            decided_by: decided_by.clone(),
        });
        Ok(claim)
    }

    /// Claim by ID.
    pub fn get_claim(&self, claim_id: &ClaimId) -> Result<ClaimRecord> {
        let conn = self.pool.get()?;
        ClaimRepo::get(&conn, claim_id)?
            .ok_or_else(|| TallyError::ClaimNotFound(claim_id.to_string()))
    }

    /// Claims for a subject in a period, oldest first.
    pub fn list_claims(
        &self,
        subject_id: &SubjectId,
        period_id: &PeriodId,
    ) -> Result<Vec<ClaimRecord>> {
        let conn = self.pool.get()?;
        ClaimRepo::list_by_subject_period(&conn, subject_id, period_id)
    }

    // ── Progress log ────────────────────────────────────────────────

    /// Append a progress entry, creating the entity on first use.
    #[instrument(skip_all, fields(
        entity_id = %request.entity_id,
        entity_type = %request.entity_type,
        status = %request.status,
    ))]
    pub fn append_entry(&self, request: &AppendEntryRequest) -> Result<AuditableEntity> {
        let entry = request.validate()?;
        let outcome = self
            .executor
            .run(&format!("entity:{}", entry.entity_id()), |conn| {
                ProgressLog::append(conn, &entry, &now())
            })?;

        if outcome.status_changed() {
            self.notifier.notify(&Notification::StatusChanged {
                entity_id: outcome.entity.entity_id.clone(),
                entity_type: outcome.entity.entity_type,
                previous: outcome.previous_status,
                current: outcome.entity.current_status,
                progress: outcome.entity.current_progress,
            });
        }
        Ok(outcome.entity)
    }

    /// Entity with its full log.
    ///
    /// Reads run in one transaction so the log and the entity row come from
    /// the same snapshot.
    pub fn get_entity(&self, entity_id: &EntityId) -> Result<AuditableEntity> {
        let conn = self.pool.get()?;
        let tx = conn.unchecked_transaction()?;
        let entity = ProgressLog::load(&tx, entity_id)?
            .ok_or_else(|| TallyError::EntityNotFound(entity_id.to_string()))?;
        tx.commit()?;
        Ok(entity)
    }

    /// Check an entity's log chain and stored projection.
    pub fn verify_log(&self, entity_id: &EntityId) -> Result<LogVerification> {
        let conn = self.pool.get()?;
        let tx = conn.unchecked_transaction()?;
        let report = ProgressLog::verify(&tx, entity_id)?;
        tx.commit()?;
        Ok(report)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
