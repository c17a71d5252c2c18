//! # tally
//!
//! Command-line front end: configure caps, submit and decide claims, append
//! progress entries, and inspect or verify what is stored. Every command
//! prints its result as pretty JSON on stdout; logs go to stderr.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tally_core::{
    ActorId, Amount, CapKey, Category, ClaimId, Decision, EntityId, EntityType, PeriodId,
    Progress, Status, SubjectId,
};
use tally_settings::TallySettings;
use tally_store::{
    AppendEntryRequest, ClaimSubmission, ErrorKind, SqliteCapConfig, TallyError, TallyStore,
};
use tracing::debug;

/// Capped allowance ledger and auditable progress logs.
#[derive(Parser, Debug)]
#[command(name = "tally", version, about)]
struct Cli {
    /// Path to the `SQLite` database (overrides settings).
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Settings file (default: `~/.tally/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Actor recorded on writes.
    #[arg(long, global = true, default_value = "cli")]
    actor: String,

    #[command(subcommand)]
    command: Command,
}

/// Identifies one cap key.
#[derive(clap::Args, Debug)]
struct KeyArgs {
    /// Claimant.
    #[arg(long)]
    subject: String,
    /// Allowance period.
    #[arg(long)]
    period: String,
    /// Allowance category (e.g. `medical`, `leave_travel`).
    #[arg(long)]
    category: Category,
}

impl KeyArgs {
    fn key(&self) -> Result<CapKey> {
        Ok(CapKey::new(
            SubjectId::parse(&self.subject)?,
            PeriodId::parse(&self.period)?,
            self.category,
        ))
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Configure the annual cap for a key.
    SetCap {
        #[command(flatten)]
        key: KeyArgs,
        /// Annual cap, e.g. `15000` or `15000.50`.
        #[arg(long)]
        amount: Amount,
    },
    /// Submit a claim against its cap.
    SubmitClaim {
        #[command(flatten)]
        key: KeyArgs,
        /// Requested amount.
        #[arg(long)]
        amount: Amount,
        /// Reference to the supporting document.
        #[arg(long)]
        proof: String,
        /// Caller-chosen claim ID (generated when omitted).
        #[arg(long)]
        claim_id: Option<String>,
    },
    /// Approve or reject a pending claim.
    DecideClaim {
        /// Claim to decide.
        claim_id: String,
        /// `approved` or `rejected`.
        #[arg(long)]
        decision: Decision,
        /// Reviewer's comment.
        #[arg(long)]
        comment: Option<String>,
    },
    /// Show one claim.
    Claim {
        /// Claim ID.
        claim_id: String,
    },
    /// List claims for a subject in a period.
    Claims {
        /// Claimant.
        #[arg(long)]
        subject: String,
        /// Allowance period.
        #[arg(long)]
        period: String,
    },
    /// Show cap consumption for a key.
    CapStatus {
        #[command(flatten)]
        key: KeyArgs,
    },
    /// List the admission journal for a key.
    Admissions {
        #[command(flatten)]
        key: KeyArgs,
    },
    /// Append a progress entry, creating the entity on first use.
    AppendEntry {
        /// Entity ID.
        entity_id: String,
        /// `goal`, `review`, or `improvement_plan`.
        #[arg(long = "type")]
        entity_type: EntityType,
        /// Status word, e.g. `"In Progress"`.
        #[arg(long)]
        status: String,
        /// Progress percentage `0..=100`.
        #[arg(long)]
        progress: String,
        /// Note (required for improvement plans).
        #[arg(long)]
        note: Option<String>,
        /// Entry time in RFC 3339 (default: now).
        #[arg(long)]
        recorded_at: Option<String>,
    },
    /// Show an entity with its full log.
    Entity {
        /// Entity ID.
        entity_id: String,
    },
    /// Check an entity's checksum chain and projection.
    Verify {
        /// Entity ID.
        entity_id: String,
    },
}

fn load_settings(cli: &Cli) -> Result<TallySettings> {
    let path = cli
        .settings
        .clone()
        .unwrap_or_else(tally_settings::settings_path);
    let mut settings = tally_settings::load_settings_from_path(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    if let Some(db_path) = &cli.db_path {
        settings.database.path = db_path.to_string_lossy().into_owned();
    }
    Ok(settings)
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid --recorded-at {raw:?}, expected RFC 3339"))?
        .with_timezone(&Utc))
}

fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(&cli)?;
    tally_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);
    debug!(db = %settings.database.path, "opening store");

    let store = TallyStore::open(&settings).context("failed to open database")?;
    let actor = ActorId::parse(&cli.actor)?;

    match cli.command {
        Command::SetCap { key, amount } => {
            let key = key.key()?;
            SqliteCapConfig::new(store.pool().clone()).set_cap(&key, amount)?;
            print_json(&store.cap_status(&key)?)
        }
        Command::SubmitClaim {
            key,
            amount,
            proof,
            claim_id,
        } => {
            let key = key.key()?;
            let submission = ClaimSubmission {
                claim_id: claim_id.as_deref().map(ClaimId::parse).transpose()?,
                subject_id: key.subject_id,
                period_id: key.period_id,
                category: key.category,
                requested_amount: amount,
                proof_reference: proof,
                submitted_by: actor,
            };
            print_json(&store.submit_claim(&submission)?)
        }
        Command::DecideClaim {
            claim_id,
            decision,
            comment,
        } => {
            let claim_id = ClaimId::parse(&claim_id)?;
            print_json(&store.decide_claim(&claim_id, decision, comment.as_deref(), &actor)?)
        }
        Command::Claim { claim_id } => print_json(&store.get_claim(&ClaimId::parse(&claim_id)?)?),
        Command::Claims { subject, period } => print_json(
            &store.list_claims(&SubjectId::parse(&subject)?, &PeriodId::parse(&period)?)?,
        ),
        Command::CapStatus { key } => print_json(&store.cap_status(&key.key()?)?),
        Command::Admissions { key } => print_json(&store.list_admissions(&key.key()?)?),
        Command::AppendEntry {
            entity_id,
            entity_type,
            status,
            progress,
            note,
            recorded_at,
        } => {
            let request = AppendEntryRequest {
                entity_id: EntityId::parse(&entity_id)?,
                entity_type,
                status: Status::parse_for(entity_type, &status)?,
                progress: i64::from(Progress::parse(&progress)?.value()),
                note,
                recorded_by: actor,
                recorded_at: recorded_at.as_deref().map(parse_timestamp).transpose()?,
            };
            print_json(&store.append_entry(&request)?)
        }
        Command::Entity { entity_id } => {
            print_json(&store.get_entity(&EntityId::parse(&entity_id)?)?)
        }
        Command::Verify { entity_id } => {
            let report = store.verify_log(&EntityId::parse(&entity_id)?)?;
            print_json(&report)?;
            if report.is_intact() {
                Ok(())
            } else {
                Err(TallyError::Integrity(format!(
                    "progress log for {entity_id} failed verification"
                ))
                .into())
            }
        }
    }
}

/// Process exit code for a failed command.
fn exit_code(err: &anyhow::Error) -> u8 {
    let kind = err
        .downcast_ref::<TallyError>()
        .map(TallyError::kind)
        .or_else(|| {
            err.downcast_ref::<tally_core::ValidationError>()
                .map(|_| ErrorKind::Validation)
        });
    match kind {
        Some(ErrorKind::Validation) => 2,
        Some(ErrorKind::NotFound) => 3,
        Some(ErrorKind::ConcurrencyConflict) => 4,
        Some(ErrorKind::DuplicateClaim) => 5,
        Some(ErrorKind::Persistence) | None => 1,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
