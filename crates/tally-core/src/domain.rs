//! Domain vocabularies.
//!
//! - [`Category`]: the fixed set of capped allowance categories
//! - [`CapKey`]: `(subject, period, category)`, the unit of cap enforcement
//! - [`EntityType`] and [`Status`]: auditable record kinds and their allowed
//!   status words
//! - [`Progress`]: percentage in `0..=100`
//! - [`DecisionStatus`] / [`Decision`]: claim review outcome
//!
//! Every enum stores as its `as_str()` form in SQLite and parses leniently on
//! case and separators (`"in progress"`, `"IN_PROGRESS"`, `"in-progress"`),
//! but strictly on vocabulary: unknown words are rejected, never defaulted.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;
use crate::ids::{PeriodId, SubjectId};

/// Lowercase and collapse `' '`, `'-'`, `'_'` to `'_'`.
fn normalize(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

macro_rules! sql_text_enum {
    ($name:ident) => {
        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: ValidationError| FromSqlError::Other(Box::new(e)))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// ─────────────────────────────────────────────────────────────────────────────
// Category
// ─────────────────────────────────────────────────────────────────────────────

/// Capped reimbursement category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Medical reimbursement.
    Medical,
    /// Leave travel allowance.
    LeaveTravel,
    /// Fuel and vehicle maintenance.
    Fuel,
    /// Telephone and internet.
    Telephone,
    /// Meal vouchers.
    Meal,
    /// Children education allowance.
    ChildrenEducation,
    /// Books and periodicals.
    Books,
}

impl Category {
    /// Every category, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Medical,
        Self::LeaveTravel,
        Self::Fuel,
        Self::Telephone,
        Self::Meal,
        Self::ChildrenEducation,
        Self::Books,
    ];

    /// Storage / wire form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Medical => "medical",
            Self::LeaveTravel => "leave_travel",
            Self::Fuel => "fuel",
            Self::Telephone => "telephone",
            Self::Meal => "meal",
            Self::ChildrenEducation => "children_education",
            Self::Books => "books",
        }
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalize(s);
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == key)
            .ok_or_else(|| ValidationError::UnknownCategory(s.to_owned()))
    }
}

sql_text_enum!(Category);

// ─────────────────────────────────────────────────────────────────────────────
// CapKey
// ─────────────────────────────────────────────────────────────────────────────

/// The `(subject, period, category)` triple a cap is enforced on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapKey {
    /// Claimant.
    pub subject_id: SubjectId,
    /// Allowance period.
    pub period_id: PeriodId,
    /// Allowance category.
    pub category: Category,
}

impl CapKey {
    /// Build a key.
    pub fn new(subject_id: SubjectId, period_id: PeriodId, category: Category) -> Self {
        Self {
            subject_id,
            period_id,
            category,
        }
    }
}

impl fmt::Display for CapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.subject_id, self.period_id, self.category)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EntityType / Status
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of auditable record carrying a progress log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// Employee goal.
    Goal,
    /// Performance review.
    Review,
    /// Performance improvement plan.
    ImprovementPlan,
}

/// Status words shared by goals and reviews.
const GOAL_REVIEW_STATUSES: &[Status] = &[Status::NotStarted, Status::InProgress, Status::Completed];

/// Improvement plans add `Active`, `Extended`, and `Terminated`.
const IMPROVEMENT_PLAN_STATUSES: &[Status] = &[
    Status::NotStarted,
    Status::Active,
    Status::InProgress,
    Status::Completed,
    Status::Extended,
    Status::Terminated,
];

impl EntityType {
    /// Every entity type.
    pub const ALL: [Self; 3] = [Self::Goal, Self::Review, Self::ImprovementPlan];

    /// Storage / wire form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Goal => "goal",
            Self::Review => "review",
            Self::ImprovementPlan => "improvement_plan",
        }
    }

    /// Status vocabulary allowed for this type.
    #[must_use]
    pub const fn allowed_statuses(self) -> &'static [Status] {
        match self {
            Self::Goal | Self::Review => GOAL_REVIEW_STATUSES,
            Self::ImprovementPlan => IMPROVEMENT_PLAN_STATUSES,
        }
    }

    /// Whether `status` belongs to this type's vocabulary.
    #[must_use]
    pub fn allows(self, status: Status) -> bool {
        self.allowed_statuses().contains(&status)
    }

    /// Whether every entry must carry a note.
    #[must_use]
    pub const fn requires_note(self) -> bool {
        matches!(self, Self::ImprovementPlan)
    }
}

impl FromStr for EntityType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalize(s);
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == key)
            .ok_or_else(|| ValidationError::UnknownEntityType(s.to_owned()))
    }
}

sql_text_enum!(EntityType);

/// Progress status word.
///
/// No transition graph is enforced: any allowed status may follow any other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Work has not begun.
    #[serde(rename = "Not Started")]
    NotStarted,
    /// Plan in force, between milestones.
    Active,
    /// Work under way.
    #[serde(rename = "In Progress")]
    InProgress,
    /// Finished.
    Completed,
    /// Plan deadline pushed out.
    Extended,
    /// Plan ended early.
    Terminated,
}

impl Status {
    const ALL: [Self; 6] = [
        Self::NotStarted,
        Self::Active,
        Self::InProgress,
        Self::Completed,
        Self::Extended,
        Self::Terminated,
    ];

    /// Canonical display / storage form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "Not Started",
            Self::Active => "Active",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::Extended => "Extended",
            Self::Terminated => "Terminated",
        }
    }

    /// Parse and check membership in `entity_type`'s vocabulary in one step.
    pub fn parse_for(entity_type: EntityType, raw: &str) -> Result<Self, ValidationError> {
        let status: Self = raw.parse()?;
        if !entity_type.allows(status) {
            return Err(ValidationError::StatusNotAllowed {
                entity_type,
                status,
            });
        }
        Ok(status)
    }
}

impl FromStr for Status {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalize(s);
        Self::ALL
            .into_iter()
            .find(|st| normalize(st.as_str()) == key)
            .ok_or_else(|| ValidationError::UnknownStatus(s.to_owned()))
    }
}

sql_text_enum!(Status);

// ─────────────────────────────────────────────────────────────────────────────
// Progress
// ─────────────────────────────────────────────────────────────────────────────

/// Completion percentage, always within `0..=100`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Progress(u8);

impl Progress {
    /// Upper bound.
    pub const MAX: u8 = 100;

    /// Range-checked constructor.
    pub fn new(value: i64) -> Result<Self, ValidationError> {
        if (0..=i64::from(Self::MAX)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ValidationError::ProgressOutOfRange(value))
        }
    }

    /// Parse user text. Non-integers are rejected, never clamped or defaulted.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        let value: i64 = trimmed
            .parse()
            .map_err(|_| ValidationError::ProgressNotNumeric(raw.to_owned()))?;
        Self::new(value)
    }

    /// Percentage value.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl<'de> Deserialize<'de> for Progress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = i64::deserialize(deserializer)?;
        Self::new(value).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl ToSql for Progress {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(i64::from(self.0)))
    }
}

impl FromSql for Progress {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_i64()?;
        Self::new(raw).map_err(|_| FromSqlError::OutOfRange(raw))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Claim decisions
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of a claim record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    /// Awaiting review.
    Pending,
    /// Accepted by a reviewer.
    Approved,
    /// Declined by a reviewer.
    Rejected,
}

impl DecisionStatus {
    /// Storage / wire form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl FromStr for DecisionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(ValidationError::UnknownDecision(s.to_owned())),
        }
    }
}

sql_text_enum!(DecisionStatus);

/// A reviewer's verdict. `Pending` is not a decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Approve the claim.
    Approved,
    /// Reject the claim.
    Rejected,
}

impl From<Decision> for DecisionStatus {
    fn from(d: Decision) -> Self {
        match d {
            Decision::Approved => Self::Approved,
            Decision::Rejected => Self::Rejected,
        }
    }
}

impl FromStr for Decision {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<DecisionStatus>()? {
            DecisionStatus::Approved => Ok(Self::Approved),
            DecisionStatus::Rejected => Ok(Self::Rejected),
            DecisionStatus::Pending => Err(ValidationError::InvalidDecision),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(DecisionStatus::from(*self).as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
