//! Branded ID newtypes.
//!
//! Subjects, periods, claims, auditable entities, and callers each get a
//! distinct newtype around `String`, so a period ID can never be passed where
//! a subject ID is expected. Subject and period IDs come from the host HR
//! system and are taken verbatim. Claim and entity IDs may be generated
//! locally as UUID v7 (time-ordered).

use std::fmt;

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ValidationError;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap an externally supplied identifier.
            ///
            /// Surrounding whitespace is trimmed; an empty value is rejected.
            pub fn parse(raw: &str) -> Result<Self, ValidationError> {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(ValidationError::Missing { field: $field });
                }
                Ok(Self(trimmed.to_owned()))
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value.as_str().map(|s| Self(s.to_owned()))
            }
        }
    };
}

macro_rules! generated_id {
    ($name:ident, $prefix:literal) => {
        impl $name {
            /// Generate a fresh time-ordered ID.
            #[must_use]
            pub fn generate() -> Self {
                Self(format!(concat!($prefix, "_{}"), Uuid::now_v7()))
            }
        }
    };
}

branded_id! {
    /// Employee (or other claimant) whose allowance is being consumed.
    SubjectId, "subject_id"
}

branded_id! {
    /// Allowance period, usually a financial year such as `FY2025-26`.
    PeriodId, "period_id"
}

branded_id! {
    /// Unique claim identifier; doubles as the idempotency key for admission.
    ClaimId, "claim_id"
}

branded_id! {
    /// Goal, review, or improvement plan carrying a progress log.
    EntityId, "entity_id"
}

branded_id! {
    /// Caller performing a write (submitter, reviewer, recorder).
    ActorId, "actor_id"
}

generated_id!(ClaimId, "clm");
generated_id!(EntityId, "ent");

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parse_trims_whitespace() {
        let id = SubjectId::parse("  emp-42 ").unwrap();
        assert_eq!(id.as_str(), "emp-42");
    }

    #[test]
    fn parse_rejects_blank() {
        assert_matches!(
            PeriodId::parse("   "),
            Err(ValidationError::Missing { field: "period_id" })
        );
        assert_matches!(
            ClaimId::parse(""),
            Err(ValidationError::Missing { field: "claim_id" })
        );
    }

    #[test]
    fn generated_claim_ids_are_prefixed_and_unique() {
        let a = ClaimId::generate();
        let b = ClaimId::generate();
        assert!(a.starts_with("clm_"));
        assert_ne!(a, b);
    }

    #[test]
    fn serde_is_transparent() {
        let id = ActorId::from("hr-admin");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"hr-admin\"");
        let back: ActorId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn display_and_deref() {
        let id = EntityId::from("goal-7");
        assert_eq!(id.to_string(), "goal-7");
        assert_eq!(id.len(), 6);
        let s: String = id.into();
        assert_eq!(s, "goal-7");
    }

    #[test]
    fn sqlite_round_trip() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let id = SubjectId::from("emp-1");
        let back: SubjectId = conn
            .query_row("SELECT ?1", [&id], |row| row.get(0))
            .unwrap();
        assert_eq!(back, id);
    }
}
