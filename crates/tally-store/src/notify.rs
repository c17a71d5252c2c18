//! Post-commit notifications.
//!
//! The store calls [`Notifier::notify`] after a decision or a status change
//! has committed. Delivery is fire-and-forget: a notifier cannot fail the
//! write that triggered it.

use serde::Serialize;
use tally_core::{ActorId, ClaimId, Decision, EntityId, EntityType, Progress, Status, SubjectId};
use tracing::info;

/// Something a collaborator may want to hear about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// A claim was approved or rejected.
    ClaimDecided {
        /// Decided claim.
        claim_id: ClaimId,
        /// Claimant to inform.
        subject_id: SubjectId,
        /// Outcome.
        decision: Decision,
        /// Reviewer.
        decided_by: ActorId,
    },
    /// An entity was created or its status moved.
    StatusChanged {
        /// Entity.
        entity_id: EntityId,
        /// Entity type.
        entity_type: EntityType,
        /// Status before the append, `None` on creation.
        previous: Option<Status>,
        /// Status after the append.
        current: Status,
        /// Progress after the append.
        progress: Progress,
    },
}

/// Receiver of post-commit notifications.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    /// Deliver one notification.
    fn notify(&self, notification: &Notification);
}

/// Logs every notification at `info`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: &Notification) {
        match notification {
            Notification::ClaimDecided {
                claim_id,
                subject_id,
                decision,
                decided_by,
            } => {
                info!(
                    claim_id = %claim_id,
                    subject_id = %subject_id,
                    decision = %decision,
                    decided_by = %decided_by,
                    "claim decided"
                );
            }
            Notification::StatusChanged {
                entity_id,
                entity_type,
                previous,
                current,
                progress,
            } => {
                info!(
                    entity_id = %entity_id,
                    entity_type = %entity_type,
                    previous = previous.map(Status::as_str),
                    current = %current,
                    progress = progress.value(),
                    "entity status changed"
                );
            }
        }
    }
}

/// Drops every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _notification: &Notification) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_kind_tag() {
        let n = Notification::ClaimDecided {
            claim_id: "c1".into(),
            subject_id: "e1".into(),
            decision: Decision::Rejected,
            decided_by: "mgr".into(),
        };
        let json = serde_json::to_string(&n).unwrap();
        assert!(json.contains(r#""kind":"claim_decided""#));
        assert!(json.contains(r#""decision":"rejected""#));
    }

    #[test]
    fn builtin_notifiers_accept_everything() {
        let n = Notification::StatusChanged {
            entity_id: "g1".into(),
            entity_type: EntityType::Goal,
            previous: None,
            current: Status::NotStarted,
            progress: Progress::default(),
        };
        TracingNotifier.notify(&n);
        NoopNotifier.notify(&n);
    }
}
