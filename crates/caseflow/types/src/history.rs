//! Audit history: one immutable record per transition.
//!
//! History is the sole source of truth for "what happened". Records are
//! append-only; the store assigns the server timestamp and the per-instance
//! sequence at commit time. Ordered by sequence, the entries reconstruct
//! the full path of the case: entry *i*'s `to_step` is entry *i+1*'s
//! `from_step`. Quorum votes that do not advance the step are recorded
//! with `from_step == to_step`, which keeps the chain unbroken.

use crate::directory::UserId;
use crate::instance::InstanceId;
use crate::template::StepId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a history record
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryId(pub String);

impl HistoryId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for HistoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An immutable audit record of one transition
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowHistory {
    pub id: HistoryId,
    pub instance_id: InstanceId,
    /// Per-instance sequence, assigned by the store
    pub sequence: u64,
    /// Source step; `None` is permitted only for the very first entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_step: Option<StepId>,
    /// Target step
    pub to_step: StepId,
    /// The action that caused this record
    pub action: String,
    /// Who performed the action
    pub performed_by: UserId,
    /// Free-text comment supplied by the performer
    #[serde(default)]
    pub comment: String,
    /// Server-assigned timestamp
    pub recorded_at: DateTime<Utc>,
}

impl WorkflowHistory {
    /// A quorum vote that stayed on the same step
    pub fn is_quorum_entry(&self) -> bool {
        self.from_step.as_ref() == Some(&self.to_step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entry(from: Option<&str>, to: &str) -> WorkflowHistory {
        WorkflowHistory {
            id: HistoryId::generate(),
            instance_id: InstanceId::new("inst-1"),
            sequence: 0,
            from_step: from.map(StepId::new),
            to_step: StepId::new(to),
            action: "approve".into(),
            performed_by: UserId::new("u-1"),
            comment: String::new(),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_quorum_entry_detection() {
        assert!(make_entry(Some("pending_manager"), "pending_manager").is_quorum_entry());
        assert!(!make_entry(Some("pending_manager"), "approved").is_quorum_entry());
        assert!(!make_entry(None, "pending_manager").is_quorum_entry());
    }
}
