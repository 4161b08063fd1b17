//! Workflow instances: one running case per instance.
//!
//! An instance always references exactly one step of its template. Status
//! changes and step changes flow exclusively through the lifecycle manager;
//! the `version` counter serializes concurrent writers at the store.

use crate::details::TaskDetails;
use crate::directory::UserId;
use crate::template::{StepId, TemplateId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Instance Identifier ──────────────────────────────────────────────

/// Unique identifier for a workflow instance
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl InstanceId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Workflow Instance ────────────────────────────────────────────────

/// A running case: one execution of a workflow template
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowInstance {
    /// Unique instance identifier
    pub id: InstanceId,
    /// The template this instance executes
    pub template_id: TemplateId,
    /// The step the case currently sits on; always a step of `template_id`
    pub current_step_id: StepId,
    /// Opaque business payload, set at creation and never mutated
    pub details: TaskDetails,
    /// Lifecycle status
    pub status: InstanceStatus,
    /// Who initiated the case
    pub created_by: UserId,
    /// Case priority
    pub priority: Priority,
    /// Advisory due date; the engine never enforces it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    /// When the instance was created
    pub created_at: DateTime<Utc>,
    /// When the instance was last updated
    pub updated_at: DateTime<Utc>,
    /// When the instance reached a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency counter, bumped on every committed write
    pub version: u64,
}

impl WorkflowInstance {
    /// Create a new instance sitting on the given step. The caller decides
    /// the status before the first commit; until then it is `Pending`.
    pub fn new(
        template_id: TemplateId,
        current_step_id: StepId,
        details: TaskDetails,
        created_by: UserId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: InstanceId::generate(),
            template_id,
            current_step_id,
            details,
            status: InstanceStatus::Pending,
            created_by,
            priority: Priority::Normal,
            due_date: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            version: 1,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    /// Check if the instance is in a terminal status
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Lifecycle status of an instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Created but not yet committed; never observable after initiation
    #[default]
    Pending,
    /// Waiting on its current step's task
    InProgress,
    /// Closed through a final step with a completed outcome
    Completed,
    /// Closed through a final step with a rejected outcome
    Rejected,
    /// Cancelled by an authorized actor; absorbing from any step
    Cancelled,
}

impl InstanceStatus {
    /// Check if this is a terminal (absorbing) status
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Cancelled)
    }
}

/// Case priority; ordered so guards can compare
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::details::SenderInfo;

    fn make_instance() -> WorkflowInstance {
        WorkflowInstance::new(
            TemplateId::new("tpl-1"),
            StepId::new("pending_manager"),
            TaskDetails::new("task-1", "leave_request", SenderInfo::new("u-1", "Ann")),
            UserId::new("u-1"),
        )
    }

    #[test]
    fn test_new_instance_defaults() {
        let instance = make_instance();
        assert_eq!(instance.status, InstanceStatus::Pending);
        assert_eq!(instance.priority, Priority::Normal);
        assert_eq!(instance.version, 1);
        assert!(!instance.is_terminal());
        assert!(instance.completed_at.is_none());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!InstanceStatus::Pending.is_terminal());
        assert!(!InstanceStatus::InProgress.is_terminal());
        assert!(InstanceStatus::Completed.is_terminal());
        assert!(InstanceStatus::Rejected.is_terminal());
        assert!(InstanceStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }

    #[test]
    fn test_builder_fields() {
        let due = Utc::now();
        let instance = make_instance()
            .with_priority(Priority::High)
            .with_due_date(due);
        assert_eq!(instance.priority, Priority::High);
        assert_eq!(instance.due_date, Some(due));
    }

    #[test]
    fn test_instance_id() {
        let id = InstanceId::generate();
        assert!(!id.0.is_empty());
        assert!(id.short().len() <= 8);
        assert_eq!(format!("{}", InstanceId::new("inst-1")), "inst-1");
    }
}
