//! Assigned tasks: the actionable item for one user on one step.

use crate::directory::UserId;
use crate::instance::InstanceId;
use crate::template::StepId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for an assigned task
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of work assigned to one user for one instance at one step
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssignedTask {
    pub id: TaskId,
    pub instance_id: InstanceId,
    pub step_id: StepId,
    pub assignee: UserId,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl AssignedTask {
    pub fn new(instance_id: InstanceId, step_id: StepId, assignee: UserId) -> Self {
        Self {
            id: TaskId::generate(),
            instance_id,
            step_id,
            assignee,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Check if the task still awaits action
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }
}

/// Status of an assigned task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Skipped,
}

impl TaskStatus {
    /// Pending and in-progress tasks count as live assignments
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_is_open() {
        let task = AssignedTask::new(
            InstanceId::new("inst-1"),
            StepId::new("pending_manager"),
            UserId::new("u-1"),
        );
        assert!(task.is_open());
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn test_open_statuses() {
        assert!(TaskStatus::Pending.is_open());
        assert!(TaskStatus::InProgress.is_open());
        assert!(!TaskStatus::Completed.is_open());
        assert!(!TaskStatus::Skipped.is_open());
    }
}
