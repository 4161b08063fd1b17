//! The all-or-nothing write unit for lifecycle operations.
//!
//! Initiation, action processing, and cancellation each touch several
//! records (instance, old task, new task, history). A [`TransitionCommit`]
//! carries all of them so a backend can apply the whole set atomically:
//! the memory adapter holds every table lock for the duration, the
//! PostgreSQL adapter wraps the writes in one transaction.

use caseflow_types::{
    AssignedTask, InstanceId, InstanceStatus, StepId, TaskId, UserId, WorkflowInstance,
};

/// Instance-level effect of a commit
#[derive(Clone, Debug)]
pub enum InstanceWrite {
    /// Insert a brand-new instance (initiation)
    Create(WorkflowInstance),
    /// Guarded update of an existing instance; fails with
    /// [`crate::StorageError::Conflict`] when `expected_version` is stale
    Advance {
        instance_id: InstanceId,
        expected_version: u64,
        new_step: StepId,
        new_status: InstanceStatus,
        /// Set `completed_at` as part of this write
        closes: bool,
    },
}

/// How to close the instance's live task
#[derive(Clone, Debug)]
pub enum TaskClose {
    /// The assignee acted on it
    Complete(TaskId),
    /// The instance was cancelled out from under it
    Skip(TaskId),
}

/// History entry to append; the store assigns id, sequence, and timestamp
#[derive(Clone, Debug)]
pub struct HistoryAppend {
    pub instance_id: InstanceId,
    pub from_step: Option<StepId>,
    pub to_step: StepId,
    pub action: String,
    pub performed_by: UserId,
    pub comment: String,
}

/// One atomic lifecycle write
#[derive(Clone, Debug)]
pub struct TransitionCommit {
    pub instance: InstanceWrite,
    /// Live task to close, if one exists
    pub close_task: Option<TaskClose>,
    /// Replacement or first task, unless the instance went terminal
    pub create_task: Option<AssignedTask>,
    pub history: HistoryAppend,
}
