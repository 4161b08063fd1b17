//! Caseflow domain types.
//!
//! A workflow is a directed graph of steps (states) connected by named,
//! role-guarded transitions. Templates are immutable once published; a
//! running case is tracked by a [`WorkflowInstance`] that always sits on
//! exactly one step of its template. Every transition leaves one
//! append-only [`WorkflowHistory`] record, and every non-terminal instance
//! owns exactly one live [`AssignedTask`].
//!
//! This crate holds the data model and the typed error taxonomy. It has no
//! I/O: storage capabilities live in `caseflow-store`, behavior in
//! `caseflow-engine`.

#![deny(unsafe_code)]

pub mod details;
pub mod directory;
pub mod error;
pub mod history;
pub mod instance;
pub mod task;
pub mod template;

pub use details::{SenderInfo, TaskDetails, TASK_DETAILS_SCHEMA_VERSION};
pub use directory::{RoleId, UserId, UserRecord};
pub use error::{EngineError, EngineResult};
pub use history::{HistoryId, WorkflowHistory};
pub use instance::{InstanceId, InstanceStatus, Priority, WorkflowInstance};
pub use task::{AssignedTask, TaskId, TaskStatus};
pub use template::{
    ApprovalPolicy, StepId, StepOutcome, TemplateId, TransitionCondition, TransitionId,
    WorkflowStep, WorkflowTemplate, WorkflowTransition,
};
