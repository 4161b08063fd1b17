//! Typed error taxonomy for the engine.
//!
//! Callers branch on variants, never on message text. The daemon maps each
//! kind to an HTTP status; the engine never attempts local recovery.

use crate::directory::UserId;
use crate::instance::InstanceId;
use crate::task::TaskId;
use crate::template::StepId;
use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the workflow engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// No active template matches the given key
    #[error("workflow template not found: {0}")]
    TemplateNotFound(String),

    /// A step id does not belong to the template
    #[error("step not found: {0}")]
    StepNotFound(StepId),

    /// No instance with this id exists
    #[error("workflow instance not found: {0}")]
    InstanceNotFound(InstanceId),

    /// No task with this id exists
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// The stored template graph violates a structural invariant
    /// (missing initial step, missing "submit" transition, dangling step)
    #[error("template configuration error: {0}")]
    Configuration(String),

    /// The performer does not hold any role allowed on the current step,
    /// or has already acted on it
    #[error("user {user} may not act on step {step}")]
    PermissionDenied { user: UserId, step: StepId },

    /// No transition with this action leaves the current step
    #[error("no transition for action '{action}' from step {step}")]
    InvalidAction { step: StepId, action: String },

    /// The instance is already in a terminal status
    #[error("workflow instance {0} is closed")]
    AlreadyClosed(InstanceId),

    /// Dispatch could not find an eligible user for the target step
    #[error("no eligible assignee for step {0}")]
    NoAssigneeAvailable(StepId),

    // Template-graph validation failures, reported at publish time.
    #[error("duplicate step id: {0}")]
    DuplicateStepId(StepId),

    #[error("duplicate action '{action}' leaving step {step}")]
    DuplicateAction { step: StepId, action: String },

    #[error("template must have exactly one initial step, found {0}")]
    InitialStepCount(usize),

    #[error("template has no final step reachable from the initial step")]
    NoReachableFinalStep,

    #[error("validation error: {0}")]
    Validation(String),

    /// Storage-layer failure passed through verbatim
    #[error("storage error: {0}")]
    Storage(String),
}
