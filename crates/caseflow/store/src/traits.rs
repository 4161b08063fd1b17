use crate::commit::TransitionCommit;
use crate::StorageResult;
use async_trait::async_trait;
use caseflow_types::{
    AssignedTask, InstanceId, RoleId, TaskId, TaskStatus, TemplateId, UserId, UserRecord,
    WorkflowHistory, WorkflowInstance, WorkflowTemplate,
};

/// Storage interface for workflow templates.
///
/// Templates are immutable once created; the only mutations are the
/// activation flag and deletion. Lookups by name or type see *active*
/// templates only. In-flight instances resolve their template by id,
/// which ignores the flag so deactivation never strands a running case.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Persist a validated template. Rejects structural invariant
    /// violations and a second active template for an occupied
    /// `workflow_type`.
    async fn create_template(&self, template: WorkflowTemplate) -> StorageResult<()>;

    /// Get a template by id, active or not.
    async fn get_template(&self, id: &TemplateId) -> StorageResult<Option<WorkflowTemplate>>;

    /// Get an active template by name.
    async fn get_template_by_name(&self, name: &str) -> StorageResult<Option<WorkflowTemplate>>;

    /// Get the unique active template for a category.
    async fn get_template_by_type(
        &self,
        workflow_type: &str,
    ) -> StorageResult<Option<WorkflowTemplate>>;

    /// List all templates, newest first.
    async fn list_templates(&self) -> StorageResult<Vec<WorkflowTemplate>>;

    /// Soft-deactivate a template; new initiations stop seeing it.
    async fn deactivate_template(&self, id: &TemplateId) -> StorageResult<()>;

    /// Remove a template.
    async fn delete_template(&self, id: &TemplateId) -> StorageResult<()>;
}

/// Storage interface for workflow instances.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn get_instance(&self, id: &InstanceId) -> StorageResult<Option<WorkflowInstance>>;

    /// Look up the instance correlated with a business task id.
    async fn get_instance_by_business_task(
        &self,
        task_id: &str,
    ) -> StorageResult<Option<WorkflowInstance>>;

    /// Apply a whole [`TransitionCommit`] atomically and return the
    /// written instance. A stale version guard fails with
    /// [`crate::StorageError::Conflict`] and leaves every record untouched.
    async fn commit_transition(&self, commit: TransitionCommit)
        -> StorageResult<WorkflowInstance>;
}

/// Storage interface for assigned tasks.
///
/// Tasks are created and closed only through
/// [`InstanceStore::commit_transition`]; this trait is the read surface.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get_task(&self, id: &TaskId) -> StorageResult<Option<AssignedTask>>;

    /// The single live task of an instance, if any.
    async fn open_task_for_instance(
        &self,
        instance_id: &InstanceId,
    ) -> StorageResult<Option<AssignedTask>>;

    /// Tasks assigned to a user, optionally filtered by status,
    /// newest first.
    async fn tasks_for_user(
        &self,
        user: &UserId,
        status: Option<TaskStatus>,
    ) -> StorageResult<Vec<AssignedTask>>;

    /// Open-task count per user; the dispatcher's load signal.
    async fn count_open_tasks_for_user(&self, user: &UserId) -> StorageResult<usize>;
}

/// Storage interface for append-only audit history.
///
/// Records are written only through [`InstanceStore::commit_transition`].
/// There is no update or delete.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// History for one instance in chronological (sequence) order.
    async fn history_for_instance(
        &self,
        instance_id: &InstanceId,
    ) -> StorageResult<Vec<WorkflowHistory>>;

    /// All records performed by one user, newest first.
    async fn history_by_performer(&self, user: &UserId) -> StorageResult<Vec<WorkflowHistory>>;

    /// All records for one action name, newest first.
    async fn history_by_action(&self, action: &str) -> StorageResult<Vec<WorkflowHistory>>;
}

/// Read surface over the user directory owned by the surrounding system.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, id: &UserId) -> StorageResult<Option<UserRecord>>;

    /// All users holding any of the given roles (active and inactive;
    /// the dispatcher filters).
    async fn users_with_roles(&self, roles: &[RoleId]) -> StorageResult<Vec<UserRecord>>;

    /// Insert or replace a directory record.
    async fn upsert_user(&self, user: UserRecord) -> StorageResult<()>;
}

/// Unified storage bundle for components that need everything.
pub trait CaseflowStore:
    TemplateStore + InstanceStore + TaskStore + HistoryStore + UserDirectory + Send + Sync
{
}

impl<T> CaseflowStore for T where
    T: TemplateStore + InstanceStore + TaskStore + HistoryStore + UserDirectory + Send + Sync
{
}
