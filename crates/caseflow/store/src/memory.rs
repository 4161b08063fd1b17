//! In-memory reference implementation of the Caseflow storage traits.
//!
//! Deterministic and test-friendly. `commit_transition` takes the
//! instance, task, and history write locks together (always in that
//! order) and validates every guard before touching anything, so a failed
//! commit leaves all three tables exactly as they were.

use crate::commit::{HistoryAppend, InstanceWrite, TaskClose, TransitionCommit};
use crate::traits::{HistoryStore, InstanceStore, TaskStore, TemplateStore, UserDirectory};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use caseflow_types::{
    AssignedTask, HistoryId, InstanceId, RoleId, TaskId, TaskStatus, TemplateId, UserId,
    UserRecord, WorkflowHistory, WorkflowInstance, WorkflowTemplate,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory Caseflow storage adapter.
#[derive(Default)]
pub struct InMemoryStore {
    templates: RwLock<HashMap<TemplateId, WorkflowTemplate>>,
    instances: RwLock<HashMap<InstanceId, WorkflowInstance>>,
    tasks: RwLock<HashMap<TaskId, AssignedTask>>,
    history: RwLock<Vec<WorkflowHistory>>,
    users: RwLock<HashMap<UserId, UserRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(table: &str) -> StorageError {
    StorageError::Backend(format!("{table} lock poisoned"))
}

#[async_trait]
impl TemplateStore for InMemoryStore {
    async fn create_template(&self, template: WorkflowTemplate) -> StorageResult<()> {
        template
            .validate()
            .map_err(|e| StorageError::InvalidInput(e.to_string()))?;

        let mut guard = self.templates.write().map_err(|_| poisoned("templates"))?;

        if guard.contains_key(&template.id) {
            return Err(StorageError::Conflict(format!(
                "template {} already exists",
                template.id
            )));
        }
        if let Some(ref workflow_type) = template.workflow_type {
            let occupied = guard
                .values()
                .any(|t| t.active && t.workflow_type.as_deref() == Some(workflow_type));
            if template.active && occupied {
                return Err(StorageError::Conflict(format!(
                    "an active template already exists for workflow type '{workflow_type}'"
                )));
            }
        }

        guard.insert(template.id.clone(), template);
        Ok(())
    }

    async fn get_template(&self, id: &TemplateId) -> StorageResult<Option<WorkflowTemplate>> {
        let guard = self.templates.read().map_err(|_| poisoned("templates"))?;
        Ok(guard.get(id).cloned())
    }

    async fn get_template_by_name(&self, name: &str) -> StorageResult<Option<WorkflowTemplate>> {
        let guard = self.templates.read().map_err(|_| poisoned("templates"))?;
        Ok(guard.values().find(|t| t.active && t.name == name).cloned())
    }

    async fn get_template_by_type(
        &self,
        workflow_type: &str,
    ) -> StorageResult<Option<WorkflowTemplate>> {
        let guard = self.templates.read().map_err(|_| poisoned("templates"))?;
        Ok(guard
            .values()
            .find(|t| t.active && t.workflow_type.as_deref() == Some(workflow_type))
            .cloned())
    }

    async fn list_templates(&self) -> StorageResult<Vec<WorkflowTemplate>> {
        let guard = self.templates.read().map_err(|_| poisoned("templates"))?;
        let mut values = guard.values().cloned().collect::<Vec<_>>();
        values.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(values)
    }

    async fn deactivate_template(&self, id: &TemplateId) -> StorageResult<()> {
        let mut guard = self.templates.write().map_err(|_| poisoned("templates"))?;
        let template = guard
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("template {id} not found")))?;
        template.active = false;
        template.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_template(&self, id: &TemplateId) -> StorageResult<()> {
        let mut guard = self.templates.write().map_err(|_| poisoned("templates"))?;
        guard
            .remove(id)
            .ok_or_else(|| StorageError::NotFound(format!("template {id} not found")))?;
        Ok(())
    }
}

#[async_trait]
impl InstanceStore for InMemoryStore {
    async fn get_instance(&self, id: &InstanceId) -> StorageResult<Option<WorkflowInstance>> {
        let guard = self.instances.read().map_err(|_| poisoned("instances"))?;
        Ok(guard.get(id).cloned())
    }

    async fn get_instance_by_business_task(
        &self,
        task_id: &str,
    ) -> StorageResult<Option<WorkflowInstance>> {
        let guard = self.instances.read().map_err(|_| poisoned("instances"))?;
        Ok(guard
            .values()
            .find(|i| i.details.task_id == task_id)
            .cloned())
    }

    async fn commit_transition(
        &self,
        commit: TransitionCommit,
    ) -> StorageResult<WorkflowInstance> {
        // Fixed lock order: instances, tasks, history.
        let mut instances = self.instances.write().map_err(|_| poisoned("instances"))?;
        let mut tasks = self.tasks.write().map_err(|_| poisoned("tasks"))?;
        let mut history = self.history.write().map_err(|_| poisoned("history"))?;

        let now = Utc::now();

        // Validate every guard before the first mutation.
        let instance_id = match &commit.instance {
            InstanceWrite::Create(instance) => {
                if instances.contains_key(&instance.id) {
                    return Err(StorageError::Conflict(format!(
                        "instance {} already exists",
                        instance.id
                    )));
                }
                instance.id.clone()
            }
            InstanceWrite::Advance {
                instance_id,
                expected_version,
                ..
            } => {
                let current = instances.get(instance_id).ok_or_else(|| {
                    StorageError::NotFound(format!("instance {instance_id} not found"))
                })?;
                if current.version != *expected_version {
                    return Err(StorageError::Conflict(format!(
                        "instance {instance_id} version is {}, expected {expected_version}",
                        current.version
                    )));
                }
                instance_id.clone()
            }
        };

        if let Some(ref close) = commit.close_task {
            let task_id = match close {
                TaskClose::Complete(id) | TaskClose::Skip(id) => id,
            };
            let task = tasks
                .get(task_id)
                .ok_or_else(|| StorageError::NotFound(format!("task {task_id} not found")))?;
            if !task.is_open() {
                return Err(StorageError::InvariantViolation(format!(
                    "task {task_id} is already closed"
                )));
            }
        }

        if let Some(ref new_task) = commit.create_task {
            let closing = commit.close_task.as_ref().map(|c| match c {
                TaskClose::Complete(id) | TaskClose::Skip(id) => id.clone(),
            });
            let open_remains = tasks.values().any(|t| {
                t.instance_id == instance_id && t.is_open() && Some(&t.id) != closing.as_ref()
            });
            if open_remains {
                return Err(StorageError::InvariantViolation(format!(
                    "instance {} already has a live task",
                    new_task.instance_id
                )));
            }
        }

        if commit.history.instance_id != instance_id {
            return Err(StorageError::InvalidInput(
                "history entry references a different instance".to_string(),
            ));
        }

        // All guards passed; apply the whole commit.
        let written = match commit.instance {
            InstanceWrite::Create(mut instance) => {
                instance.updated_at = now;
                if instance.is_terminal() && instance.completed_at.is_none() {
                    instance.completed_at = Some(now);
                }
                instances.insert(instance.id.clone(), instance.clone());
                instance
            }
            InstanceWrite::Advance {
                instance_id,
                new_step,
                new_status,
                closes,
                ..
            } => {
                let instance = instances.get_mut(&instance_id).ok_or_else(|| {
                    StorageError::NotFound(format!("instance {instance_id} not found"))
                })?;
                instance.current_step_id = new_step;
                instance.status = new_status;
                instance.version += 1;
                instance.updated_at = now;
                if closes {
                    instance.completed_at = Some(now);
                }
                instance.clone()
            }
        };

        if let Some(close) = commit.close_task {
            let (task_id, status) = match close {
                TaskClose::Complete(id) => (id, TaskStatus::Completed),
                TaskClose::Skip(id) => (id, TaskStatus::Skipped),
            };
            let task = tasks
                .get_mut(&task_id)
                .ok_or_else(|| StorageError::NotFound(format!("task {task_id} not found")))?;
            task.status = status;
            task.completed_at = Some(now);
        }

        if let Some(task) = commit.create_task {
            tasks.insert(task.id.clone(), task);
        }

        let sequence = history
            .iter()
            .filter(|h| h.instance_id == instance_id)
            .map(|h| h.sequence + 1)
            .max()
            .unwrap_or(0);
        let HistoryAppend {
            instance_id: history_instance,
            from_step,
            to_step,
            action,
            performed_by,
            comment,
        } = commit.history;
        history.push(WorkflowHistory {
            id: HistoryId::generate(),
            instance_id: history_instance,
            sequence,
            from_step,
            to_step,
            action,
            performed_by,
            comment,
            recorded_at: now,
        });

        Ok(written)
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn get_task(&self, id: &TaskId) -> StorageResult<Option<AssignedTask>> {
        let guard = self.tasks.read().map_err(|_| poisoned("tasks"))?;
        Ok(guard.get(id).cloned())
    }

    async fn open_task_for_instance(
        &self,
        instance_id: &InstanceId,
    ) -> StorageResult<Option<AssignedTask>> {
        let guard = self.tasks.read().map_err(|_| poisoned("tasks"))?;
        Ok(guard
            .values()
            .find(|t| &t.instance_id == instance_id && t.is_open())
            .cloned())
    }

    async fn tasks_for_user(
        &self,
        user: &UserId,
        status: Option<TaskStatus>,
    ) -> StorageResult<Vec<AssignedTask>> {
        let guard = self.tasks.read().map_err(|_| poisoned("tasks"))?;
        let mut values = guard
            .values()
            .filter(|t| &t.assignee == user && status.map_or(true, |s| t.status == s))
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(values)
    }

    async fn count_open_tasks_for_user(&self, user: &UserId) -> StorageResult<usize> {
        let guard = self.tasks.read().map_err(|_| poisoned("tasks"))?;
        Ok(guard
            .values()
            .filter(|t| &t.assignee == user && t.is_open())
            .count())
    }
}

#[async_trait]
impl HistoryStore for InMemoryStore {
    async fn history_for_instance(
        &self,
        instance_id: &InstanceId,
    ) -> StorageResult<Vec<WorkflowHistory>> {
        let guard = self.history.read().map_err(|_| poisoned("history"))?;
        let mut values = guard
            .iter()
            .filter(|h| &h.instance_id == instance_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by_key(|h| h.sequence);
        Ok(values)
    }

    async fn history_by_performer(&self, user: &UserId) -> StorageResult<Vec<WorkflowHistory>> {
        let guard = self.history.read().map_err(|_| poisoned("history"))?;
        let mut values = guard
            .iter()
            .filter(|h| &h.performed_by == user)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(values)
    }

    async fn history_by_action(&self, action: &str) -> StorageResult<Vec<WorkflowHistory>> {
        let guard = self.history.read().map_err(|_| poisoned("history"))?;
        let mut values = guard
            .iter()
            .filter(|h| h.action == action)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(values)
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn get_user(&self, id: &UserId) -> StorageResult<Option<UserRecord>> {
        let guard = self.users.read().map_err(|_| poisoned("users"))?;
        Ok(guard.get(id).cloned())
    }

    async fn users_with_roles(&self, roles: &[RoleId]) -> StorageResult<Vec<UserRecord>> {
        let guard = self.users.read().map_err(|_| poisoned("users"))?;
        let mut values = guard
            .values()
            .filter(|u| u.holds_any_role(roles))
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(values)
    }

    async fn upsert_user(&self, user: UserRecord) -> StorageResult<()> {
        let mut guard = self.users.write().map_err(|_| poisoned("users"))?;
        guard.insert(user.user_id.clone(), user);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caseflow_types::{
        InstanceStatus, SenderInfo, StepId, StepOutcome, TaskDetails, WorkflowStep,
        WorkflowTransition,
    };

    fn make_template() -> WorkflowTemplate {
        let mut template = WorkflowTemplate::new("LeaveApproval", UserId::new("admin"))
            .with_workflow_type("leave_request");
        template
            .add_step(WorkflowStep::initial("draft", "Draft"))
            .unwrap();
        template
            .add_step(WorkflowStep::new("pending_manager", "Pending Manager").with_role("manager"))
            .unwrap();
        template
            .add_step(WorkflowStep::terminal(
                "approved",
                "Approved",
                StepOutcome::Completed,
            ))
            .unwrap();
        template
            .add_transition(WorkflowTransition::new("draft", "pending_manager", "submit"))
            .unwrap();
        template
            .add_transition(WorkflowTransition::new(
                "pending_manager",
                "approved",
                "approve",
            ))
            .unwrap();
        template
    }

    fn make_instance(template: &WorkflowTemplate) -> WorkflowInstance {
        let mut instance = WorkflowInstance::new(
            template.id.clone(),
            StepId::new("pending_manager"),
            TaskDetails::new("task-1", "leave_request", SenderInfo::new("u-1", "Ann")),
            UserId::new("u-1"),
        );
        instance.status = InstanceStatus::InProgress;
        instance
    }

    fn create_commit(instance: WorkflowInstance, task: AssignedTask) -> TransitionCommit {
        TransitionCommit {
            history: HistoryAppend {
                instance_id: instance.id.clone(),
                from_step: Some(StepId::new("draft")),
                to_step: StepId::new("pending_manager"),
                action: "submit".into(),
                performed_by: UserId::new("u-1"),
                comment: String::new(),
            },
            instance: InstanceWrite::Create(instance),
            close_task: None,
            create_task: Some(task),
        }
    }

    #[tokio::test]
    async fn test_template_type_uniqueness() {
        let store = InMemoryStore::new();
        store.create_template(make_template()).await.unwrap();

        let result = store.create_template(make_template()).await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));

        // A second template with no workflow_type is fine.
        let mut untyped = make_template();
        untyped.id = TemplateId::generate();
        untyped.workflow_type = None;
        store.create_template(untyped).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_template_rejected() {
        let store = InMemoryStore::new();
        let template = WorkflowTemplate::new("Empty", UserId::new("admin"));
        let result = store.create_template(template).await;
        assert!(matches!(result, Err(StorageError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_deactivated_template_invisible_to_lookups() {
        let store = InMemoryStore::new();
        let template = make_template();
        let id = template.id.clone();
        store.create_template(template).await.unwrap();

        store.deactivate_template(&id).await.unwrap();

        assert!(store
            .get_template_by_type("leave_request")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .get_template_by_name("LeaveApproval")
            .await
            .unwrap()
            .is_none());
        // By-id lookup still resolves for in-flight instances.
        assert!(store.get_template(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_commit_create_and_advance() {
        let store = InMemoryStore::new();
        let template = make_template();
        let instance = make_instance(&template);
        let instance_id = instance.id.clone();
        let task = AssignedTask::new(
            instance_id.clone(),
            StepId::new("pending_manager"),
            UserId::new("mgr-1"),
        );
        let task_id = task.id.clone();

        store
            .commit_transition(create_commit(instance, task))
            .await
            .unwrap();

        let written = store.get_instance(&instance_id).await.unwrap().unwrap();
        assert_eq!(written.version, 1);

        let advanced = store
            .commit_transition(TransitionCommit {
                instance: InstanceWrite::Advance {
                    instance_id: instance_id.clone(),
                    expected_version: 1,
                    new_step: StepId::new("approved"),
                    new_status: InstanceStatus::Completed,
                    closes: true,
                },
                close_task: Some(TaskClose::Complete(task_id)),
                create_task: None,
                history: HistoryAppend {
                    instance_id: instance_id.clone(),
                    from_step: Some(StepId::new("pending_manager")),
                    to_step: StepId::new("approved"),
                    action: "approve".into(),
                    performed_by: UserId::new("mgr-1"),
                    comment: "ok".into(),
                },
            })
            .await
            .unwrap();

        assert_eq!(advanced.version, 2);
        assert_eq!(advanced.status, InstanceStatus::Completed);
        assert!(advanced.completed_at.is_some());
        assert!(store
            .open_task_for_instance(&instance_id)
            .await
            .unwrap()
            .is_none());

        let history = store.history_for_instance(&instance_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].sequence, 0);
        assert_eq!(history[1].sequence, 1);
        assert_eq!(history[0].to_step, history[1].from_step.clone().unwrap());
    }

    #[tokio::test]
    async fn test_stale_version_fails_whole_commit() {
        let store = InMemoryStore::new();
        let template = make_template();
        let instance = make_instance(&template);
        let instance_id = instance.id.clone();
        let task = AssignedTask::new(
            instance_id.clone(),
            StepId::new("pending_manager"),
            UserId::new("mgr-1"),
        );
        let task_id = task.id.clone();
        store
            .commit_transition(create_commit(instance, task))
            .await
            .unwrap();

        let result = store
            .commit_transition(TransitionCommit {
                instance: InstanceWrite::Advance {
                    instance_id: instance_id.clone(),
                    expected_version: 7,
                    new_step: StepId::new("approved"),
                    new_status: InstanceStatus::Completed,
                    closes: true,
                },
                close_task: Some(TaskClose::Complete(task_id.clone())),
                create_task: None,
                history: HistoryAppend {
                    instance_id: instance_id.clone(),
                    from_step: Some(StepId::new("pending_manager")),
                    to_step: StepId::new("approved"),
                    action: "approve".into(),
                    performed_by: UserId::new("mgr-1"),
                    comment: String::new(),
                },
            })
            .await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));

        // Nothing moved: instance still on its step, task still open,
        // no history appended.
        let instance = store.get_instance(&instance_id).await.unwrap().unwrap();
        assert_eq!(instance.version, 1);
        assert_eq!(instance.status, InstanceStatus::InProgress);
        assert!(store.get_task(&task_id).await.unwrap().unwrap().is_open());
        assert_eq!(
            store.history_for_instance(&instance_id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_second_live_task_rejected() {
        let store = InMemoryStore::new();
        let template = make_template();
        let instance = make_instance(&template);
        let instance_id = instance.id.clone();
        let task = AssignedTask::new(
            instance_id.clone(),
            StepId::new("pending_manager"),
            UserId::new("mgr-1"),
        );
        store
            .commit_transition(create_commit(instance, task))
            .await
            .unwrap();

        // A commit that creates a task without closing the live one
        // violates the single-live-task invariant.
        let result = store
            .commit_transition(TransitionCommit {
                instance: InstanceWrite::Advance {
                    instance_id: instance_id.clone(),
                    expected_version: 1,
                    new_step: StepId::new("pending_manager"),
                    new_status: InstanceStatus::InProgress,
                    closes: false,
                },
                close_task: None,
                create_task: Some(AssignedTask::new(
                    instance_id.clone(),
                    StepId::new("pending_manager"),
                    UserId::new("mgr-2"),
                )),
                history: HistoryAppend {
                    instance_id: instance_id.clone(),
                    from_step: Some(StepId::new("pending_manager")),
                    to_step: StepId::new("pending_manager"),
                    action: "approve".into(),
                    performed_by: UserId::new("mgr-2"),
                    comment: String::new(),
                },
            })
            .await;
        assert!(matches!(result, Err(StorageError::InvariantViolation(_))));
    }

    #[tokio::test]
    async fn test_business_task_lookup() {
        let store = InMemoryStore::new();
        let template = make_template();
        let instance = make_instance(&template);
        let instance_id = instance.id.clone();
        let task = AssignedTask::new(
            instance_id.clone(),
            StepId::new("pending_manager"),
            UserId::new("mgr-1"),
        );
        store
            .commit_transition(create_commit(instance, task))
            .await
            .unwrap();

        let found = store
            .get_instance_by_business_task("task-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, instance_id);
        assert!(store
            .get_instance_by_business_task("unknown")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_directory_role_query() {
        let store = InMemoryStore::new();
        store
            .upsert_user(UserRecord::new("mgr-1", "Meg").with_role("manager"))
            .await
            .unwrap();
        store
            .upsert_user(UserRecord::new("emp-1", "Eve").with_role("employee"))
            .await
            .unwrap();

        let managers = store
            .users_with_roles(&[RoleId::new("manager")])
            .await
            .unwrap();
        assert_eq!(managers.len(), 1);
        assert_eq!(managers[0].user_id, UserId::new("mgr-1"));
    }
}
