//! Read paths for collaborators: my tasks, business-task correlation,
//! instance history.

use caseflow_store::{HistoryStore, InstanceStore, TaskStore};
use caseflow_types::{
    AssignedTask, EngineError, EngineResult, InstanceId, TaskStatus, UserId, WorkflowHistory,
    WorkflowInstance,
};
use std::sync::Arc;

/// Query/lookup facade over the stores
pub struct WorkflowQueries {
    instances: Arc<dyn InstanceStore>,
    tasks: Arc<dyn TaskStore>,
    history: Arc<dyn HistoryStore>,
}

impl WorkflowQueries {
    pub fn new(
        instances: Arc<dyn InstanceStore>,
        tasks: Arc<dyn TaskStore>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            instances,
            tasks,
            history,
        }
    }

    /// Tasks assigned to a user, optionally filtered by status
    pub async fn my_tasks(
        &self,
        user: &UserId,
        status: Option<TaskStatus>,
    ) -> EngineResult<Vec<AssignedTask>> {
        Ok(self.tasks.tasks_for_user(user, status).await?)
    }

    /// Get an instance by id
    pub async fn instance(&self, instance_id: &InstanceId) -> EngineResult<WorkflowInstance> {
        self.instances
            .get_instance(instance_id)
            .await?
            .ok_or_else(|| EngineError::InstanceNotFound(instance_id.clone()))
    }

    /// Find the instance correlated with a business task id
    pub async fn instance_by_business_task(
        &self,
        task_id: &str,
    ) -> EngineResult<WorkflowInstance> {
        self.instances
            .get_instance_by_business_task(task_id)
            .await?
            .ok_or_else(|| EngineError::InstanceNotFound(InstanceId::new(task_id)))
    }

    /// Chronological history of an instance
    pub async fn instance_history(
        &self,
        instance_id: &InstanceId,
    ) -> EngineResult<Vec<WorkflowHistory>> {
        // Distinguish "no such instance" from "no history yet".
        if self.instances.get_instance(instance_id).await?.is_none() {
            return Err(EngineError::InstanceNotFound(instance_id.clone()));
        }
        Ok(self.history.history_for_instance(instance_id).await?)
    }
}
