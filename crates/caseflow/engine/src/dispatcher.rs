//! Task dispatch: who must act next.
//!
//! Given a target step, the dispatcher selects exactly one assignee among
//! active directory users holding any of the step's allowed roles. The
//! policy is deliberately deterministic so dispatch is testable: fewest
//! open tasks wins, ties broken by earliest account creation, then by
//! user id. A step with an empty role set is context-routed back to the
//! business sender.

use caseflow_store::{TaskStore, UserDirectory};
use caseflow_types::{EngineError, EngineResult, TaskDetails, UserId, UserRecord, WorkflowStep};
use std::sync::Arc;

/// Selects assignees for workflow steps
pub struct TaskDispatcher {
    directory: Arc<dyn UserDirectory>,
    tasks: Arc<dyn TaskStore>,
}

impl TaskDispatcher {
    pub fn new(directory: Arc<dyn UserDirectory>, tasks: Arc<dyn TaskStore>) -> Self {
        Self { directory, tasks }
    }

    /// Select exactly one assignee for a step.
    ///
    /// `excluded` holds users who must not be picked: quorum voters who
    /// already acted on this step for this instance.
    pub async fn select_assignee(
        &self,
        step: &WorkflowStep,
        details: &TaskDetails,
        excluded: &[UserId],
    ) -> EngineResult<UserId> {
        if step.allowed_roles.is_empty() {
            // Context-routed step: the business sender acts.
            return Ok(details.sender.user_id.clone());
        }

        let pool = self.eligible_users(step).await?;
        let mut scored = Vec::new();
        for user in pool {
            if excluded.contains(&user.user_id) {
                continue;
            }
            let load = self.tasks.count_open_tasks_for_user(&user.user_id).await?;
            scored.push((load, user));
        }

        if scored.is_empty() {
            return Err(EngineError::NoAssigneeAvailable(step.id.clone()));
        }

        scored.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.created_at.cmp(&b.1.created_at))
                .then_with(|| a.1.user_id.cmp(&b.1.user_id))
        });
        let (_, chosen) = scored.swap_remove(0);
        Ok(chosen.user_id)
    }

    /// Active users holding any of the step's allowed roles.
    pub async fn eligible_users(&self, step: &WorkflowStep) -> EngineResult<Vec<UserRecord>> {
        let users = self.directory.users_with_roles(&step.allowed_roles).await?;
        Ok(users.into_iter().filter(|u| u.active).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caseflow_store::memory::InMemoryStore;
    use caseflow_types::{SenderInfo, WorkflowStep};
    use chrono::{Duration, Utc};

    fn make_details() -> TaskDetails {
        TaskDetails::new("task-1", "leave_request", SenderInfo::new("u-sender", "Sam"))
    }

    async fn make_dispatcher() -> (Arc<InMemoryStore>, TaskDispatcher) {
        let store = Arc::new(InMemoryStore::new());
        let dispatcher = TaskDispatcher::new(store.clone(), store.clone());
        (store, dispatcher)
    }

    #[tokio::test]
    async fn test_tie_broken_by_account_age() {
        let (store, dispatcher) = make_dispatcher().await;
        let old = Utc::now() - Duration::days(30);
        store
            .upsert_user(
                UserRecord::new("mgr-young", "Newer")
                    .with_role("manager")
                    .with_created_at(Utc::now()),
            )
            .await
            .unwrap();
        store
            .upsert_user(
                UserRecord::new("mgr-old", "Older")
                    .with_role("manager")
                    .with_created_at(old),
            )
            .await
            .unwrap();

        let step = WorkflowStep::new("pending_manager", "Pending Manager").with_role("manager");
        let chosen = dispatcher
            .select_assignee(&step, &make_details(), &[])
            .await
            .unwrap();
        assert_eq!(chosen, UserId::new("mgr-old"));
    }

    #[tokio::test]
    async fn test_inactive_and_excluded_users_skipped() {
        let (store, dispatcher) = make_dispatcher().await;
        store
            .upsert_user(UserRecord::new("mgr-1", "Meg").with_role("manager").inactive())
            .await
            .unwrap();
        store
            .upsert_user(UserRecord::new("mgr-2", "Mel").with_role("manager"))
            .await
            .unwrap();
        store
            .upsert_user(UserRecord::new("mgr-3", "Max").with_role("manager"))
            .await
            .unwrap();

        let step = WorkflowStep::new("pending_manager", "Pending Manager").with_role("manager");
        let chosen = dispatcher
            .select_assignee(&step, &make_details(), &[UserId::new("mgr-2")])
            .await
            .unwrap();
        assert_eq!(chosen, UserId::new("mgr-3"));
    }

    #[tokio::test]
    async fn test_empty_pool_fails() {
        let (store, dispatcher) = make_dispatcher().await;
        store
            .upsert_user(UserRecord::new("emp-1", "Eve").with_role("employee"))
            .await
            .unwrap();

        let step = WorkflowStep::new("pending_manager", "Pending Manager").with_role("manager");
        let result = dispatcher.select_assignee(&step, &make_details(), &[]).await;
        assert!(matches!(result, Err(EngineError::NoAssigneeAvailable(_))));
    }

    #[tokio::test]
    async fn test_empty_role_set_routes_to_sender() {
        let (_, dispatcher) = make_dispatcher().await;
        let step = WorkflowStep::new("confirm_receipt", "Confirm Receipt");
        let chosen = dispatcher
            .select_assignee(&step, &make_details(), &[])
            .await
            .unwrap();
        assert_eq!(chosen, UserId::new("u-sender"));
    }

    #[tokio::test]
    async fn test_eligible_users_filters_inactive() {
        let (store, dispatcher) = make_dispatcher().await;
        store
            .upsert_user(UserRecord::new("mgr-1", "Meg").with_role("manager"))
            .await
            .unwrap();
        store
            .upsert_user(UserRecord::new("mgr-2", "Mel").with_role("manager").inactive())
            .await
            .unwrap();

        let step = WorkflowStep::new("pending_manager", "Pending Manager").with_role("manager");
        let eligible = dispatcher.eligible_users(&step).await.unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].user_id, UserId::new("mgr-1"));
    }
}
