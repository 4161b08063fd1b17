//! End-to-end engine behavior against the in-memory store: the
//! leave-approval scenario, terminal-state rules, audit-chain
//! reconstruction, quorum, and the concurrent-approval race.

use caseflow_engine::{ActionOutcome, AuditTrail, LifecycleManager, WorkflowQueries};
use caseflow_store::memory::InMemoryStore;
use caseflow_store::{TaskStore, TemplateStore, UserDirectory};
use caseflow_types::{
    ApprovalPolicy, EngineError, InstanceStatus, Priority, SenderInfo, StepId, StepOutcome,
    TaskDetails, TaskStatus, UserId, UserRecord, WorkflowStep, WorkflowTemplate,
    WorkflowTransition,
};
use chrono::{Duration, Utc};
use std::sync::Arc;

fn leave_template(approval: ApprovalPolicy) -> WorkflowTemplate {
    let mut template = WorkflowTemplate::new("LeaveApproval", UserId::new("admin"))
        .with_workflow_type("leave_request");
    template
        .add_step(WorkflowStep::initial("draft", "Draft"))
        .unwrap();
    template
        .add_step(
            WorkflowStep::new("pending_manager", "Pending Manager")
                .with_order(1)
                .with_role("manager")
                .with_approval(approval),
        )
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

fn details() -> TaskDetails {
    TaskDetails::new(
        "leave-42",
        "leave_request",
        SenderInfo::new("emp-1", "Erin")
            .with_position("Engineer")
            .with_department("R&D"),
    )
    .with_description("Annual leave, 5 days")
}

async fn setup(approval: ApprovalPolicy, managers: usize) -> (Arc<InMemoryStore>, LifecycleManager) {
    let store = Arc::new(InMemoryStore::new());
    store.create_template(leave_template(approval)).await.unwrap();
    store
        .upsert_user(UserRecord::new("emp-1", "Erin").with_role("employee"))
        .await
        .unwrap();
    for i in 1..=managers {
        store
            .upsert_user(
                UserRecord::new(format!("mgr-{i}"), format!("Manager {i}"))
                    .with_role("manager")
                    .with_created_at(Utc::now() - Duration::days(managers as i64 - i as i64)),
            )
            .await
            .unwrap();
    }
    let lifecycle = LifecycleManager::from_store(store.clone());
    (store, lifecycle)
}

async fn initiate(lifecycle: &LifecycleManager) -> caseflow_types::WorkflowInstance {
    lifecycle
        .initiate_workflow(
            "leave_request",
            details(),
            UserId::new("emp-1"),
            Priority::Normal,
            None,
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn initiate_lands_on_pending_manager_with_one_task() {
    let (store, lifecycle) = setup(ApprovalPolicy::any_one(), 1).await;
    let instance = initiate(&lifecycle).await;

    assert_eq!(instance.current_step_id, StepId::new("pending_manager"));
    assert_eq!(instance.status, InstanceStatus::InProgress);

    let task = store
        .open_task_for_instance(&instance.id)
        .await
        .unwrap()
        .expect("exactly one live task");
    assert_eq!(task.assignee, UserId::new("mgr-1"));
    assert_eq!(task.status, TaskStatus::Pending);

    let audit = AuditTrail::new(store);
    let history = audit.for_instance(&instance.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, "submit");
    assert_eq!(history[0].from_step, Some(StepId::new("draft")));
    assert_eq!(history[0].to_step, StepId::new("pending_manager"));
}

#[tokio::test]
async fn approve_completes_with_two_entry_history() {
    let (store, lifecycle) = setup(ApprovalPolicy::any_one(), 1).await;
    let instance = initiate(&lifecycle).await;

    let outcome = lifecycle
        .process_action(&instance.id, "approve", &UserId::new("mgr-1"), "ok")
        .await
        .unwrap();
    let closed = match outcome {
        ActionOutcome::Completed(instance) => instance,
        other => panic!("expected completion, got {other:?}"),
    };
    assert_eq!(closed.current_step_id, StepId::new("approved"));
    assert_eq!(closed.status, InstanceStatus::Completed);
    assert!(closed.completed_at.is_some());

    // Zero pending tasks remain.
    assert!(store
        .open_task_for_instance(&closed.id)
        .await
        .unwrap()
        .is_none());

    let audit = AuditTrail::new(store.clone());
    let history = audit.for_instance(&closed.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].action, "submit");
    assert_eq!(history[1].action, "approve");
    assert_eq!(history[1].comment, "ok");
    assert_eq!(history[0].to_step, history[1].from_step.clone().unwrap());

    let path = audit.path_for_instance(&closed.id).await.unwrap();
    assert_eq!(
        path,
        vec![
            StepId::new("draft"),
            StepId::new("pending_manager"),
            StepId::new("approved"),
        ]
    );
}

#[tokio::test]
async fn second_approve_fails_already_closed() {
    let (_, lifecycle) = setup(ApprovalPolicy::any_one(), 1).await;
    let instance = initiate(&lifecycle).await;
    lifecycle
        .process_action(&instance.id, "approve", &UserId::new("mgr-1"), "ok")
        .await
        .unwrap();

    let result = lifecycle
        .process_action(&instance.id, "approve", &UserId::new("mgr-1"), "again")
        .await;
    assert!(matches!(result, Err(EngineError::AlreadyClosed(_))));
}

#[tokio::test]
async fn undefined_action_fails_invalid_and_changes_nothing() {
    let (store, lifecycle) = setup(ApprovalPolicy::any_one(), 1).await;
    let instance = initiate(&lifecycle).await;

    let result = lifecycle
        .process_action(&instance.id, "reject", &UserId::new("mgr-1"), "")
        .await;
    assert!(matches!(result, Err(EngineError::InvalidAction { .. })));

    let queries = WorkflowQueries::new(store.clone(), store.clone(), store.clone());
    let unchanged = queries.instance(&instance.id).await.unwrap();
    assert_eq!(unchanged.current_step_id, StepId::new("pending_manager"));
    assert_eq!(unchanged.status, InstanceStatus::InProgress);
    assert_eq!(unchanged.version, instance.version);
    assert_eq!(queries.instance_history(&instance.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn wrong_role_fails_permission_denied() {
    let (_, lifecycle) = setup(ApprovalPolicy::any_one(), 1).await;
    let instance = initiate(&lifecycle).await;

    let result = lifecycle
        .process_action(&instance.id, "approve", &UserId::new("emp-1"), "")
        .await;
    assert!(matches!(result, Err(EngineError::PermissionDenied { .. })));

    // Unknown users are refused the same way.
    let result = lifecycle
        .process_action(&instance.id, "approve", &UserId::new("ghost"), "")
        .await;
    assert!(matches!(result, Err(EngineError::PermissionDenied { .. })));
}

#[tokio::test]
async fn initiation_without_assignee_creates_nothing() {
    let (store, lifecycle) = setup(ApprovalPolicy::any_one(), 0).await;

    let result = lifecycle
        .initiate_workflow(
            "leave_request",
            details(),
            UserId::new("emp-1"),
            Priority::Normal,
            None,
        )
        .await;
    assert!(matches!(result, Err(EngineError::NoAssigneeAvailable(_))));

    // The whole operation aborted: no instance was created.
    let queries = WorkflowQueries::new(store.clone(), store.clone(), store.clone());
    let lookup = queries.instance_by_business_task("leave-42").await;
    assert!(matches!(lookup, Err(EngineError::InstanceNotFound(_))));
}

#[tokio::test]
async fn unknown_template_key_fails_not_found() {
    let (_, lifecycle) = setup(ApprovalPolicy::any_one(), 1).await;
    let result = lifecycle
        .initiate_workflow(
            "expense_claim",
            details(),
            UserId::new("emp-1"),
            Priority::Normal,
            None,
        )
        .await;
    assert!(matches!(result, Err(EngineError::TemplateNotFound(_))));
}

#[tokio::test]
async fn concurrent_approvals_advance_exactly_once() {
    let (store, lifecycle) = setup(ApprovalPolicy::any_one(), 2).await;
    let lifecycle = Arc::new(lifecycle);
    let instance = initiate(&lifecycle).await;

    let first = {
        let lifecycle = lifecycle.clone();
        let id = instance.id.clone();
        tokio::spawn(async move {
            lifecycle
                .process_action(&id, "approve", &UserId::new("mgr-1"), "ok")
                .await
        })
    };
    let second = {
        let lifecycle = lifecycle.clone();
        let id = instance.id.clone();
        tokio::spawn(async move {
            lifecycle
                .process_action(&id, "approve", &UserId::new("mgr-2"), "ok")
                .await
        })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one approval must win");
    let loser = results
        .iter()
        .find(|r| r.is_err())
        .unwrap()
        .as_ref()
        .unwrap_err();
    assert!(
        matches!(
            loser,
            EngineError::AlreadyClosed(_) | EngineError::InvalidAction { .. }
        ),
        "loser saw {loser:?}"
    );

    // The instance advanced exactly once: one submit + one approve.
    let audit = AuditTrail::new(store.clone());
    let history = audit.for_instance(&instance.id).await.unwrap();
    assert_eq!(history.len(), 2);
    let queries = WorkflowQueries::new(store.clone(), store.clone(), store.clone());
    let closed = queries.instance(&instance.id).await.unwrap();
    assert_eq!(closed.status, InstanceStatus::Completed);
    assert_eq!(closed.version, 2);
}

#[tokio::test]
async fn quorum_holds_step_until_second_approval() {
    let (store, lifecycle) = setup(ApprovalPolicy::quorum(2), 3).await;
    let instance = initiate(&lifecycle).await;
    let first_task = store
        .open_task_for_instance(&instance.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first_task.assignee, UserId::new("mgr-1"));

    let outcome = lifecycle
        .process_action(&instance.id, "approve", &UserId::new("mgr-1"), "lgtm")
        .await
        .unwrap();
    match outcome {
        ActionOutcome::QuorumPending {
            instance: pending,
            approvals_recorded,
            approvals_required,
        } => {
            assert_eq!(approvals_recorded, 1);
            assert_eq!(approvals_required, 2);
            assert_eq!(pending.current_step_id, StepId::new("pending_manager"));
            assert_eq!(pending.status, InstanceStatus::InProgress);
        }
        other => panic!("expected quorum pending, got {other:?}"),
    }

    // The replacement task went to a manager who has not voted.
    let second_task = store
        .open_task_for_instance(&instance.id)
        .await
        .unwrap()
        .unwrap();
    assert_ne!(second_task.assignee, UserId::new("mgr-1"));

    // The first voter cannot vote twice.
    let result = lifecycle
        .process_action(&instance.id, "approve", &UserId::new("mgr-1"), "again")
        .await;
    assert!(matches!(result, Err(EngineError::PermissionDenied { .. })));

    let outcome = lifecycle
        .process_action(&instance.id, "approve", &second_task.assignee, "ok")
        .await
        .unwrap();
    assert!(matches!(outcome, ActionOutcome::Completed(_)));

    // Quorum votes keep the history chain unbroken.
    let audit = AuditTrail::new(store.clone());
    let path = audit.path_for_instance(&instance.id).await.unwrap();
    assert_eq!(
        path,
        vec![
            StepId::new("draft"),
            StepId::new("pending_manager"),
            StepId::new("approved"),
        ]
    );
    let history = audit.for_instance(&instance.id).await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(history[1].is_quorum_entry());
}

#[tokio::test]
async fn cancellation_is_absorbing() {
    let (store, lifecycle) = setup(ApprovalPolicy::any_one(), 1).await;
    let instance = initiate(&lifecycle).await;

    // Only the creator may cancel.
    let result = lifecycle
        .cancel_instance(&instance.id, &UserId::new("mgr-1"), "nope")
        .await;
    assert!(matches!(result, Err(EngineError::PermissionDenied { .. })));

    let cancelled = lifecycle
        .cancel_instance(&instance.id, &UserId::new("emp-1"), "changed my mind")
        .await
        .unwrap();
    assert_eq!(cancelled.status, InstanceStatus::Cancelled);
    assert!(cancelled.completed_at.is_some());

    // The live task was skipped, not completed.
    let task = store
        .get_task(
            &store
                .tasks_for_user(&UserId::new("mgr-1"), None)
                .await
                .unwrap()[0]
                .id,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.status, TaskStatus::Skipped);

    let result = lifecycle
        .process_action(&instance.id, "approve", &UserId::new("mgr-1"), "")
        .await;
    assert!(matches!(result, Err(EngineError::AlreadyClosed(_))));

    let result = lifecycle
        .cancel_instance(&instance.id, &UserId::new("emp-1"), "twice")
        .await;
    assert!(matches!(result, Err(EngineError::AlreadyClosed(_))));
}

#[tokio::test]
async fn rejection_path_closes_as_rejected() {
    let store = Arc::new(InMemoryStore::new());
    let mut template = leave_template(ApprovalPolicy::any_one());
    template
        .add_step(WorkflowStep::terminal(
            "turned_down",
            "Turned Down",
            StepOutcome::Rejected,
        ))
        .unwrap();
    template
        .add_transition(WorkflowTransition::new(
            "pending_manager",
            "turned_down",
            "reject",
        ))
        .unwrap();
    store.create_template(template).await.unwrap();
    store
        .upsert_user(UserRecord::new("mgr-1", "Meg").with_role("manager"))
        .await
        .unwrap();

    let lifecycle = LifecycleManager::from_store(store.clone());
    let instance = lifecycle
        .initiate_workflow(
            "leave_request",
            details(),
            UserId::new("emp-1"),
            Priority::Normal,
            None,
        )
        .await
        .unwrap();

    let outcome = lifecycle
        .process_action(&instance.id, "reject", &UserId::new("mgr-1"), "short-staffed")
        .await
        .unwrap();
    let closed = match outcome {
        ActionOutcome::Completed(instance) => instance,
        other => panic!("expected terminal outcome, got {other:?}"),
    };
    assert_eq!(closed.status, InstanceStatus::Rejected);
    assert_eq!(closed.current_step_id, StepId::new("turned_down"));
}

#[tokio::test]
async fn zero_step_workflow_closes_at_initiation() {
    let store = Arc::new(InMemoryStore::new());
    let mut template =
        WorkflowTemplate::new("AutoApprove", UserId::new("admin")).with_workflow_type("auto");
    template
        .add_step(WorkflowStep::initial("draft", "Draft"))
        .unwrap();
    template
        .add_step(WorkflowStep::terminal(
            "approved",
            "Approved",
            StepOutcome::Completed,
        ))
        .unwrap();
    template
        .add_transition(WorkflowTransition::new("draft", "approved", "submit"))
        .unwrap();
    store.create_template(template).await.unwrap();

    let lifecycle = LifecycleManager::from_store(store.clone());
    let instance = lifecycle
        .initiate_workflow(
            "auto",
            details(),
            UserId::new("emp-1"),
            Priority::Normal,
            None,
        )
        .await
        .unwrap();

    assert_eq!(instance.status, InstanceStatus::Completed);
    assert!(instance.completed_at.is_some());
    assert!(store
        .open_task_for_instance(&instance.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn my_tasks_filters_by_status() {
    let (store, lifecycle) = setup(ApprovalPolicy::any_one(), 1).await;
    let instance = initiate(&lifecycle).await;

    let queries = WorkflowQueries::new(store.clone(), store.clone(), store.clone());
    let open = queries
        .my_tasks(&UserId::new("mgr-1"), Some(TaskStatus::Pending))
        .await
        .unwrap();
    assert_eq!(open.len(), 1);

    lifecycle
        .process_action(&instance.id, "approve", &UserId::new("mgr-1"), "ok")
        .await
        .unwrap();

    let open = queries
        .my_tasks(&UserId::new("mgr-1"), Some(TaskStatus::Pending))
        .await
        .unwrap();
    assert!(open.is_empty());
    let done = queries
        .my_tasks(&UserId::new("mgr-1"), Some(TaskStatus::Completed))
        .await
        .unwrap();
    assert_eq!(done.len(), 1);
}

#[tokio::test]
async fn business_task_correlation_round_trips() {
    let (store, lifecycle) = setup(ApprovalPolicy::any_one(), 1).await;
    let instance = initiate(&lifecycle).await;

    let queries = WorkflowQueries::new(store.clone(), store.clone(), store.clone());
    let found = queries.instance_by_business_task("leave-42").await.unwrap();
    assert_eq!(found.id, instance.id);
    // The payload is returned verbatim.
    assert_eq!(found.details, details());
}
