//! Workflow lifecycle handlers

use crate::error::ApiResult;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use caseflow_engine::ActionOutcome;
use caseflow_types::{
    InstanceId, Priority, TaskDetails, UserId, WorkflowHistory, WorkflowInstance,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Initiation request
#[derive(Debug, Deserialize)]
pub struct InitiateRequest {
    /// Template key: a workflow type first, a template name second
    pub template_key: String,
    /// Opaque business payload
    pub details: TaskDetails,
    pub initiator: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

/// Initiate a workflow instance
pub async fn initiate_workflow(
    State(state): State<AppState>,
    Json(request): Json<InitiateRequest>,
) -> ApiResult<Json<WorkflowInstance>> {
    let instance = state
        .lifecycle
        .initiate_workflow(
            &request.template_key,
            request.details,
            UserId::new(request.initiator),
            request.priority,
            request.due_date,
        )
        .await?;
    Ok(Json(instance))
}

/// Action request
#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    pub performer: String,
    #[serde(default)]
    pub comment: String,
}

/// Action response
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    /// "advanced", "completed", or "quorum_pending"
    pub outcome: &'static str,
    pub instance: WorkflowInstance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approvals_recorded: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approvals_required: Option<u32>,
}

/// Process an action against an instance
pub async fn process_action(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ActionRequest>,
) -> ApiResult<Json<ActionResponse>> {
    let outcome = state
        .lifecycle
        .process_action(
            &InstanceId::new(id),
            &request.action,
            &UserId::new(request.performer),
            &request.comment,
        )
        .await?;

    let response = match outcome {
        ActionOutcome::Advanced(instance) => ActionResponse {
            outcome: "advanced",
            instance,
            approvals_recorded: None,
            approvals_required: None,
        },
        ActionOutcome::Completed(instance) => ActionResponse {
            outcome: "completed",
            instance,
            approvals_recorded: None,
            approvals_required: None,
        },
        ActionOutcome::QuorumPending {
            instance,
            approvals_recorded,
            approvals_required,
        } => ActionResponse {
            outcome: "quorum_pending",
            instance,
            approvals_recorded: Some(approvals_recorded),
            approvals_required: Some(approvals_required),
        },
    };
    Ok(Json(response))
}

/// Cancellation request
#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub performer: String,
    #[serde(default)]
    pub reason: String,
}

/// Cancel an open instance
pub async fn cancel_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CancelRequest>,
) -> ApiResult<Json<WorkflowInstance>> {
    let instance = state
        .lifecycle
        .cancel_instance(
            &InstanceId::new(id),
            &UserId::new(request.performer),
            &request.reason,
        )
        .await?;
    Ok(Json(instance))
}

/// Get an instance by id
pub async fn get_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<WorkflowInstance>> {
    let instance = state.queries.instance(&InstanceId::new(id)).await?;
    Ok(Json(instance))
}

/// Get the instance correlated with a business task id
pub async fn get_instance_by_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<WorkflowInstance>> {
    let instance = state.queries.instance_by_business_task(&task_id).await?;
    Ok(Json(instance))
}

/// Get the chronological history of an instance
pub async fn get_instance_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<WorkflowHistory>>> {
    let history = state.queries.instance_history(&InstanceId::new(id)).await?;
    Ok(Json(history))
}
