//! Template administration handlers

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use caseflow_types::{
    ApprovalPolicy, StepOutcome, TemplateId, TransitionCondition, UserId, WorkflowStep,
    WorkflowTemplate, WorkflowTransition,
};
use serde::{Deserialize, Serialize};

/// Step in a template creation request
#[derive(Debug, Deserialize)]
pub struct StepSpec {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub order_index: u32,
    #[serde(default)]
    pub initial: bool,
    #[serde(default, rename = "final")]
    pub is_final: bool,
    #[serde(default)]
    pub allowed_roles: Vec<String>,
    #[serde(default)]
    pub approval: Option<ApprovalPolicy>,
    #[serde(default)]
    pub outcome: Option<StepOutcome>,
}

/// Transition in a template creation request
#[derive(Debug, Deserialize)]
pub struct TransitionSpec {
    pub from: String,
    pub to: String,
    pub action: String,
    #[serde(default)]
    pub condition: Option<TransitionCondition>,
}

/// Template creation request
#[derive(Debug, Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub workflow_type: Option<String>,
    pub created_by: String,
    pub steps: Vec<StepSpec>,
    pub transitions: Vec<TransitionSpec>,
}

/// Template creation response
#[derive(Debug, Serialize)]
pub struct CreateTemplateResponse {
    pub id: String,
}

/// Create (publish) a template
pub async fn create_template(
    State(state): State<AppState>,
    Json(request): Json<CreateTemplateRequest>,
) -> ApiResult<Json<CreateTemplateResponse>> {
    let mut template = WorkflowTemplate::new(request.name, UserId::new(request.created_by))
        .with_description(request.description);
    if let Some(workflow_type) = request.workflow_type {
        template = template.with_workflow_type(workflow_type);
    }

    for spec in request.steps {
        let mut step = WorkflowStep::new(spec.id, spec.name).with_order(spec.order_index);
        step.initial = spec.initial;
        step.is_final = spec.is_final;
        for role in spec.allowed_roles {
            step = step.with_role(role);
        }
        if let Some(approval) = spec.approval {
            step = step.with_approval(approval);
        }
        if let Some(outcome) = spec.outcome {
            step.outcome = outcome;
        }
        template
            .add_step(step)
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    }
    for spec in request.transitions {
        let mut transition = WorkflowTransition::new(spec.from, spec.to, spec.action);
        if let Some(condition) = spec.condition {
            transition = transition.with_condition(condition);
        }
        template
            .add_transition(transition)
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    }

    let id = template.id.clone();
    state.templates.create_template(template).await?;

    tracing::info!(template_id = %id, "template published");
    Ok(Json(CreateTemplateResponse { id: id.0 }))
}

/// List all templates
pub async fn list_templates(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<WorkflowTemplate>>> {
    Ok(Json(state.templates.list_templates().await?))
}

/// Get a template by id
pub async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<WorkflowTemplate>> {
    let template = state
        .templates
        .get_template(&TemplateId::new(&id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("template {id} not found")))?;
    Ok(Json(template))
}

/// Deactivate response
#[derive(Debug, Serialize)]
pub struct DeactivateResponse {
    pub deactivated: bool,
}

/// Soft-deactivate a template
pub async fn deactivate_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeactivateResponse>> {
    state
        .templates
        .deactivate_template(&TemplateId::new(&id))
        .await?;
    tracing::info!(template_id = %id, "template deactivated");
    Ok(Json(DeactivateResponse { deactivated: true }))
}

/// Delete response
#[derive(Debug, Serialize)]
pub struct DeleteTemplateResponse {
    pub deleted: bool,
}

/// Delete a template
pub async fn delete_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteTemplateResponse>> {
    state
        .templates
        .delete_template(&TemplateId::new(&id))
        .await?;
    tracing::info!(template_id = %id, "template deleted");
    Ok(Json(DeleteTemplateResponse { deleted: true }))
}
