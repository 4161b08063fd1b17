//! Task query handlers

use crate::error::ApiResult;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use caseflow_types::{AssignedTask, TaskStatus, UserId};
use serde::Deserialize;

/// Query params for task listing
#[derive(Debug, Deserialize)]
pub struct TasksQuery {
    pub user_id: String,
    #[serde(default)]
    pub status: Option<TaskStatus>,
}

/// List a user's tasks, optionally filtered by status
pub async fn list_my_tasks(
    State(state): State<AppState>,
    Query(query): Query<TasksQuery>,
) -> ApiResult<Json<Vec<AssignedTask>>> {
    let tasks = state
        .queries
        .my_tasks(&UserId::new(query.user_id), query.status)
        .await?;
    Ok(Json(tasks))
}
