//! Directory sync handler.
//!
//! User management lives in the surrounding system; it pushes role and
//! activation changes here so dispatch sees current membership.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::{extract::State, Json};
use caseflow_types::UserRecord;
use serde::Serialize;

/// Upsert response
#[derive(Debug, Serialize)]
pub struct UpsertUserResponse {
    pub synced: bool,
}

/// Insert or replace a directory record
pub async fn upsert_user(
    State(state): State<AppState>,
    Json(user): Json<UserRecord>,
) -> ApiResult<Json<UpsertUserResponse>> {
    tracing::debug!(user_id = %user.user_id, "directory record synced");
    state.directory.upsert_user(user).await?;
    Ok(Json(UpsertUserResponse { synced: true }))
}
