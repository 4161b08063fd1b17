//! API handlers

mod directory;
mod instances;
mod tasks;
mod templates;

pub use directory::upsert_user;
pub use instances::{
    cancel_instance, get_instance, get_instance_by_task, get_instance_history, initiate_workflow,
    process_action,
};
pub use tasks::list_my_tasks;
pub use templates::{
    create_template, deactivate_template, delete_template, get_template, list_templates,
};

use axum::Json;
use serde::Serialize;

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Liveness probe
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
