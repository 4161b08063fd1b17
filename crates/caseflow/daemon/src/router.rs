//! API router configuration

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let api_routes = Router::new()
        // Health
        .route("/health", get(handlers::health_check))
        // Templates
        .route("/templates", get(handlers::list_templates))
        .route("/templates", post(handlers::create_template))
        .route("/templates/:id", get(handlers::get_template))
        .route("/templates/:id", delete(handlers::delete_template))
        .route("/templates/:id/deactivate", post(handlers::deactivate_template))
        // Workflow lifecycle
        .route("/workflows", post(handlers::initiate_workflow))
        .route("/instances/:id", get(handlers::get_instance))
        .route("/instances/:id/actions", post(handlers::process_action))
        .route("/instances/:id/cancel", post(handlers::cancel_instance))
        .route("/instances/:id/history", get(handlers::get_instance_history))
        .route("/instances/by-task/:task_id", get(handlers::get_instance_by_task))
        // Tasks
        .route("/tasks", get(handlers::list_my_tasks))
        // Directory sync (consumed capability; the surrounding system
        // pushes user/role changes here)
        .route("/users", put(handlers::upsert_user));

    let mut router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router.with_state(state)
}
