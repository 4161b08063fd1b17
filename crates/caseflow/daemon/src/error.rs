//! Error types for caseflowd.
//!
//! `ApiError` is the HTTP-facing shape. Engine errors convert by kind:
//! each typed variant picks its status code, and no handler ever inspects
//! message text.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use caseflow_types::EngineError;
use serde::Serialize;
use thiserror::Error;

/// Daemon-level errors (startup, config, shutdown)
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

/// API-facing errors with an HTTP status per kind
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unprocessable: {0}")]
    Unprocessable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::TemplateNotFound(_)
            | EngineError::StepNotFound(_)
            | EngineError::InstanceNotFound(_)
            | EngineError::TaskNotFound(_) => ApiError::NotFound(err.to_string()),

            EngineError::PermissionDenied { .. } => ApiError::Forbidden(err.to_string()),

            EngineError::InvalidAction { .. } => ApiError::Unprocessable(err.to_string()),

            EngineError::AlreadyClosed(_) | EngineError::NoAssigneeAvailable(_) => {
                ApiError::Conflict(err.to_string())
            }

            EngineError::DuplicateStepId(_)
            | EngineError::DuplicateAction { .. }
            | EngineError::InitialStepCount(_)
            | EngineError::NoReachableFinalStep
            | EngineError::Validation(_) => ApiError::BadRequest(err.to_string()),

            EngineError::Configuration(_) | EngineError::Storage(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<caseflow_store::StorageError> for ApiError {
    fn from(err: caseflow_store::StorageError) -> Self {
        use caseflow_store::StorageError;
        match err {
            StorageError::NotFound(msg) => ApiError::NotFound(msg),
            StorageError::Conflict(msg) => ApiError::Conflict(msg),
            StorageError::InvalidInput(msg) => ApiError::BadRequest(msg),
            StorageError::InvariantViolation(msg)
            | StorageError::Serialization(msg)
            | StorageError::Backend(msg) => ApiError::Internal(msg),
        }
    }
}

/// Error payload returned to clients
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            ApiError::Unprocessable(_) => (StatusCode::UNPROCESSABLE_ENTITY, "unprocessable"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if matches!(self, ApiError::Internal(_)) {
            tracing::error!(error = %self, "internal error serving request");
        }
        let body = ErrorBody {
            error: kind,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caseflow_types::{InstanceId, StepId, UserId};

    #[test]
    fn test_engine_error_mapping() {
        let err: ApiError = EngineError::AlreadyClosed(InstanceId::new("i-1")).into();
        assert!(matches!(err, ApiError::Conflict(_)));

        let err: ApiError = EngineError::InvalidAction {
            step: StepId::new("s"),
            action: "x".into(),
        }
        .into();
        assert!(matches!(err, ApiError::Unprocessable(_)));

        let err: ApiError = EngineError::PermissionDenied {
            user: UserId::new("u"),
            step: StepId::new("s"),
        }
        .into();
        assert!(matches!(err, ApiError::Forbidden(_)));

        let err: ApiError = EngineError::TemplateNotFound("leave".into()).into();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
