use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// The subsystem's error taxonomy. Every variant is an authorization or
/// lookup decision except `Service`, which wraps storage-layer failures; none
/// are retried here.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    /// Distinct from `Forbidden`: the caller may hold a perfectly valid
    /// grant and still fail the record's attribute policy.
    #[error("{0}")]
    PolicyDenied(String),
    #[error("{0}")]
    Validation(String),
    #[error("storage error: {0}")]
    Service(#[from] sqlx::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PolicyDenied(_) => StatusCode::PRECONDITION_FAILED,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Service(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::Conflict(_) => "conflict",
            ApiError::PolicyDenied(_) => "policy_denied",
            ApiError::Validation(_) => "validation",
            ApiError::Service(_) => "service_error",
        }
    }
}

/// Uniform error body: `{"success": false, "error": code, "message": ...}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: &'static str,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            // Storage details stay out of responses.
            ApiError::Service(e) => {
                tracing::error!(error = %e, "storage failure");
                "Server Error".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            success: false,
            error: self.code(),
            message,
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<abe::AbeError> for ApiError {
    fn from(e: abe::AbeError) -> Self {
        // A corrupt envelope is a service fault, never a policy denial.
        tracing::error!(error = %e, "encryption envelope unusable");
        ApiError::Validation(format!("record encryption envelope unusable: {e}"))
    }
}
