use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::shopify::GatewayError;

pub type AppResult<T> = Result<T, AppError>;

/// Application-level error taxonomy. Every public operation translates its
/// failures into one of these kinds at the handler boundary.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or malformed input on a submission. Never retried.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// Status guard violation, or the platform reported the refund already
    /// happened. The idempotency barrier against duplicate approvals.
    #[error("This request has already been processed.")]
    AlreadyProcessed,

    /// The external order could not be re-resolved during an admin decision.
    /// Local state is left unchanged, so the operation is safe to retry.
    #[error("Original order could not be found: {0}")]
    Reconciliation(String),

    /// Any other failure talking to the commerce platform. Carries the
    /// upstream payload for admin-facing diagnosis.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("{0}")]
    Unauthorized(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("Failed to store attachment: {0}")]
    Storage(#[from] std::io::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::AlreadyProcessed => (StatusCode::CONFLICT, self.to_string()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Reconciliation(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            // The upstream payload is intended for the admin dashboard.
            AppError::Gateway(err) => (StatusCode::BAD_GATEWAY, err.to_string()),
            // Never leak database or filesystem internals to callers.
            AppError::Database(_) | AppError::Storage(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error.".to_string(),
            ),
        };

        // Full detail is logged here, at the point of catch.
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "request failed");
        } else {
            tracing::warn!(status = %status, error = %self, "request rejected");
        }

        (
            status,
            Json(serde_json::json!({ "success": false, "error": message })),
        )
            .into_response()
    }
}
