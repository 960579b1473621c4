//! Error types for Aegis Core.
//!
//! Defines a unified error type that maps cleanly to HTTP responses. The
//! variants mirror the failure classes of the gateway: rejected policy
//! documents, trace-lifecycle misuse, backend failures, and the metrics
//! pipeline falling behind. Classifier adapter failures are deliberately not
//! here; they degrade to an undetermined finding inside the engine and
//! never escape as errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Unified error type for Aegis Core operations.
#[derive(Debug, Error)]
pub enum AegisError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A policy document or metric/dashboard configuration failed
    /// validation. Fatal at load; never partially applied.
    #[error("Configuration rejected: {0}")]
    Policy(String),

    /// Misuse of the trace lifecycle. A programming error in the caller,
    /// not a policy outcome.
    #[error("Trace lifecycle violation: {0}")]
    ContractViolation(String),

    /// The metrics pipeline is falling behind. Reported, never fatal to the
    /// request path.
    #[error("Metrics pipeline lagging: {0}")]
    Backpressure(String),

    /// The model backend failed or returned an unusable response.
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body for API clients.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AegisError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            AegisError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None),
            AegisError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone(), None)
            }
            AegisError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone(), None)
            }
            AegisError::Policy(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "POLICY_REJECTED",
                "Configuration rejected".to_string(),
                Some(msg.clone()),
            ),
            AegisError::ContractViolation(msg) => {
                tracing::error!(error = %msg, "Trace lifecycle violation");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONTRACT_VIOLATION",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            AegisError::Backpressure(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "METRICS_LAG",
                msg.clone(),
                None,
            ),
            AegisError::Backend(msg) => {
                tracing::error!(error = %msg, "Backend error");
                (
                    StatusCode::BAD_GATEWAY,
                    "BACKEND_ERROR",
                    "The model backend failed".to_string(),
                    None,
                )
            }
            AegisError::Database(e) => {
                // Log the actual error but don't expose internals
                tracing::error!(error = %e, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                    None,
                )
            }
            AegisError::Serialization(e) => (
                StatusCode::BAD_REQUEST,
                "SERIALIZATION_ERROR",
                "Failed to process request/response".to_string(),
                Some(e.to_string()),
            ),
            AegisError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for Aegis operations.
pub type AegisResult<T> = Result<T, AegisError>;
