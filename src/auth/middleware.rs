//! Authentication middleware for axum.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::auth::ApiKeyValidator;

/// Error response for authentication failures.
#[derive(Debug, Serialize)]
pub struct AuthError {
    pub error: String,
    pub code: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, Json(self)).into_response()
    }
}

/// Extract and validate an API key from the request.
///
/// Looks for `X-API-Key` header or `Authorization: Bearer <key>` header.
pub async fn require_api_key(
    State(validator): State<ApiKeyValidator>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    // Try X-API-Key header first
    let api_key = request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    // Fall back to Authorization: Bearer
    let api_key = api_key.or_else(|| {
        request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(String::from)
    });

    let api_key = api_key.ok_or_else(|| AuthError {
        error: "Missing API key".to_string(),
        code: "MISSING_API_KEY".to_string(),
    })?;

    let key_info = validator.validate(&api_key).await.ok_or_else(|| {
        tracing::warn!(
            key_prefix = %&api_key[..8.min(api_key.len())],
            "Invalid API key attempted"
        );
        AuthError {
            error: "Invalid API key".to_string(),
            code: "INVALID_API_KEY".to_string(),
        }
    })?;

    // Expose key info to handlers for audit logging
    request.extensions_mut().insert(key_info);

    Ok(next.run(request).await)
}
