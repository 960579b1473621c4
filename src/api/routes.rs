//! Route definitions for the API.

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::SecurityScheme;
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::handlers;
use crate::auth::{require_api_key, ApiKeyValidator};
use crate::AppState;

/// Security scheme modifier for OpenAPI.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(utoipa::openapi::security::ApiKey::Header(
                    utoipa::openapi::security::ApiKeyValue::new("X-API-Key"),
                )),
            );
        }
    }
}

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::chat,
        handlers::evaluate,
        handlers::get_policy,
        handlers::activate_policy,
        handlers::list_traces,
        handlers::get_trace,
        handlers::metrics,
        handlers::dashboard,
        handlers::health_check,
    ),
    components(schemas(
        crate::api::types::ChatRequest,
        crate::api::types::ChatResponse,
        crate::api::types::EvaluateRequest,
        crate::api::types::EvaluateResponse,
        crate::api::types::PolicyActivationResponse,
        crate::api::types::ListTracesQuery,
        crate::api::types::ListTracesResponse,
        crate::api::types::MetricsResponse,
        crate::api::types::DashboardResponse,
        crate::api::types::HealthResponse,
        crate::domain::PolicyDocument,
        crate::domain::TopicRule,
        crate::domain::TopicAction,
        crate::domain::ContentFilterRule,
        crate::domain::ContentCategory,
        crate::domain::FilterStrength,
        crate::domain::WordRules,
        crate::domain::ManagedListId,
        crate::domain::PiiRule,
        crate::domain::PiiEntityType,
        crate::domain::PiiAction,
        crate::domain::EvaluationDirection,
        crate::domain::Decision,
        crate::domain::FinalAction,
        crate::domain::TopicFinding,
        crate::domain::TopicOutcome,
        crate::domain::FilterFinding,
        crate::domain::FilterOutcome,
        crate::domain::WordFinding,
        crate::domain::WordSource,
        crate::domain::PiiFinding,
        crate::domain::PiiOutcome,
        crate::domain::Trace,
        crate::domain::MetricRule,
        crate::domain::TracePredicate,
        crate::domain::CounterSnapshot,
        crate::domain::DashboardLayout,
        crate::domain::Panel,
        crate::domain::ChartKind,
        crate::domain::TimeRange,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "gateway", description = "Message screening endpoints"),
        (name = "policy", description = "Policy inspection and activation"),
        (name = "traces", description = "Sealed decision traces"),
        (name = "telemetry", description = "Counters and dashboard projection"),
        (name = "health", description = "Health and status endpoints")
    ),
    info(
        title = "Aegis Core API",
        version = "0.1.0",
        description = "Content safety gateway - screens prompts and model responses against versioned safety policies",
        license(name = "MIT")
    )
)]
pub struct ApiDoc;

/// Build the API router with optional authentication.
pub fn build_router(
    state: AppState,
    auth_enabled: bool,
    api_key_validator: ApiKeyValidator,
) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    if auth_enabled {
        build_authenticated_router(state, api_key_validator, cors)
    } else {
        build_unauthenticated_router(state, cors)
    }
}

/// Build router with API key authentication on everything but health.
fn build_authenticated_router(
    state: AppState,
    api_key_validator: ApiKeyValidator,
    cors: CorsLayer,
) -> Router {
    let protected_routes = Router::new()
        .route("/v1/chat", post(handlers::chat))
        .route("/v1/evaluate", post(handlers::evaluate))
        .route("/v1/policy", get(handlers::get_policy))
        .route("/v1/policy", put(handlers::activate_policy))
        .route("/v1/traces", get(handlers::list_traces))
        .route("/v1/traces/:request_id", get(handlers::get_trace))
        .route("/v1/metrics", get(handlers::metrics))
        .route("/v1/dashboard", get(handlers::dashboard))
        .layer(middleware::from_fn_with_state(
            api_key_validator.clone(),
            require_api_key,
        ))
        .with_state(state.clone());

    let public_routes = Router::new()
        .route("/v1/health", get(handlers::health_check))
        .with_state(state);

    Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Build router without authentication (for development).
fn build_unauthenticated_router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        // Gateway
        .route("/v1/chat", post(handlers::chat))
        .route("/v1/evaluate", post(handlers::evaluate))
        // Policy
        .route("/v1/policy", get(handlers::get_policy))
        .route("/v1/policy", put(handlers::activate_policy))
        // Traces
        .route("/v1/traces", get(handlers::list_traces))
        .route("/v1/traces/:request_id", get(handlers::get_trace))
        // Telemetry
        .route("/v1/metrics", get(handlers::metrics))
        .route("/v1/dashboard", get(handlers::dashboard))
        // Health
        .route("/v1/health", get(handlers::health_check))
        .with_state(state)
        // OpenAPI docs
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
