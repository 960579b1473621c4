//! HTTP request handlers.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::api::types::*;
use crate::domain::PolicyDocument;
use crate::error::AegisResult;
use crate::AppState;

/// Screen a chat message and forward it through the backend.
///
/// POST /v1/chat
#[utoipa::path(
    post,
    path = "/v1/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Round trip complete", body = ChatResponse),
        (status = 400, description = "Invalid request"),
        (status = 502, description = "Backend failure")
    ),
    tag = "gateway"
)]
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> AegisResult<Json<ChatResponse>> {
    let result = state
        .gateway
        .handle(request.request_id, &request.message)
        .await?;

    let trace = &result.trace;
    Ok(Json(ChatResponse {
        request_id: trace.request_id.clone(),
        reply: result.reply,
        input_action: trace.input_decision.final_action,
        output_action: trace.output_decision.as_ref().map(|d| d.final_action),
        degraded: trace.input_decision.degraded
            || trace
                .output_decision
                .as_ref()
                .map(|d| d.degraded)
                .unwrap_or(false),
    }))
}

/// Evaluate one text against the active policy without calling the backend.
///
/// POST /v1/evaluate
#[utoipa::path(
    post,
    path = "/v1/evaluate",
    request_body = EvaluateRequest,
    responses(
        (status = 200, description = "Evaluation complete", body = EvaluateResponse)
    ),
    tag = "gateway"
)]
pub async fn evaluate(
    State(state): State<AppState>,
    Json(request): Json<EvaluateRequest>,
) -> AegisResult<Json<EvaluateResponse>> {
    let decision = state
        .gateway
        .evaluate_only(&request.text, request.direction)
        .await;

    Ok(Json(EvaluateResponse { decision }))
}

/// The active policy document.
///
/// GET /v1/policy
#[utoipa::path(
    get,
    path = "/v1/policy",
    responses(
        (status = 200, description = "Active policy", body = PolicyDocument)
    ),
    tag = "policy"
)]
pub async fn get_policy(State(state): State<AppState>) -> Json<PolicyDocument> {
    Json(state.policies.active().as_ref().clone())
}

/// Validate and activate a new policy document. All-or-nothing.
///
/// PUT /v1/policy
#[utoipa::path(
    put,
    path = "/v1/policy",
    request_body = PolicyDocument,
    responses(
        (status = 200, description = "Policy activated", body = PolicyActivationResponse),
        (status = 422, description = "Document rejected")
    ),
    tag = "policy"
)]
pub async fn activate_policy(
    State(state): State<AppState>,
    Json(document): Json<PolicyDocument>,
) -> AegisResult<Json<PolicyActivationResponse>> {
    let policy_id = document.id.clone();
    let version = document.version;
    state.policies.activate(document)?;

    Ok(Json(PolicyActivationResponse { policy_id, version }))
}

/// Most recent sealed traces.
///
/// GET /v1/traces
#[utoipa::path(
    get,
    path = "/v1/traces",
    params(
        ("limit" = Option<i64>, Query, description = "Maximum results (default 20)")
    ),
    responses(
        (status = 200, description = "Recent traces", body = ListTracesResponse)
    ),
    tag = "traces"
)]
pub async fn list_traces(
    State(state): State<AppState>,
    Query(query): Query<ListTracesQuery>,
) -> AegisResult<Json<ListTracesResponse>> {
    let limit = query.limit.clamp(1, 100);
    let traces = state.traces.list_recent(limit).await?;

    Ok(Json(ListTracesResponse { traces, limit }))
}

/// One sealed trace by request id.
///
/// GET /v1/traces/{request_id}
#[utoipa::path(
    get,
    path = "/v1/traces/{request_id}",
    params(
        ("request_id" = String, Path, description = "Request id of the trace")
    ),
    responses(
        (status = 200, description = "The trace", body = crate::domain::Trace),
        (status = 404, description = "Unknown request id")
    ),
    tag = "traces"
)]
pub async fn get_trace(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> AegisResult<Json<crate::domain::Trace>> {
    let trace = state.traces.get_trace(&request_id).await?;
    Ok(Json(trace))
}

/// Current counters and pipeline health.
///
/// GET /v1/metrics
#[utoipa::path(
    get,
    path = "/v1/metrics",
    responses(
        (status = 200, description = "Counter snapshot", body = MetricsResponse)
    ),
    tag = "telemetry"
)]
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        snapshot: state.telemetry.snapshot(),
        lag_events: state.telemetry.lag_events(),
    })
}

/// Dashboard projection with current counter values.
///
/// GET /v1/dashboard
#[utoipa::path(
    get,
    path = "/v1/dashboard",
    responses(
        (status = 200, description = "Dashboard layout and counters", body = DashboardResponse)
    ),
    tag = "telemetry"
)]
pub async fn dashboard(State(state): State<AppState>) -> Json<DashboardResponse> {
    Json(DashboardResponse {
        layout: state.dashboard.as_ref().clone(),
        counters: state.telemetry.snapshot(),
    })
}

/// Service health.
///
/// GET /v1/health
#[utoipa::path(
    get,
    path = "/v1/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match state.traces.count().await {
        Ok(_) => "connected".to_string(),
        Err(e) => {
            tracing::error!(error = %e, "Health check database probe failed");
            "error".to_string()
        }
    };

    // A lagging metrics pipeline degrades health but never fails requests.
    let status = match state.telemetry.backpressure() {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "Telemetry backpressure");
            "degraded".to_string()
        }
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
