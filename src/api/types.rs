//! API request and response types.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{
    CounterSnapshot, DashboardLayout, Decision, EvaluationDirection, FinalAction, Trace,
};

// ==================== Chat ====================

/// A client message to screen and forward to the model backend.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ChatRequest {
    /// Request id for tracing; generated when absent.
    #[serde(default)]
    pub request_id: Option<String>,
    /// The user's message.
    pub message: String,
}

/// Gateway reply for one round trip.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChatResponse {
    /// Request id the round trip was traced under.
    pub request_id: String,
    /// Reply text: the model answer, its redacted copy, or the configured
    /// blocked message.
    pub reply: String,
    /// Final action on the input side.
    pub input_action: FinalAction,
    /// Final action on the output side; absent when the input blocked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_action: Option<FinalAction>,
    /// True when an adapter failure degraded either evaluation.
    pub degraded: bool,
}

// ==================== Direct evaluation ====================

/// Request to evaluate one text without calling the backend.
#[derive(Debug, Deserialize, ToSchema)]
pub struct EvaluateRequest {
    /// Text to evaluate.
    pub text: String,
    /// Which side of the round trip to evaluate it as.
    pub direction: EvaluationDirection,
}

/// Response with the full decision.
#[derive(Debug, Serialize, ToSchema)]
pub struct EvaluateResponse {
    pub decision: Decision,
}

// ==================== Policy ====================

/// Response after activating a policy document.
#[derive(Debug, Serialize, ToSchema)]
pub struct PolicyActivationResponse {
    /// Activated policy id.
    pub policy_id: String,
    /// Activated version.
    pub version: u32,
}

// ==================== Traces ====================

/// Query parameters for listing traces.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListTracesQuery {
    /// Maximum number of results.
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}

/// Response for listing traces.
#[derive(Debug, Serialize, ToSchema)]
pub struct ListTracesResponse {
    /// Most recent traces, newest first.
    pub traces: Vec<Trace>,
    /// Limit used.
    pub limit: i64,
}

// ==================== Metrics & dashboard ====================

/// Counter snapshot plus pipeline health.
#[derive(Debug, Serialize, ToSchema)]
pub struct MetricsResponse {
    /// Current counters.
    #[serde(flatten)]
    pub snapshot: CounterSnapshot,
    /// Times the trace queue was found full.
    pub lag_events: u64,
}

/// Dashboard layout together with current counter values.
#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardResponse {
    pub layout: DashboardLayout,
    pub counters: CounterSnapshot,
}

// ==================== Health ====================

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
    /// Database connectivity.
    pub database: String,
    /// Timestamp.
    pub timestamp: String,
}
