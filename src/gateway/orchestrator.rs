//! Gateway orchestration - the full screening round trip.
//!
//! One `handle` call covers a request end to end: evaluate the prompt,
//! short-circuit with the fixed message if it blocks, otherwise call the
//! backend (with the redacted prompt when anonymized), evaluate the
//! response, substitute or redact as decided, seal the trace, and hand it
//! off. Trace persistence and metric extraction sit on the telemetry side of
//! the isolation boundary: their failures are logged, never surfaced to the
//! client.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    Decision, EvaluationDirection, FinalAction, Trace, TraceBuilder,
};
use crate::engine::{PolicyEvaluator, PolicyStore};
use crate::error::AegisResult;
use crate::gateway::backend::TextGenerator;
use crate::telemetry::TelemetryHandle;

/// Durable destination for sealed traces.
#[async_trait]
pub trait TraceSink: Send + Sync {
    async fn persist(&self, trace: &Trace) -> AegisResult<()>;
}

/// Outcome of one round trip.
#[derive(Debug)]
pub struct RoundTrip {
    /// Text returned to the client: the backend reply, its redacted copy, or
    /// a configured blocked message.
    pub reply: String,
    /// The sealed trace.
    pub trace: Trace,
}

/// Orchestrates screening around the model backend.
pub struct ChatGateway {
    evaluator: PolicyEvaluator,
    policies: Arc<PolicyStore>,
    backend: Arc<dyn TextGenerator>,
    trace_sink: Option<Arc<dyn TraceSink>>,
    telemetry: TelemetryHandle,
}

impl ChatGateway {
    pub fn new(
        evaluator: PolicyEvaluator,
        policies: Arc<PolicyStore>,
        backend: Arc<dyn TextGenerator>,
        trace_sink: Option<Arc<dyn TraceSink>>,
        telemetry: TelemetryHandle,
    ) -> Self {
        Self {
            evaluator,
            policies,
            backend,
            trace_sink,
            telemetry,
        }
    }

    /// Screen one message end to end.
    pub async fn handle(
        &self,
        request_id: Option<String>,
        message: &str,
    ) -> AegisResult<RoundTrip> {
        let request_id = request_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let policy = self.policies.active();
        let mut builder = TraceBuilder::begin(&request_id, &policy);

        let input = self
            .evaluator
            .evaluate(message, EvaluationDirection::Input, &policy)
            .await;
        tracing::info!(
            %request_id,
            policy_id = %policy.id,
            policy_version = policy.version,
            action = %input.final_action,
            degraded = input.degraded,
            "Input evaluated"
        );

        let input_action = input.final_action;
        let forward_text = input.redacted_text.clone();
        builder.record_input(input)?;

        if input_action == FinalAction::Blocked {
            let trace = builder.seal()?;
            self.dispatch(&trace).await;
            return Ok(RoundTrip {
                reply: policy.blocked_input_message.clone(),
                trace,
            });
        }

        // The backend sees the redacted text, never the original, when the
        // input was anonymized.
        let prompt = forward_text.as_deref().unwrap_or(message);
        let generated = match self.backend.generate(prompt).await {
            Ok(text) => text,
            Err(e) => {
                // The evaluation still happened; seal and count what we have
                // before reporting the backend failure.
                let trace = builder.seal()?;
                self.dispatch(&trace).await;
                return Err(e);
            }
        };

        let output = self
            .evaluator
            .evaluate(&generated, EvaluationDirection::Output, &policy)
            .await;
        tracing::info!(
            %request_id,
            action = %output.final_action,
            degraded = output.degraded,
            "Output evaluated"
        );

        let reply = match (&output.final_action, &output.redacted_text) {
            (FinalAction::Blocked, _) => policy.blocked_output_message.clone(),
            (FinalAction::Anonymized, Some(redacted)) => redacted.clone(),
            _ => generated,
        };
        builder.record_output(output)?;

        let trace = builder.seal()?;
        self.dispatch(&trace).await;
        Ok(RoundTrip { reply, trace })
    }

    /// Evaluate one direction without touching the backend. The decision is
    /// returned to the caller and deliberately not traced: there is no round
    /// trip to record.
    pub async fn evaluate_only(
        &self,
        text: &str,
        direction: EvaluationDirection,
    ) -> Decision {
        let policy = self.policies.active();
        self.evaluator.evaluate(text, direction, &policy).await
    }

    /// Hand the sealed trace to storage and telemetry. Failures here must
    /// never fail the request.
    async fn dispatch(&self, trace: &Trace) {
        if let Some(sink) = &self.trace_sink {
            if let Err(e) = sink.persist(trace).await {
                tracing::error!(
                    request_id = %trace.request_id,
                    error = %e,
                    "Failed to persist trace"
                );
            }
        }
        self.telemetry.submit(trace.clone());
    }
}
