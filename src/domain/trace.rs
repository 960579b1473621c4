//! Per-request decision traces.
//!
//! One `Trace` is produced per full round trip: the input decision, the
//! output decision when the backend was reached, and timing. The builder
//! enforces the lifecycle: misuse is a programming error surfaced as
//! `ContractViolation`, never a policy outcome. A sealed trace is read-only;
//! downstream consumers (durable storage, metric extraction) receive it by
//! value or behind `Arc` and never mutate it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::decision::Decision;
use crate::domain::policy::{EvaluationDirection, PolicyDocument};
use crate::error::{AegisError, AegisResult};

/// The sealed record of one round trip through the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Trace {
    /// Request this trace belongs to.
    pub request_id: String,
    /// Policy the request was evaluated under.
    pub policy_id: String,
    /// Version of that policy.
    pub policy_version: u32,
    /// Decision for the user-supplied text.
    pub input_decision: Decision,
    /// Decision for the backend response. Absent when the input blocked,
    /// because the backend is never called in that case.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_decision: Option<Decision>,
    /// When the request entered the gateway.
    pub started_at: DateTime<Utc>,
    /// When the trace was sealed.
    pub sealed_at: DateTime<Utc>,
}

impl Trace {
    /// Decision for the given direction, if recorded.
    pub fn decision(&self, direction: EvaluationDirection) -> Option<&Decision> {
        match direction {
            EvaluationDirection::Input => Some(&self.input_decision),
            EvaluationDirection::Output => self.output_decision.as_ref(),
        }
    }
}

/// Assembles the decisions of one request into a trace.
///
/// Owned by exactly one request; the lifecycle methods must be called
/// sequentially by that request's task.
#[derive(Debug)]
pub struct TraceBuilder {
    request_id: String,
    policy_id: String,
    policy_version: u32,
    started_at: DateTime<Utc>,
    input_decision: Option<Decision>,
    output_decision: Option<Decision>,
}

impl TraceBuilder {
    /// Start a trace for a request evaluated under the given policy.
    pub fn begin(request_id: impl Into<String>, policy: &PolicyDocument) -> Self {
        Self {
            request_id: request_id.into(),
            policy_id: policy.id.clone(),
            policy_version: policy.version,
            started_at: Utc::now(),
            input_decision: None,
            output_decision: None,
        }
    }

    /// Record the input-side decision. Callable exactly once.
    pub fn record_input(&mut self, decision: Decision) -> AegisResult<()> {
        if decision.direction != EvaluationDirection::Input {
            return Err(AegisError::ContractViolation(
                "record_input called with an output-direction decision".to_string(),
            ));
        }
        if self.input_decision.is_some() {
            return Err(AegisError::ContractViolation(
                "input decision already recorded".to_string(),
            ));
        }
        self.input_decision = Some(decision);
        Ok(())
    }

    /// Record the output-side decision. Callable exactly once, and only when
    /// the input decision did not block; a blocked input means the backend
    /// was never called, so there is nothing to evaluate.
    pub fn record_output(&mut self, decision: Decision) -> AegisResult<()> {
        if decision.direction != EvaluationDirection::Output {
            return Err(AegisError::ContractViolation(
                "record_output called with an input-direction decision".to_string(),
            ));
        }
        match &self.input_decision {
            None => {
                return Err(AegisError::ContractViolation(
                    "output decision recorded before input decision".to_string(),
                ));
            }
            Some(input) if input.is_blocked() => {
                return Err(AegisError::ContractViolation(
                    "output decision recorded after a blocked input".to_string(),
                ));
            }
            Some(_) => {}
        }
        if self.output_decision.is_some() {
            return Err(AegisError::ContractViolation(
                "output decision already recorded".to_string(),
            ));
        }
        self.output_decision = Some(decision);
        Ok(())
    }

    /// Seal the trace. Consumes the builder, so sealing twice is
    /// unrepresentable; sealing without an input decision is a contract
    /// violation.
    pub fn seal(self) -> AegisResult<Trace> {
        let input_decision = self.input_decision.ok_or_else(|| {
            AegisError::ContractViolation("sealed without an input decision".to_string())
        })?;

        Ok(Trace {
            request_id: self.request_id,
            policy_id: self.policy_id,
            policy_version: self.policy_version,
            input_decision,
            output_decision: self.output_decision,
            started_at: self.started_at,
            sealed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::decision::{FinalAction, TopicFinding, TopicOutcome};
    use crate::domain::policy::WordRules;

    fn policy() -> PolicyDocument {
        PolicyDocument {
            id: "p1".to_string(),
            version: 3,
            denied_topics: Vec::new(),
            content_filters: Vec::new(),
            word_rules: WordRules::default(),
            sensitive_info_rules: Vec::new(),
            blocked_input_message: "blocked".to_string(),
            blocked_output_message: "blocked".to_string(),
        }
    }

    fn blocked_input() -> Decision {
        Decision::aggregate(
            EvaluationDirection::Input,
            vec![TopicFinding {
                name: "Finance".to_string(),
                outcome: TopicOutcome::Matched,
            }],
            Vec::new(),
            Vec::new(),
            Vec::new(),
            None,
            false,
        )
    }

    #[test]
    fn test_full_round_trip() {
        let mut builder = TraceBuilder::begin("req-1", &policy());
        builder
            .record_input(Decision::pass(EvaluationDirection::Input))
            .unwrap();
        builder
            .record_output(Decision::pass(EvaluationDirection::Output))
            .unwrap();

        let trace = builder.seal().unwrap();
        assert_eq!(trace.request_id, "req-1");
        assert_eq!(trace.policy_version, 3);
        assert!(trace.output_decision.is_some());
        assert!(trace.sealed_at >= trace.started_at);
    }

    #[test]
    fn test_blocked_input_has_no_output() {
        let mut builder = TraceBuilder::begin("req-2", &policy());
        builder.record_input(blocked_input()).unwrap();

        let err = builder
            .record_output(Decision::pass(EvaluationDirection::Output))
            .unwrap_err();
        assert!(matches!(err, AegisError::ContractViolation(_)));

        let trace = builder.seal().unwrap();
        assert_eq!(trace.input_decision.final_action, FinalAction::Blocked);
        assert!(trace.output_decision.is_none());
    }

    #[test]
    fn test_output_before_input_rejected() {
        let mut builder = TraceBuilder::begin("req-3", &policy());
        let err = builder
            .record_output(Decision::pass(EvaluationDirection::Output))
            .unwrap_err();
        assert!(matches!(err, AegisError::ContractViolation(_)));
    }

    #[test]
    fn test_double_input_rejected() {
        let mut builder = TraceBuilder::begin("req-4", &policy());
        builder
            .record_input(Decision::pass(EvaluationDirection::Input))
            .unwrap();
        let err = builder
            .record_input(Decision::pass(EvaluationDirection::Input))
            .unwrap_err();
        assert!(matches!(err, AegisError::ContractViolation(_)));
    }

    #[test]
    fn test_wrong_direction_rejected() {
        let mut builder = TraceBuilder::begin("req-5", &policy());
        let err = builder
            .record_input(Decision::pass(EvaluationDirection::Output))
            .unwrap_err();
        assert!(matches!(err, AegisError::ContractViolation(_)));
    }

    #[test]
    fn test_seal_without_input_rejected() {
        let builder = TraceBuilder::begin("req-6", &policy());
        assert!(matches!(
            builder.seal().unwrap_err(),
            AegisError::ContractViolation(_)
        ));
    }

    #[test]
    fn test_trace_serializes_without_null_output() {
        let mut builder = TraceBuilder::begin("req-7", &policy());
        builder.record_input(blocked_input()).unwrap();
        let trace = builder.seal().unwrap();

        let json = serde_json::to_string(&trace).unwrap();
        assert!(!json.contains("output_decision"));

        let parsed: Trace = serde_json::from_str(&json).unwrap();
        assert!(parsed.output_decision.is_none());
    }
}
