//! Metric extraction domain types.
//!
//! Counters are derived from sealed traces by declarative rules. A rule's
//! predicate is a typed expression over the trace structure, not a string
//! pattern over serialized log text, so a rule that would reference a
//! nonexistent field cannot be constructed or deserialized in the first
//! place.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::decision::{Decision, FilterOutcome, FinalAction, PiiOutcome, TopicOutcome};
use crate::domain::policy::{ContentCategory, EvaluationDirection, PiiAction, PiiEntityType};
use crate::domain::trace::Trace;
use crate::error::{AegisError, AegisResult};

/// A typed predicate over a sealed trace.
///
/// Every variant is a pure function of the trace: same trace, same answer.
/// `direction: None` means "either side".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TracePredicate {
    /// Matches every trace. The base invocation counter.
    Invoked,
    /// The input side passed and the backend was called.
    BackendInvoked,
    /// A side finished with `Blocked`.
    Blocked {
        #[serde(skip_serializing_if = "Option::is_none")]
        direction: Option<EvaluationDirection>,
    },
    /// A side finished with `Anonymized`.
    Anonymized {
        #[serde(skip_serializing_if = "Option::is_none")]
        direction: Option<EvaluationDirection>,
    },
    /// A specific denied topic matched.
    TopicMatched {
        topic: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        direction: Option<EvaluationDirection>,
    },
    /// A content filter blocked for the given category.
    FilterBlocked {
        category: ContentCategory,
        #[serde(skip_serializing_if = "Option::is_none")]
        direction: Option<EvaluationDirection>,
    },
    /// A word rule matched. With `phrase: None`, any phrase counts.
    WordMatched {
        #[serde(skip_serializing_if = "Option::is_none")]
        phrase: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        direction: Option<EvaluationDirection>,
    },
    /// A sensitive-information rule took the given action.
    PiiAction {
        entity_type: PiiEntityType,
        action: PiiAction,
        #[serde(skip_serializing_if = "Option::is_none")]
        direction: Option<EvaluationDirection>,
    },
    /// At least one check failed to run (adapter failure), distinct from a
    /// clean pass.
    Undetermined {
        #[serde(skip_serializing_if = "Option::is_none")]
        direction: Option<EvaluationDirection>,
    },
}

impl TracePredicate {
    /// Evaluate against a sealed trace. Pure; holds no state.
    pub fn eval(&self, trace: &Trace) -> bool {
        match self {
            TracePredicate::Invoked => true,
            TracePredicate::BackendInvoked => trace.output_decision.is_some(),
            TracePredicate::Blocked { direction } => {
                Self::any_decision(trace, *direction, |d| d.final_action == FinalAction::Blocked)
            }
            TracePredicate::Anonymized { direction } => Self::any_decision(trace, *direction, |d| {
                d.final_action == FinalAction::Anonymized
            }),
            TracePredicate::TopicMatched { topic, direction } => {
                Self::any_decision(trace, *direction, |d| {
                    d.topic_findings
                        .iter()
                        .any(|f| f.outcome == TopicOutcome::Matched && f.name == *topic)
                })
            }
            TracePredicate::FilterBlocked {
                category,
                direction,
            } => Self::any_decision(trace, *direction, |d| {
                d.filter_findings
                    .iter()
                    .any(|f| f.action == FilterOutcome::Blocked && f.category == *category)
            }),
            TracePredicate::WordMatched { phrase, direction } => {
                Self::any_decision(trace, *direction, |d| {
                    d.word_findings.iter().any(|f| match phrase {
                        Some(p) => f.phrase.eq_ignore_ascii_case(p),
                        None => true,
                    })
                })
            }
            TracePredicate::PiiAction {
                entity_type,
                action,
                direction,
            } => {
                let wanted = match action {
                    PiiAction::Block => PiiOutcome::Blocked,
                    PiiAction::Anonymize => PiiOutcome::Anonymized,
                };
                Self::any_decision(trace, *direction, |d| {
                    d.pii_findings
                        .iter()
                        .any(|f| f.action == wanted && f.entity_type == *entity_type)
                })
            }
            TracePredicate::Undetermined { direction } => {
                Self::any_decision(trace, *direction, Decision::has_undetermined)
            }
        }
    }

    fn any_decision(
        trace: &Trace,
        direction: Option<EvaluationDirection>,
        pred: impl Fn(&Decision) -> bool,
    ) -> bool {
        match direction {
            Some(dir) => trace.decision(dir).map(&pred).unwrap_or(false),
            None => {
                pred(&trace.input_decision)
                    || trace.output_decision.as_ref().map(&pred).unwrap_or(false)
            }
        }
    }
}

/// A named extraction rule: increment 1 when the predicate holds, else 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MetricRule {
    /// Counter name this rule feeds.
    pub name: String,
    /// The predicate.
    pub predicate: TracePredicate,
}

impl MetricRule {
    pub fn new(name: impl Into<String>, predicate: TracePredicate) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }

    /// Reject rules that could never fire or could not be reported.
    ///
    /// Structural references (categories, entity types, directions) are
    /// already guaranteed valid by the type system; what remains is the
    /// free-form text.
    pub fn validate(&self) -> AegisResult<()> {
        if self.name.trim().is_empty() {
            return Err(AegisError::Policy(
                "metric rule name must not be empty".to_string(),
            ));
        }
        match &self.predicate {
            TracePredicate::TopicMatched { topic, .. } if topic.trim().is_empty() => {
                Err(AegisError::Policy(format!(
                    "metric rule '{}' references an empty topic name",
                    self.name
                )))
            }
            TracePredicate::WordMatched {
                phrase: Some(p), ..
            } if p.trim().is_empty() => Err(AegisError::Policy(format!(
                "metric rule '{}' references an empty phrase",
                self.name
            ))),
            _ => Ok(()),
        }
    }
}

/// Point-in-time view of all counters in a namespace.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CounterSnapshot {
    /// Namespace the counters belong to.
    pub namespace: String,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
    /// Counter name to count. Monotonically non-decreasing within a
    /// reporting window.
    pub counters: BTreeMap<String, u64>,
}

impl CounterSnapshot {
    /// Count for a named counter, zero if never incremented.
    pub fn get(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }
}
