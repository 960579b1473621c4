//! Evaluation decision types.
//!
//! A `Decision` is the immutable, aggregated outcome of running every policy
//! check against one piece of text in one direction. Every rule leaves a
//! finding: a hit, a clean pass, or `Undetermined` when the classifier call
//! itself failed. The distinction between "nothing found" and "check did not
//! run" is preserved all the way into the trace.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::policy::{
    ContentCategory, EvaluationDirection, FilterStrength, ManagedListId, PiiEntityType,
};

/// Final action for one direction of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FinalAction {
    /// Nothing triggered; the text passes unchanged.
    None,
    /// Sensitive spans were replaced; the redacted text is used instead.
    Anonymized,
    /// The text is withheld and the configured message substituted.
    Blocked,
}

impl std::fmt::Display for FinalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FinalAction::None => write!(f, "none"),
            FinalAction::Anonymized => write!(f, "anonymized"),
            FinalAction::Blocked => write!(f, "blocked"),
        }
    }
}

/// Outcome of one denied-topic check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TopicOutcome {
    /// The classifier matched the topic. Always blocks.
    Matched,
    /// The classifier ran and did not match.
    NotMatched,
    /// The classifier call failed; the check did not run to completion.
    Undetermined,
}

/// Finding for one denied topic.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TopicFinding {
    /// Topic name from the policy.
    pub name: String,
    /// What the check concluded.
    pub outcome: TopicOutcome,
}

/// Outcome of one content-filter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FilterOutcome {
    /// Severity stayed below the configured threshold.
    None,
    /// Severity met or exceeded the threshold.
    Blocked,
    /// The classifier call failed; the check did not run to completion.
    Undetermined,
}

/// Finding for one content-filter category.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FilterFinding {
    /// Screened category.
    pub category: ContentCategory,
    /// What the check concluded.
    pub action: FilterOutcome,
    /// Severity the classifier reported, when it ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected: Option<FilterStrength>,
}

/// Where a matched phrase came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WordSource {
    /// `blocked_phrases` in the document.
    Custom,
    /// A managed list.
    ManagedList(ManagedListId),
}

/// A matched word rule. Word matches always block.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WordFinding {
    /// The phrase that matched, as configured.
    pub phrase: String,
    /// Which list it came from.
    pub source: WordSource,
}

/// Outcome of one sensitive-information rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PiiOutcome {
    /// Spans detected and the rule blocks.
    Blocked,
    /// Spans detected and replaced with placeholders.
    Anonymized,
    /// Detector ran and found no spans of this type.
    None,
    /// The detector call failed; the check did not run to completion.
    Undetermined,
}

/// Finding for one sensitive-information rule.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PiiFinding {
    /// Entity type from the rule.
    pub entity_type: PiiEntityType,
    /// What the check concluded.
    pub action: PiiOutcome,
    /// Number of spans the detector reported for this type.
    pub span_count: usize,
}

/// The aggregated outcome of all checks for one direction of one request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Decision {
    /// Which side of the backend this evaluation covered.
    pub direction: EvaluationDirection,
    /// Aggregate action per the invariant: blocked if any finding blocked,
    /// else anonymized if any finding anonymized, else none.
    pub final_action: FinalAction,
    /// One finding per denied topic, in document order.
    pub topic_findings: Vec<TopicFinding>,
    /// One finding per screened content filter, in document order.
    pub filter_findings: Vec<FilterFinding>,
    /// Every matched phrase, in scan order.
    pub word_findings: Vec<WordFinding>,
    /// One finding per sensitive-information rule, in document order.
    pub pii_findings: Vec<PiiFinding>,
    /// Redacted copy of the text when any rule anonymized. Carried even when
    /// a simultaneous block wins, so the trace shows what would have been
    /// forwarded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redacted_text: Option<String>,
    /// True when the final action was forced by a fail-closed rule class
    /// whose checks came back undetermined.
    #[serde(default)]
    pub degraded: bool,
}

impl Decision {
    /// Aggregate findings into a decision.
    ///
    /// `fail_closed_undetermined` is true when at least one undetermined
    /// finding belongs to a rule class configured fail-closed; it forces
    /// `Blocked` without turning the finding itself into a match.
    pub fn aggregate(
        direction: EvaluationDirection,
        topic_findings: Vec<TopicFinding>,
        filter_findings: Vec<FilterFinding>,
        word_findings: Vec<WordFinding>,
        pii_findings: Vec<PiiFinding>,
        redacted_text: Option<String>,
        fail_closed_undetermined: bool,
    ) -> Self {
        let any_blocked = topic_findings
            .iter()
            .any(|f| f.outcome == TopicOutcome::Matched)
            || filter_findings
                .iter()
                .any(|f| f.action == FilterOutcome::Blocked)
            || !word_findings.is_empty()
            || pii_findings.iter().any(|f| f.action == PiiOutcome::Blocked);

        let any_anonymized = pii_findings
            .iter()
            .any(|f| f.action == PiiOutcome::Anonymized);

        let final_action = if any_blocked || fail_closed_undetermined {
            FinalAction::Blocked
        } else if any_anonymized {
            FinalAction::Anonymized
        } else {
            FinalAction::None
        };

        Self {
            direction,
            final_action,
            topic_findings,
            filter_findings,
            word_findings,
            pii_findings,
            redacted_text,
            degraded: !any_blocked && fail_closed_undetermined,
        }
    }

    /// An empty, passing decision for the given direction.
    pub fn pass(direction: EvaluationDirection) -> Self {
        Self::aggregate(
            direction,
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            None,
            false,
        )
    }

    /// Whether this side of the round trip blocked.
    pub fn is_blocked(&self) -> bool {
        self.final_action == FinalAction::Blocked
    }

    /// Whether any check failed to run to completion.
    pub fn has_undetermined(&self) -> bool {
        self.topic_findings
            .iter()
            .any(|f| f.outcome == TopicOutcome::Undetermined)
            || self
                .filter_findings
                .iter()
                .any(|f| f.action == FilterOutcome::Undetermined)
            || self
                .pii_findings
                .iter()
                .any(|f| f.action == PiiOutcome::Undetermined)
    }

    /// Names of topics that matched.
    pub fn matched_topics(&self) -> Vec<&str> {
        self.topic_findings
            .iter()
            .filter(|f| f.outcome == TopicOutcome::Matched)
            .map(|f| f.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_beats_anonymized() {
        let decision = Decision::aggregate(
            EvaluationDirection::Input,
            vec![TopicFinding {
                name: "Finance".to_string(),
                outcome: TopicOutcome::Matched,
            }],
            Vec::new(),
            Vec::new(),
            vec![PiiFinding {
                entity_type: PiiEntityType::Email,
                action: PiiOutcome::Anonymized,
                span_count: 1,
            }],
            Some("contact me at {EMAIL}".to_string()),
            false,
        );

        assert_eq!(decision.final_action, FinalAction::Blocked);
        assert!(decision.redacted_text.is_some());
    }

    #[test]
    fn test_anonymize_only_is_not_blocked() {
        let decision = Decision::aggregate(
            EvaluationDirection::Input,
            Vec::new(),
            Vec::new(),
            Vec::new(),
            vec![PiiFinding {
                entity_type: PiiEntityType::Age,
                action: PiiOutcome::Anonymized,
                span_count: 1,
            }],
            Some("I'm {AGE}".to_string()),
            false,
        );

        assert_eq!(decision.final_action, FinalAction::Anonymized);
    }

    #[test]
    fn test_clean_decision_is_none() {
        let decision = Decision::pass(EvaluationDirection::Output);
        assert_eq!(decision.final_action, FinalAction::None);
        assert!(!decision.is_blocked());
        assert!(!decision.has_undetermined());
    }

    #[test]
    fn test_fail_closed_undetermined_blocks_without_match() {
        let decision = Decision::aggregate(
            EvaluationDirection::Input,
            vec![TopicFinding {
                name: "Finance".to_string(),
                outcome: TopicOutcome::Undetermined,
            }],
            Vec::new(),
            Vec::new(),
            Vec::new(),
            None,
            true,
        );

        assert_eq!(decision.final_action, FinalAction::Blocked);
        assert!(decision.degraded);
        assert!(decision.matched_topics().is_empty());
        assert!(decision.has_undetermined());
    }

    #[test]
    fn test_word_match_blocks() {
        let decision = Decision::aggregate(
            EvaluationDirection::Input,
            Vec::new(),
            Vec::new(),
            vec![WordFinding {
                phrase: "competitor".to_string(),
                source: WordSource::Custom,
            }],
            Vec::new(),
            None,
            false,
        );

        assert_eq!(decision.final_action, FinalAction::Blocked);
    }

    #[test]
    fn test_serialization_round_trip() {
        let decision = Decision::aggregate(
            EvaluationDirection::Output,
            Vec::new(),
            vec![FilterFinding {
                category: ContentCategory::Hate,
                action: FilterOutcome::Blocked,
                detected: Some(FilterStrength::High),
            }],
            Vec::new(),
            Vec::new(),
            None,
            false,
        );

        let json = serde_json::to_string(&decision).unwrap();
        let parsed: Decision = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.final_action, FinalAction::Blocked);
        assert_eq!(parsed.filter_findings[0].detected, Some(FilterStrength::High));
    }
}
