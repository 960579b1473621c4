//! Policy evaluation engine.
//!
//! Applies a `PolicyDocument` to one piece of text in one direction and
//! produces a `Decision`. Every check runs unconditionally; the engine
//! never short-circuits after the first hit, so a single decision reports
//! every finding. The classifier is the only suspension point; each call is
//! bounded by a timeout and a failed call degrades to an `Undetermined`
//! finding instead of an error.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::classifier::{AdapterError, Classifier, PiiSpan};
use crate::domain::{
    Decision, EvaluationDirection, FilterFinding, FilterOutcome, FilterStrength, PiiAction,
    PiiFinding, PiiOutcome, PolicyDocument, TopicFinding, TopicOutcome,
};
use crate::engine::redaction::redact;
use crate::engine::words::{find_word_matches, ManagedListResolver};

/// Behavior when a rule class cannot be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailMode {
    /// Pass through; the adapter failure is logged and visible in the trace.
    Open,
    /// Block the message when any check of this class is undetermined.
    Closed,
}

/// Evaluator tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluatorConfig {
    /// Time limit for a single classifier call, in seconds.
    pub adapter_timeout_secs: u64,
    /// Failure behavior for denied-topic checks.
    pub topics_fail_mode: FailMode,
    /// Failure behavior for content-filter checks.
    pub filters_fail_mode: FailMode,
    /// Failure behavior for sensitive-information checks.
    pub pii_fail_mode: FailMode,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            adapter_timeout_secs: 10,
            topics_fail_mode: FailMode::Open,
            filters_fail_mode: FailMode::Open,
            pii_fail_mode: FailMode::Open,
        }
    }
}

/// Stateless policy evaluator. Safe to share across concurrent requests;
/// all per-call state lives on the stack.
pub struct PolicyEvaluator {
    classifier: Arc<dyn Classifier>,
    word_lists: Arc<dyn ManagedListResolver>,
    config: EvaluatorConfig,
}

impl PolicyEvaluator {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        word_lists: Arc<dyn ManagedListResolver>,
        config: EvaluatorConfig,
    ) -> Self {
        Self {
            classifier,
            word_lists,
            config,
        }
    }

    /// Evaluate `text` against `policy` for one direction.
    ///
    /// Never fails for well-formed input; the empty string trivially passes.
    pub async fn evaluate(
        &self,
        text: &str,
        direction: EvaluationDirection,
        policy: &PolicyDocument,
    ) -> Decision {
        if text.is_empty() {
            return Decision::pass(direction);
        }

        let mut fail_closed_hit = false;

        // Denied topics. A match always blocks; topics have no strength tiers.
        let mut topic_findings = Vec::with_capacity(policy.denied_topics.len());
        for topic in &policy.denied_topics {
            let outcome = match self
                .bounded(self.classifier.classify_topic(text, topic))
                .await
            {
                Ok(true) => TopicOutcome::Matched,
                Ok(false) => TopicOutcome::NotMatched,
                Err(e) => {
                    tracing::warn!(
                        topic = %topic.name,
                        %direction,
                        error = %e,
                        "Topic classification failed; finding is undetermined"
                    );
                    if self.config.topics_fail_mode == FailMode::Closed {
                        fail_closed_hit = true;
                    }
                    TopicOutcome::Undetermined
                }
            };
            topic_findings.push(TopicFinding {
                name: topic.name.clone(),
                outcome,
            });
        }

        // Content filters. A threshold of `none` for this direction means the
        // category is skipped outright, not always-pass: no finding appears.
        let mut filter_findings = Vec::new();
        for rule in &policy.content_filters {
            let threshold = rule.threshold(direction);
            if threshold == FilterStrength::None {
                continue;
            }

            let finding = match self
                .bounded(self.classifier.classify_content(text, rule.category))
                .await
            {
                Ok(detected) => FilterFinding {
                    category: rule.category,
                    action: if detected >= threshold {
                        FilterOutcome::Blocked
                    } else {
                        FilterOutcome::None
                    },
                    detected: Some(detected),
                },
                Err(e) => {
                    tracing::warn!(
                        category = %rule.category,
                        %direction,
                        error = %e,
                        "Content classification failed; finding is undetermined"
                    );
                    if self.config.filters_fail_mode == FailMode::Closed {
                        fail_closed_hit = true;
                    }
                    FilterFinding {
                        category: rule.category,
                        action: FilterOutcome::Undetermined,
                        detected: None,
                    }
                }
            };
            filter_findings.push(finding);
        }

        // Word rules run in-process and cannot fail.
        let word_findings = find_word_matches(text, &policy.word_rules, self.word_lists.as_ref());

        // Sensitive information: one detector pass covers every rule.
        let mut pii_findings = Vec::new();
        let mut redacted_text = None;
        if !policy.sensitive_info_rules.is_empty() {
            match self.bounded(self.classifier.detect_pii(text)).await {
                Ok(spans) => {
                    let mut anonymize_spans: Vec<PiiSpan> = Vec::new();
                    for rule in &policy.sensitive_info_rules {
                        let matched: Vec<&PiiSpan> = spans
                            .iter()
                            .filter(|s| s.entity_type == rule.entity_type)
                            .collect();

                        let action = if matched.is_empty() {
                            PiiOutcome::None
                        } else {
                            match rule.action {
                                PiiAction::Block => PiiOutcome::Blocked,
                                PiiAction::Anonymize => {
                                    anonymize_spans.extend(matched.iter().map(|s| (*s).clone()));
                                    PiiOutcome::Anonymized
                                }
                            }
                        };
                        pii_findings.push(PiiFinding {
                            entity_type: rule.entity_type,
                            action,
                            span_count: matched.len(),
                        });
                    }

                    if !anonymize_spans.is_empty() {
                        redacted_text = Some(redact(text, &anonymize_spans));
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        %direction,
                        error = %e,
                        "Sensitive-information detection failed; findings are undetermined"
                    );
                    if self.config.pii_fail_mode == FailMode::Closed {
                        fail_closed_hit = true;
                    }
                    for rule in &policy.sensitive_info_rules {
                        pii_findings.push(PiiFinding {
                            entity_type: rule.entity_type,
                            action: PiiOutcome::Undetermined,
                            span_count: 0,
                        });
                    }
                }
            }
        }

        let decision = Decision::aggregate(
            direction,
            topic_findings,
            filter_findings,
            word_findings,
            pii_findings,
            redacted_text,
            fail_closed_hit,
        );

        tracing::debug!(
            policy_id = %policy.id,
            policy_version = policy.version,
            %direction,
            final_action = %decision.final_action,
            degraded = decision.degraded,
            "Evaluation complete"
        );

        decision
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, AdapterError>>,
    ) -> Result<T, AdapterError> {
        let secs = self.config.adapter_timeout_secs;
        match tokio::time::timeout(Duration::from_secs(secs), call).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::Timeout(secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    use crate::classifier::LexiconClassifier;
    use crate::domain::{
        ContentCategory, ContentFilterRule, FinalAction, ManagedListId, PiiEntityType, PiiRule,
        TopicAction, TopicRule, WordRules,
    };
    use crate::engine::words::BuiltinWordLists;

    /// Scripted classifier: answers come from the test, not from text.
    #[derive(Default)]
    struct ScriptedClassifier {
        topics: HashMap<String, bool>,
        severities: HashMap<ContentCategory, FilterStrength>,
        pii_spans: Vec<PiiSpan>,
        fail_topics: bool,
        fail_content: bool,
        fail_pii: bool,
    }

    #[async_trait]
    impl Classifier for ScriptedClassifier {
        async fn classify_topic(
            &self,
            _text: &str,
            topic: &TopicRule,
        ) -> Result<bool, AdapterError> {
            if self.fail_topics {
                return Err(AdapterError::Http("scripted failure".to_string()));
            }
            Ok(self.topics.get(&topic.name).copied().unwrap_or(false))
        }

        async fn classify_content(
            &self,
            _text: &str,
            category: ContentCategory,
        ) -> Result<FilterStrength, AdapterError> {
            if self.fail_content {
                return Err(AdapterError::Timeout(1));
            }
            Ok(self
                .severities
                .get(&category)
                .copied()
                .unwrap_or(FilterStrength::None))
        }

        async fn detect_pii(&self, _text: &str) -> Result<Vec<PiiSpan>, AdapterError> {
            if self.fail_pii {
                return Err(AdapterError::Malformed("scripted failure".to_string()));
            }
            Ok(self.pii_spans.clone())
        }
    }

    fn evaluator(classifier: ScriptedClassifier, config: EvaluatorConfig) -> PolicyEvaluator {
        PolicyEvaluator::new(
            Arc::new(classifier),
            Arc::new(BuiltinWordLists::new()),
            config,
        )
    }

    fn policy() -> PolicyDocument {
        PolicyDocument {
            id: "travel-assistant".to_string(),
            version: 1,
            denied_topics: vec![TopicRule {
                name: "Finance".to_string(),
                definition: "Investment advice and get-rich-quick schemes".to_string(),
                examples: vec!["Where can I invest to get rich?".to_string()],
                action: TopicAction::Deny,
            }],
            content_filters: vec![
                ContentFilterRule {
                    category: ContentCategory::Insults,
                    input_strength: FilterStrength::High,
                    output_strength: FilterStrength::Medium,
                },
                ContentFilterRule {
                    category: ContentCategory::Violence,
                    input_strength: FilterStrength::None,
                    output_strength: FilterStrength::High,
                },
            ],
            word_rules: WordRules {
                blocked_phrases: vec!["competitor".to_string()],
                managed_lists: vec![ManagedListId::Profanity],
            },
            sensitive_info_rules: vec![
                PiiRule {
                    entity_type: PiiEntityType::Age,
                    action: PiiAction::Anonymize,
                },
                PiiRule {
                    entity_type: PiiEntityType::Email,
                    action: PiiAction::Block,
                },
            ],
            blocked_input_message: "Sorry, I cannot help with that request.".to_string(),
            blocked_output_message: "Sorry, I cannot answer that.".to_string(),
        }
    }

    #[tokio::test]
    async fn test_empty_text_passes() {
        let eval = evaluator(ScriptedClassifier::default(), EvaluatorConfig::default());
        let decision = eval
            .evaluate("", EvaluationDirection::Input, &policy())
            .await;
        assert_eq!(decision.final_action, FinalAction::None);
        assert!(decision.topic_findings.is_empty());
    }

    #[tokio::test]
    async fn test_denied_topic_blocks() {
        let classifier = ScriptedClassifier {
            topics: HashMap::from([("Finance".to_string(), true)]),
            ..Default::default()
        };
        let eval = evaluator(classifier, EvaluatorConfig::default());
        let decision = eval
            .evaluate(
                "Should I invest in your company?",
                EvaluationDirection::Input,
                &policy(),
            )
            .await;

        assert_eq!(decision.final_action, FinalAction::Blocked);
        assert_eq!(decision.matched_topics(), vec!["Finance"]);
    }

    #[tokio::test]
    async fn test_high_severity_blocks_at_high_threshold() {
        let classifier = ScriptedClassifier {
            severities: HashMap::from([(ContentCategory::Insults, FilterStrength::High)]),
            ..Default::default()
        };
        let eval = evaluator(classifier, EvaluatorConfig::default());
        let decision = eval
            .evaluate(
                "That hotel rate is too damn expensive!",
                EvaluationDirection::Input,
                &policy(),
            )
            .await;

        // The insults filter fires regardless of the simultaneous profanity
        // word match, and both findings are recorded.
        let insults = decision
            .filter_findings
            .iter()
            .find(|f| f.category == ContentCategory::Insults)
            .unwrap();
        assert_eq!(insults.action, FilterOutcome::Blocked);
        assert_eq!(insults.detected, Some(FilterStrength::High));
        assert!(!decision.word_findings.is_empty());
        assert_eq!(decision.final_action, FinalAction::Blocked);
    }

    #[tokio::test]
    async fn test_severity_below_threshold_passes() {
        let classifier = ScriptedClassifier {
            severities: HashMap::from([(ContentCategory::Insults, FilterStrength::Medium)]),
            ..Default::default()
        };
        let eval = evaluator(classifier, EvaluatorConfig::default());
        let decision = eval
            .evaluate("mildly rude text", EvaluationDirection::Input, &policy())
            .await;

        let insults = decision
            .filter_findings
            .iter()
            .find(|f| f.category == ContentCategory::Insults)
            .unwrap();
        assert_eq!(insults.action, FilterOutcome::None);
        assert_eq!(decision.final_action, FinalAction::None);
    }

    #[tokio::test]
    async fn test_none_threshold_skips_category_for_direction() {
        let classifier = ScriptedClassifier {
            severities: HashMap::from([(ContentCategory::Violence, FilterStrength::High)]),
            ..Default::default()
        };
        let eval = evaluator(classifier, EvaluatorConfig::default());

        // Violence screens only the output direction in this policy.
        let input = eval
            .evaluate("some text", EvaluationDirection::Input, &policy())
            .await;
        assert!(!input
            .filter_findings
            .iter()
            .any(|f| f.category == ContentCategory::Violence));
        assert_eq!(input.final_action, FinalAction::None);

        let classifier = ScriptedClassifier {
            severities: HashMap::from([(ContentCategory::Violence, FilterStrength::High)]),
            ..Default::default()
        };
        let eval = evaluator(classifier, EvaluatorConfig::default());
        let output = eval
            .evaluate("some text", EvaluationDirection::Output, &policy())
            .await;
        assert!(output
            .filter_findings
            .iter()
            .any(|f| f.category == ContentCategory::Violence
                && f.action == FilterOutcome::Blocked));
    }

    #[tokio::test]
    async fn test_blocked_phrase_blocks() {
        let eval = evaluator(ScriptedClassifier::default(), EvaluatorConfig::default());
        let decision = eval
            .evaluate(
                "What does our Competitor charge?",
                EvaluationDirection::Input,
                &policy(),
            )
            .await;

        assert_eq!(decision.final_action, FinalAction::Blocked);
        assert_eq!(decision.word_findings[0].phrase, "competitor");
    }

    #[tokio::test]
    async fn test_pii_anonymize_redacts_without_blocking() {
        let text = "I'm 17 years old, am I allowed to travel?";
        let classifier = ScriptedClassifier {
            pii_spans: vec![PiiSpan {
                entity_type: PiiEntityType::Age,
                start: 4,
                end: 16,
            }],
            ..Default::default()
        };
        let eval = evaluator(classifier, EvaluatorConfig::default());
        let decision = eval.evaluate(text, EvaluationDirection::Input, &policy()).await;

        assert_eq!(decision.final_action, FinalAction::Anonymized);
        assert_eq!(
            decision.redacted_text.as_deref(),
            Some("I'm {AGE}, am I allowed to travel?")
        );
        let age = decision
            .pii_findings
            .iter()
            .find(|f| f.entity_type == PiiEntityType::Age)
            .unwrap();
        assert_eq!(age.action, PiiOutcome::Anonymized);
        assert_eq!(age.span_count, 1);
    }

    #[tokio::test]
    async fn test_pii_block_rule_blocks() {
        let classifier = ScriptedClassifier {
            pii_spans: vec![PiiSpan {
                entity_type: PiiEntityType::Email,
                start: 0,
                end: 6,
            }],
            ..Default::default()
        };
        let eval = evaluator(classifier, EvaluatorConfig::default());
        let decision = eval
            .evaluate("a@b.co is my mail", EvaluationDirection::Input, &policy())
            .await;

        assert_eq!(decision.final_action, FinalAction::Blocked);
    }

    #[tokio::test]
    async fn test_adapter_failure_fails_open_by_default() {
        let classifier = ScriptedClassifier {
            fail_topics: true,
            fail_content: true,
            fail_pii: true,
            ..Default::default()
        };
        let eval = evaluator(classifier, EvaluatorConfig::default());
        let decision = eval
            .evaluate("anything at all", EvaluationDirection::Input, &policy())
            .await;

        assert_eq!(decision.final_action, FinalAction::None);
        assert!(decision.has_undetermined());
        assert_eq!(decision.topic_findings[0].outcome, TopicOutcome::Undetermined);
        assert!(decision
            .pii_findings
            .iter()
            .all(|f| f.action == PiiOutcome::Undetermined));
    }

    #[tokio::test]
    async fn test_adapter_failure_fails_closed_when_configured() {
        let classifier = ScriptedClassifier {
            fail_topics: true,
            ..Default::default()
        };
        let config = EvaluatorConfig {
            topics_fail_mode: FailMode::Closed,
            ..Default::default()
        };
        let eval = evaluator(classifier, config);
        let decision = eval
            .evaluate("anything at all", EvaluationDirection::Input, &policy())
            .await;

        assert_eq!(decision.final_action, FinalAction::Blocked);
        assert!(decision.degraded);
        // The finding stays undetermined: fail-closed is not a match.
        assert_eq!(decision.topic_findings[0].outcome, TopicOutcome::Undetermined);
    }

    #[tokio::test]
    async fn test_clean_text_passes_everything() {
        let eval = evaluator(ScriptedClassifier::default(), EvaluatorConfig::default());
        let decision = eval
            .evaluate(
                "What are good destinations for traveling with kids?",
                EvaluationDirection::Input,
                &policy(),
            )
            .await;

        assert_eq!(decision.final_action, FinalAction::None);
        assert!(decision.redacted_text.is_none());
    }

    #[tokio::test]
    async fn test_redaction_is_idempotent_end_to_end() {
        // Real detector: redact once, re-evaluate the redacted text, and the
        // same rule finds nothing new.
        let eval = PolicyEvaluator::new(
            Arc::new(LexiconClassifier::new()),
            Arc::new(BuiltinWordLists::new()),
            EvaluatorConfig::default(),
        );

        let first = eval
            .evaluate(
                "I'm 17 years old, am I allowed to travel?",
                EvaluationDirection::Input,
                &policy(),
            )
            .await;
        assert_eq!(first.final_action, FinalAction::Anonymized);
        let redacted = first.redacted_text.unwrap();

        let second = eval
            .evaluate(&redacted, EvaluationDirection::Input, &policy())
            .await;
        assert_eq!(second.final_action, FinalAction::None);
        assert!(second.redacted_text.is_none());
    }
}
