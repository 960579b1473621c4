//! Metric extraction from sealed traces.
//!
//! The extractor owns a validated set of `MetricRule`s and applies every
//! rule to every trace exactly once. It is a pure function of its rule set:
//! no hidden state, so replaying stored traces produces the same counters
//! as live processing.

use std::collections::{BTreeMap, HashSet};

use crate::domain::{
    MetricRule, PiiAction, PolicyDocument, Trace, TracePredicate,
};
use crate::error::{AegisError, AegisResult};

/// Applies registered metric rules to sealed traces.
#[derive(Debug, Default)]
pub struct MetricExtractor {
    rules: Vec<MetricRule>,
}

impl MetricExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an extractor from a rule set, rejecting the whole set on the
    /// first invalid or duplicate rule.
    pub fn with_rules(rules: Vec<MetricRule>) -> AegisResult<Self> {
        let mut extractor = Self::new();
        for rule in rules {
            extractor.register_rule(rule)?;
        }
        Ok(extractor)
    }

    /// Register one rule. Names are unique; the rule is validated before it
    /// can ever see a trace.
    pub fn register_rule(&mut self, rule: MetricRule) -> AegisResult<()> {
        rule.validate()?;
        if self.rules.iter().any(|r| r.name == rule.name) {
            return Err(AegisError::Policy(format!(
                "duplicate metric rule '{}'",
                rule.name
            )));
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Names of all registered counters, in registration order.
    pub fn rule_names(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.name.clone()).collect()
    }

    /// Evaluate every registered rule against one sealed trace.
    ///
    /// Returns an increment of 0 or 1 for every rule, including the zeros,
    /// so consumers see the full counter set each time.
    pub fn apply(&self, trace: &Trace) -> BTreeMap<String, u64> {
        self.rules
            .iter()
            .map(|rule| (rule.name.clone(), u64::from(rule.predicate.eval(trace))))
            .collect()
    }

    /// Sum increments over a batch of traces. The backfill path: applying
    /// this to stored traces reproduces live counters.
    pub fn replay<'a>(&self, traces: impl IntoIterator<Item = &'a Trace>) -> BTreeMap<String, u64> {
        let mut totals: BTreeMap<String, u64> = self
            .rules
            .iter()
            .map(|r| (r.name.clone(), 0))
            .collect();
        for trace in traces {
            for (name, increment) in self.apply(trace) {
                if let Some(total) = totals.get_mut(&name) {
                    *total += increment;
                }
            }
        }
        totals
    }
}

/// The policy-independent base rule set.
pub fn standard_rules() -> Vec<MetricRule> {
    vec![
        MetricRule::new("invocations", TracePredicate::Invoked),
        MetricRule::new("backend_invocations", TracePredicate::BackendInvoked),
        MetricRule::new(
            "input_blocked",
            TracePredicate::Blocked {
                direction: Some(crate::domain::EvaluationDirection::Input),
            },
        ),
        MetricRule::new(
            "output_blocked",
            TracePredicate::Blocked {
                direction: Some(crate::domain::EvaluationDirection::Output),
            },
        ),
        MetricRule::new(
            "messages_anonymized",
            TracePredicate::Anonymized { direction: None },
        ),
        MetricRule::new(
            "word_rule_hits",
            TracePredicate::WordMatched {
                phrase: None,
                direction: None,
            },
        ),
        MetricRule::new(
            "undetermined_checks",
            TracePredicate::Undetermined { direction: None },
        ),
    ]
}

/// Per-policy rules: one counter per denied topic, screened category, and
/// sensitive-information rule.
pub fn rules_for_policy(policy: &PolicyDocument) -> Vec<MetricRule> {
    let mut rules = Vec::new();

    for topic in &policy.denied_topics {
        rules.push(MetricRule::new(
            format!("topic_{}_denials", slug(&topic.name)),
            TracePredicate::TopicMatched {
                topic: topic.name.clone(),
                direction: None,
            },
        ));
    }

    let mut seen_categories = HashSet::new();
    for filter in &policy.content_filters {
        if seen_categories.insert(filter.category) {
            rules.push(MetricRule::new(
                format!("filter_{}_blocked", filter.category),
                TracePredicate::FilterBlocked {
                    category: filter.category,
                    direction: None,
                },
            ));
        }
    }

    for rule in &policy.sensitive_info_rules {
        let action_name = match rule.action {
            PiiAction::Block => "blocked",
            PiiAction::Anonymize => "anonymized",
        };
        rules.push(MetricRule::new(
            format!("pii_{}_{}", rule.entity_type, action_name),
            TracePredicate::PiiAction {
                entity_type: rule.entity_type,
                action: rule.action,
                direction: None,
            },
        ));
    }

    rules
}

fn slug(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
