//! Safety policy domain types.
//!
//! A `PolicyDocument` is the versioned, immutable description of what the
//! gateway screens for: denied topics, content-category filters, word rules,
//! and sensitive-information rules. Documents are validated in full before
//! activation; a document that fails any invariant is rejected entirely.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{AegisError, AegisResult};

/// Action applied when a denied topic matches.
///
/// Single variant today. Modeled as an enum so documents keep their wire
/// format when further actions are introduced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TopicAction {
    /// Refuse to engage with the topic.
    #[default]
    Deny,
}

/// A topic the policy refuses to engage with.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TopicRule {
    /// Unique topic name within a document.
    pub name: String,
    /// Free-text description of the topic, handed to the classifier as context.
    pub definition: String,
    /// Sample utterances that should match this topic, in document order.
    #[serde(default)]
    pub examples: Vec<String>,
    /// Action to take on a match.
    #[serde(default)]
    pub action: TopicAction,
}

/// Harm categories the content filters can screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ContentCategory {
    /// Sexual content.
    Sexual,
    /// Violence and threats.
    Violence,
    /// Hate speech.
    Hate,
    /// Insults and harassment.
    Insults,
    /// Criminal or otherwise harmful misconduct.
    Misconduct,
    /// Prompt injection and jailbreak attempts.
    PromptAttack,
}

impl std::fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentCategory::Sexual => write!(f, "sexual"),
            ContentCategory::Violence => write!(f, "violence"),
            ContentCategory::Hate => write!(f, "hate"),
            ContentCategory::Insults => write!(f, "insults"),
            ContentCategory::Misconduct => write!(f, "misconduct"),
            ContentCategory::PromptAttack => write!(f, "prompt_attack"),
        }
    }
}

/// Filter sensitivity. Used both as the configured threshold of a rule and
/// as the severity a classifier reports for a piece of text.
///
/// Ordered: `None < Low < Medium < High`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum FilterStrength {
    /// Not screened / nothing detected.
    None,
    /// Low sensitivity or severity.
    Low,
    /// Medium sensitivity or severity.
    Medium,
    /// High sensitivity or severity.
    High,
}

impl std::fmt::Display for FilterStrength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterStrength::None => write!(f, "none"),
            FilterStrength::Low => write!(f, "low"),
            FilterStrength::Medium => write!(f, "medium"),
            FilterStrength::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for FilterStrength {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(FilterStrength::None),
            "low" => Ok(FilterStrength::Low),
            "medium" => Ok(FilterStrength::Medium),
            "high" => Ok(FilterStrength::High),
            _ => Err(format!("Unknown filter strength: {}", s)),
        }
    }
}

/// A content filter with independent thresholds per direction.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ContentFilterRule {
    /// Category this rule screens.
    pub category: ContentCategory,
    /// Threshold applied to user-supplied text.
    pub input_strength: FilterStrength,
    /// Threshold applied to model-generated text.
    pub output_strength: FilterStrength,
}

impl ContentFilterRule {
    /// The threshold that applies to the given direction.
    pub fn threshold(&self, direction: EvaluationDirection) -> FilterStrength {
        match direction {
            EvaluationDirection::Input => self.input_strength,
            EvaluationDirection::Output => self.output_strength,
        }
    }
}

/// Direction of an evaluation relative to the model backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationDirection {
    /// User-supplied text, before the backend is called.
    Input,
    /// Backend-generated text, before it is returned to the user.
    Output,
}

impl std::fmt::Display for EvaluationDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvaluationDirection::Input => write!(f, "input"),
            EvaluationDirection::Output => write!(f, "output"),
        }
    }
}

/// Identifier of a curated word list maintained outside the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ManagedListId {
    /// The built-in profanity list.
    Profanity,
}

impl std::fmt::Display for ManagedListId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManagedListId::Profanity => write!(f, "profanity"),
        }
    }
}

/// Word-level rules: explicit phrases plus managed lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct WordRules {
    /// Phrases blocked verbatim (matched case-insensitively).
    #[serde(default)]
    pub blocked_phrases: Vec<String>,
    /// Managed lists resolved at evaluation time.
    #[serde(default)]
    pub managed_lists: Vec<ManagedListId>,
}

/// Sensitive-information entity types the gateway can detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PiiEntityType {
    /// A person's age.
    Age,
    /// Email address.
    Email,
    /// Phone number.
    Phone,
    /// Person name.
    Name,
    /// Postal address.
    Address,
    /// Credit card number.
    CreditCardNumber,
    /// IP address.
    IpAddress,
}

impl PiiEntityType {
    /// Placeholder substituted for anonymized spans of this type.
    ///
    /// Placeholders contain no digits, so running the detectors over
    /// already-redacted text finds nothing new.
    pub fn placeholder(&self) -> &'static str {
        match self {
            PiiEntityType::Age => "{AGE}",
            PiiEntityType::Email => "{EMAIL}",
            PiiEntityType::Phone => "{PHONE}",
            PiiEntityType::Name => "{NAME}",
            PiiEntityType::Address => "{ADDRESS}",
            PiiEntityType::CreditCardNumber => "{CREDIT_CARD_NUMBER}",
            PiiEntityType::IpAddress => "{IP_ADDRESS}",
        }
    }
}

impl std::fmt::Display for PiiEntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PiiEntityType::Age => write!(f, "age"),
            PiiEntityType::Email => write!(f, "email"),
            PiiEntityType::Phone => write!(f, "phone"),
            PiiEntityType::Name => write!(f, "name"),
            PiiEntityType::Address => write!(f, "address"),
            PiiEntityType::CreditCardNumber => write!(f, "credit_card_number"),
            PiiEntityType::IpAddress => write!(f, "ip_address"),
        }
    }
}

/// Action applied to a detected sensitive-information span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PiiAction {
    /// Block the whole message.
    Block,
    /// Replace the span with a fixed placeholder.
    Anonymize,
}

/// A sensitive-information rule. At most one per entity type.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PiiRule {
    /// Entity type this rule covers.
    pub entity_type: PiiEntityType,
    /// What to do when a span of this type is detected.
    pub action: PiiAction,
}

/// The versioned safety policy applied to every request.
///
/// Immutable once activated: updates produce a new version and swap the
/// whole document, so an in-flight evaluation never observes a mix of two
/// versions.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PolicyDocument {
    /// Stable identifier of this policy.
    pub id: String,
    /// Monotonically increasing version.
    pub version: u32,
    /// Topics the gateway refuses to engage with.
    #[serde(default)]
    pub denied_topics: Vec<TopicRule>,
    /// Content-category filters.
    #[serde(default)]
    pub content_filters: Vec<ContentFilterRule>,
    /// Word-level rules.
    #[serde(default)]
    pub word_rules: WordRules,
    /// Sensitive-information rules.
    #[serde(default)]
    pub sensitive_info_rules: Vec<PiiRule>,
    /// Fixed message returned when the input side blocks.
    pub blocked_input_message: String,
    /// Fixed message returned when the output side blocks.
    pub blocked_output_message: String,
}

impl PolicyDocument {
    /// Check every document invariant.
    ///
    /// Returns the first violation found; a failing document must never be
    /// activated, not even partially.
    pub fn validate(&self) -> AegisResult<()> {
        if self.id.trim().is_empty() {
            return Err(AegisError::Policy("policy id must not be empty".to_string()));
        }

        let mut topic_names = HashSet::new();
        for topic in &self.denied_topics {
            if topic.name.trim().is_empty() {
                return Err(AegisError::Policy("topic name must not be empty".to_string()));
            }
            if !topic_names.insert(topic.name.as_str()) {
                return Err(AegisError::Policy(format!(
                    "duplicate denied topic '{}'",
                    topic.name
                )));
            }
        }

        let mut categories = HashSet::new();
        for filter in &self.content_filters {
            if !categories.insert(filter.category) {
                return Err(AegisError::Policy(format!(
                    "duplicate content filter for category '{}'",
                    filter.category
                )));
            }
            // A filter that screens neither direction is a configuration
            // mistake, not a no-op.
            if filter.input_strength == FilterStrength::None
                && filter.output_strength == FilterStrength::None
            {
                return Err(AegisError::Policy(format!(
                    "content filter for '{}' is inert: both strengths are none",
                    filter.category
                )));
            }
        }

        let mut entities = HashSet::new();
        for rule in &self.sensitive_info_rules {
            if !entities.insert(rule.entity_type) {
                return Err(AegisError::Policy(format!(
                    "duplicate sensitive-information rule for entity '{}'",
                    rule.entity_type
                )));
            }
        }

        for phrase in &self.word_rules.blocked_phrases {
            if phrase.trim().is_empty() {
                return Err(AegisError::Policy(
                    "blocked phrases must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Parse and validate a document from JSON.
    pub fn from_json(json: &str) -> AegisResult<Self> {
        let document: PolicyDocument = serde_json::from_str(json)?;
        document.validate()?;
        Ok(document)
    }

    /// Load and validate a document from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> AegisResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            AegisError::Policy(format!("cannot read policy file {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Look up the sensitive-information rule for an entity type.
    pub fn pii_rule(&self, entity_type: PiiEntityType) -> Option<&PiiRule> {
        self.sensitive_info_rules
            .iter()
            .find(|r| r.entity_type == entity_type)
    }
}
