//! Classifier adapters.
//!
//! The evaluation engine never inspects text itself beyond word rules; topic
//! matching, content-category severity, and sensitive-information detection
//! are capabilities behind the `Classifier` trait. Implementations range
//! from the offline lexicon matcher to a remote LLM-backed classifier, and
//! tests inject scripted fakes.
//!
//! By contract these calls may be slow and may fail. The engine wraps every
//! call in a timeout and turns any failure into an `Undetermined` finding;
//! an adapter error is never a match and never a crash.

mod lexicon;
mod remote;

pub use lexicon::LexiconClassifier;
pub use remote::{RemoteClassifier, RemoteClassifierConfig};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{ContentCategory, FilterStrength, PiiEntityType, TopicRule};

/// Failure of a single classifier call.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The call did not complete within the configured time limit.
    #[error("classifier call timed out after {0}s")]
    Timeout(u64),

    /// Transport-level failure.
    #[error("classifier request failed: {0}")]
    Http(String),

    /// The adapter answered, but not in a shape we can use.
    #[error("malformed classifier response: {0}")]
    Malformed(String),
}

/// A detected sensitive-information span. Byte offsets into the evaluated
/// text, `start..end` exclusive, always on character boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PiiSpan {
    pub entity_type: PiiEntityType,
    pub start: usize,
    pub end: usize,
}

/// Capability boundary for text classification.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Decide whether `text` falls under the described topic.
    async fn classify_topic(&self, text: &str, topic: &TopicRule) -> Result<bool, AdapterError>;

    /// Report the severity of `text` for one content category.
    async fn classify_content(
        &self,
        text: &str,
        category: ContentCategory,
    ) -> Result<FilterStrength, AdapterError>;

    /// Detect sensitive-information spans in `text`.
    async fn detect_pii(&self, text: &str) -> Result<Vec<PiiSpan>, AdapterError>;
}
