//! Active policy storage with atomic activation.
//!
//! Evaluations snapshot the active document as an `Arc`, so an in-flight
//! request sees exactly one version from start to finish. Activation
//! validates the whole document first and then swaps the reference; there is
//! no partial application and no in-place mutation.

use std::sync::{Arc, PoisonError, RwLock};

use crate::domain::PolicyDocument;
use crate::error::{AegisError, AegisResult};

/// Holds the currently active policy document.
pub struct PolicyStore {
    active: RwLock<Arc<PolicyDocument>>,
}

impl PolicyStore {
    /// Create a store with a validated initial document.
    pub fn new(initial: PolicyDocument) -> AegisResult<Self> {
        initial.validate()?;
        Ok(Self {
            active: RwLock::new(Arc::new(initial)),
        })
    }

    /// Snapshot the active document.
    pub fn active(&self) -> Arc<PolicyDocument> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Validate and activate a new document. All-or-nothing: a failing
    /// document leaves the current one untouched. Re-activating the same
    /// policy id requires a strictly newer version.
    pub fn activate(&self, document: PolicyDocument) -> AegisResult<()> {
        document.validate()?;

        let mut guard = self.active.write().unwrap_or_else(PoisonError::into_inner);
        if guard.id == document.id && document.version <= guard.version {
            return Err(AegisError::Policy(format!(
                "policy '{}' version {} is not newer than active version {}",
                document.id, document.version, guard.version
            )));
        }

        tracing::info!(
            policy_id = %document.id,
            version = document.version,
            previous_version = guard.version,
            "Policy activated"
        );
        *guard = Arc::new(document);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContentCategory, ContentFilterRule, FilterStrength, WordRules};

    fn document(version: u32) -> PolicyDocument {
        PolicyDocument {
            id: "p1".to_string(),
            version,
            denied_topics: Vec::new(),
            content_filters: Vec::new(),
            word_rules: WordRules::default(),
            sensitive_info_rules: Vec::new(),
            blocked_input_message: "no".to_string(),
            blocked_output_message: "no".to_string(),
        }
    }

    #[test]
    fn test_activate_newer_version() {
        let store = PolicyStore::new(document(1)).unwrap();
        store.activate(document(2)).unwrap();
        assert_eq!(store.active().version, 2);
    }

    #[test]
    fn test_stale_version_rejected() {
        let store = PolicyStore::new(document(2)).unwrap();
        assert!(store.activate(document(2)).is_err());
        assert!(store.activate(document(1)).is_err());
        assert_eq!(store.active().version, 2);
    }

    #[test]
    fn test_invalid_document_leaves_active_untouched() {
        let store = PolicyStore::new(document(1)).unwrap();

        let mut bad = document(2);
        bad.content_filters = vec![ContentFilterRule {
            category: ContentCategory::Hate,
            input_strength: FilterStrength::None,
            output_strength: FilterStrength::None,
        }];

        assert!(store.activate(bad).is_err());
        assert_eq!(store.active().version, 1);
    }

    #[test]
    fn test_snapshot_survives_swap() {
        let store = PolicyStore::new(document(1)).unwrap();
        let snapshot = store.active();
        store.activate(document(2)).unwrap();

        // The earlier snapshot still sees version 1 in full.
        assert_eq!(snapshot.version, 1);
        assert_eq!(store.active().version, 2);
    }
}
