//! Word-rule matching.
//!
//! The one check the engine performs itself: case-insensitive scanning of
//! the text against the document's blocked phrases and against managed
//! lists. Managed lists are curated outside the policy document and reach
//! the engine through the `ManagedListResolver` seam.

use crate::domain::{ManagedListId, WordFinding, WordRules, WordSource};

/// Supplies the resolved phrase set for a managed list.
pub trait ManagedListResolver: Send + Sync {
    /// The phrases of the given list. Resolution is in-memory and
    /// infallible; unknown list ids cannot exist past document parsing.
    fn resolve(&self, list: ManagedListId) -> &[String];
}

/// The built-in managed lists.
pub struct BuiltinWordLists {
    profanity: Vec<String>,
}

impl BuiltinWordLists {
    pub fn new() -> Self {
        Self {
            profanity: [
                "damn", "dammit", "bastard", "bloody hell", "bullshit", "crap", "piss off",
                "screw you",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl Default for BuiltinWordLists {
    fn default() -> Self {
        Self::new()
    }
}

impl ManagedListResolver for BuiltinWordLists {
    fn resolve(&self, list: ManagedListId) -> &[String] {
        match list {
            ManagedListId::Profanity => &self.profanity,
        }
    }
}

/// Check if text contains any of the given phrases (case-insensitive),
/// returning each phrase that matched.
fn contains_any<'a>(text_lower: &str, phrases: &'a [String]) -> Vec<&'a String> {
    phrases
        .iter()
        .filter(|p| text_lower.contains(&p.to_lowercase()))
        .collect()
}

/// Scan `text` against the document's word rules. Every match is returned;
/// any match blocks.
pub fn find_word_matches(
    text: &str,
    rules: &WordRules,
    resolver: &dyn ManagedListResolver,
) -> Vec<WordFinding> {
    let text_lower = text.to_lowercase();
    let mut findings = Vec::new();

    for phrase in contains_any(&text_lower, &rules.blocked_phrases) {
        findings.push(WordFinding {
            phrase: phrase.clone(),
            source: WordSource::Custom,
        });
    }

    for list in &rules.managed_lists {
        for phrase in contains_any(&text_lower, resolver.resolve(*list)) {
            findings.push(WordFinding {
                phrase: phrase.clone(),
                source: WordSource::ManagedList(*list),
            });
        }
    }

    findings
}
