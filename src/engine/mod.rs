//! Policy evaluation engine for Aegis Core.
//!
//! - Evaluator: runs every policy check against one text in one direction
//! - Words: case-insensitive phrase and managed-list matching
//! - Redaction: placeholder substitution for anonymized spans
//! - Policy store: atomic activation of validated documents

mod evaluator;
mod policy_store;
mod redaction;
mod words;

pub use evaluator::{EvaluatorConfig, FailMode, PolicyEvaluator};
pub use policy_store::PolicyStore;
pub use redaction::redact;
pub use words::{find_word_matches, BuiltinWordLists, ManagedListResolver};
