//! Span redaction for anonymized sensitive information.
//!
//! Replaces detected spans with the fixed per-entity placeholder. The
//! placeholders match none of the detectors, so redacting already-redacted
//! text is a no-op.

use crate::classifier::PiiSpan;

/// Replace every span with its entity placeholder.
///
/// Overlapping spans are merged into the earlier one; replacement runs
/// back-to-front so earlier offsets stay valid.
pub fn redact(text: &str, spans: &[PiiSpan]) -> String {
    let mut ordered: Vec<&PiiSpan> = spans.iter().collect();
    ordered.sort_by_key(|s| (s.start, s.end));

    // Drop spans that overlap a predecessor.
    let mut kept: Vec<&PiiSpan> = Vec::with_capacity(ordered.len());
    for span in ordered {
        match kept.last() {
            Some(prev) if span.start < prev.end => {}
            _ => kept.push(span),
        }
    }

    let mut redacted = text.to_string();
    for span in kept.iter().rev() {
        redacted.replace_range(span.start..span.end, span.entity_type.placeholder());
    }
    redacted
}
