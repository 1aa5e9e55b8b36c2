//! Final scope pass: appositive trimming and deduplication.
//!
//! Scope windows tend to run into trailing attribution material ("..., selon
//! le radiologue"): that tail belongs to a support span, not to the negated
//! content, so it is cut off here. Support-role scopes pass through
//! untouched. The pass is idempotent: running it over its own output changes
//! nothing.

use negato_core::{CharSpan, Scope, ScopeRole};

use crate::text::SentenceText;

/// Attribution connectives that open an appositive tail, in match priority
/// order.
const APPOSITIVE_MARKERS: &[&str] = &[
    ", selon",
    ", d'après",
    ", d'\u{2009}après",
    ", conformément à",
    ", au regard de",
    ", en accord avec",
];

/// Overlap fraction of two intervals: intersection length over envelope
/// length. 0.0 for disjoint or empty inputs.
#[must_use]
pub fn overlap_fraction(a: CharSpan, b: CharSpan) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let inter = a.end.min(b.end).saturating_sub(a.start.max(b.start));
    let envelope = a.end.max(b.end) - a.start.min(b.start);
    if envelope == 0 {
        return 0.0;
    }
    inter as f64 / envelope as f64
}

/// Truncate a scope at the first appositive connective it contains.
#[must_use]
pub fn trim_appositions(sent: &SentenceText, mut scope: Scope) -> Scope {
    let Some(span) = scope.span else {
        return scope;
    };
    let tail = sent.slice(span.start, span.end).to_lowercase();
    for marker in APPOSITIVE_MARKERS {
        if let Some(byte_idx) = tail.find(marker) {
            let cut_chars = tail[..byte_idx].chars().count();
            let mut end = span.start + cut_chars;
            // Drop whitespace left dangling by the cut.
            while end > span.start
                && sent
                    .slice(end - 1, end)
                    .chars()
                    .all(char::is_whitespace)
            {
                end -= 1;
            }
            scope.span = Some(CharSpan::new(span.start, end));
            scope.text = sent.slice(span.start, end).to_string();
            break;
        }
    }
    scope
}

/// Remove duplicate scopes by `(id, start, end, role)`, keeping first-seen
/// order.
#[must_use]
pub fn dedup(scopes: Vec<Scope>) -> Vec<Scope> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(scopes.len());
    for scope in scopes {
        let key = {
            let (id, start, end, role) = scope.dedup_key();
            (id.to_string(), start, end, role)
        };
        if seen.insert(key) {
            out.push(scope);
        }
    }
    out
}

/// The resolver: trim every non-support scope with a valid span, then dedup.
#[must_use]
pub fn finalize(scopes: Vec<Scope>, sent: &SentenceText) -> Vec<Scope> {
    let trimmed = scopes
        .into_iter()
        .map(|scope| {
            if scope.role == Some(ScopeRole::Support) {
                scope
            } else {
                trim_appositions(sent, scope)
            }
        })
        .collect();
    dedup(trimmed)
}
