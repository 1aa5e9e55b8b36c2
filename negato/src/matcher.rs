//! Marker matching: one compiled rule applied to one sentence.
//!
//! Matches run left-to-right over the normalized sentence. Each candidate
//! match passes a guard check (a symmetric character window around the
//! match), then gets a label. Two label policies exist:
//!
//! - template rendering from the rule's `cue_label` candidates, first
//!   non-empty wins, raw match as fallback;
//! - particles-only extraction, where the label is rebuilt from the negation
//!   particles inside the match and interposed verbs are dropped. Bipartite
//!   rules always use this policy.
//!
//! Across a whole sentence no two cues may share a match start; the
//! [`SentenceContext`] carries that invariant explicitly and rule order is
//! the only tie-break.

use std::collections::HashSet;

use log::debug;
use negato_core::{CharSpan, Cue, Group};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::rules::Rule;
use crate::text::SentenceText;
use crate::tokenize::normalize_spaces;

/// Characters inspected on each side of a match during guard checks.
const GUARD_MARGIN: usize = 40;

/// Search window used when re-locating a normalized label in the sentence.
const RELOCATE_WINDOW: usize = 50;

// ============================================================================
// Per-sentence context
// ============================================================================

/// Mutable per-sentence matching state.
///
/// Owns the claimed match-start set backing the "no two cues share a start"
/// invariant. Created fresh for every sentence; nothing in it survives an
/// annotation call.
#[derive(Debug, Default)]
pub struct SentenceContext {
    claimed_starts: HashSet<usize>,
}

impl SentenceContext {
    /// True when a cue already claimed this start offset.
    #[must_use]
    pub fn is_claimed(&self, start: usize) -> bool {
        self.claimed_starts.contains(&start)
    }

    /// Claim a start offset for an emitted cue.
    pub fn claim(&mut self, start: usize) {
        self.claimed_starts.insert(start);
    }

    /// Claim the cue's start if free; returns whether the cue may be kept.
    pub fn try_claim(&mut self, start: usize) -> bool {
        self.claimed_starts.insert(start)
    }
}

// ============================================================================
// Particle extraction
// ============================================================================

static BIPARTITE_IN_MATCH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\bne\b|n').*?\b(?:pas|plus|jamais|rien|personne|guère|point|nul)\b")
        .expect("valid regex")
});
static OPENER_IN_MATCH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:\bne\b|n')").expect("valid regex"));
static CLOSER_IN_MATCH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:pas|plus|jamais|rien|personne|guère|point|nul)\b")
        .expect("valid regex")
});
static ELIDED_OPENER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^n'").expect("valid regex"));

/// Single-particle catalogue, attempted in this order.
static SINGLE_PARTICLES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(?:\bne\b|n')",
        r"(?i)\bpas\b",
        r"(?i)\bplus\b",
        r"(?i)\bjamais\b",
        r"(?i)\brien\b",
        r"(?i)\bpersonne\b",
        r"(?i)\bguère\b",
        r"(?i)\bpoint\b",
        r"(?i)\bnul\b",
        r"(?i)\b(?:aucun|aucune)\b",
        r"(?i)\bsans\b",
        r"(?i)\bni\b",
        r"(?i)\bnon\b",
        r"(?i)\babsence\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

fn char_count(s: &str, byte: usize) -> usize {
    s[..byte].chars().count()
}

/// Reduce a raw match to its negation particles.
///
/// When both an opener and a closer are present inside the match, the label
/// keeps both particles and the span runs from the opener's start to the
/// closer's end. A single catalogue hit yields a single-particle cue. With no
/// hit at all the raw match is used verbatim.
#[must_use]
pub fn extract_particles(match_text: &str, match_start: usize) -> (String, usize, usize) {
    if BIPARTITE_IN_MATCH.is_match(match_text) {
        if let Some(opener) = OPENER_IN_MATCH.find(match_text) {
            // The closer must sit after the opener, not just anywhere in the
            // match.
            let closer = CLOSER_IN_MATCH
                .find(&match_text[opener.end()..])
                .map(|m| (opener.end() + m.start(), opener.end() + m.end()));
            if let Some((closer_start, closer_end)) = closer {
                let opener_text = match ELIDED_OPENER.find(opener.as_str()) {
                    Some(elided) => elided.as_str(),
                    None => opener.as_str(),
                };
                let label = format!(
                    "{} {}",
                    opener_text,
                    &match_text[closer_start..closer_end]
                );
                let start = match_start + char_count(match_text, opener.start());
                let end = match_start + char_count(match_text, closer_end);
                return (label, start, end);
            }
        }
    }
    for particle in SINGLE_PARTICLES.iter() {
        if let Some(m) = particle.find(match_text) {
            let start = match_start + char_count(match_text, m.start());
            let end = match_start + char_count(match_text, m.end());
            return (m.as_str().to_string(), start, end);
        }
    }
    (
        match_text.to_string(),
        match_start,
        match_start + match_text.chars().count(),
    )
}

// ============================================================================
// Label templates
// ============================================================================

static TEMPLATE_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"));

/// Render label templates against named capture groups.
///
/// Each candidate is tried in order; the first one that renders to a
/// non-empty string wins. `None` means the caller should fall back to the
/// raw match.
#[must_use]
pub fn render_label(templates: &[String], caps: &Captures<'_>) -> Option<String> {
    for template in templates {
        let rendered = TEMPLATE_VAR.replace_all(template, |var: &Captures<'_>| {
            caps.name(&var[1]).map_or("", |m| m.as_str()).to_string()
        });
        let rendered = rendered.trim();
        if !rendered.is_empty() {
            return Some(rendered.to_string());
        }
    }
    None
}

// ============================================================================
// Offset reconciliation
// ============================================================================

/// Locate `needle` in the sentence near `approx_start`, searching rightward
/// within a bounded window, case-insensitively.
///
/// When the needle cannot be found the approximate span
/// `[approx_start, approx_start + needle chars)` is returned; degraded
/// offsets beat a failed sentence.
#[must_use]
pub fn locate_near(sent: &SentenceText, needle: &str, approx_start: usize) -> CharSpan {
    let needle_chars = needle.chars().count();
    let window_end = (approx_start + needle_chars + RELOCATE_WINDOW).min(sent.char_len());
    let window = sent.slice(approx_start, window_end);
    let pattern = format!("(?i){}", regex::escape(needle));
    if let Ok(rx) = Regex::new(&pattern) {
        if let Some(m) = rx.find(window) {
            let start = approx_start + char_count(window, m.start());
            let end = approx_start + char_count(window, m.end());
            return CharSpan::new(start, end);
        }
    }
    let end = (approx_start + needle_chars).min(sent.char_len());
    CharSpan::new(approx_start, end.max(approx_start))
}

// ============================================================================
// Guard check
// ============================================================================

/// True when any guard pattern matches inside the window around a match.
#[must_use]
pub fn guard_hits(rule: &Rule, sent: &SentenceText, start: usize, end: usize) -> bool {
    if rule.guards.is_empty() {
        return false;
    }
    let a = start.saturating_sub(GUARD_MARGIN);
    let b = (end + GUARD_MARGIN).min(sent.char_len());
    let window = sent.slice(a, b);
    rule.guards.iter().any(|g| g.is_match(window))
}

// ============================================================================
// Rule application
// ============================================================================

/// Apply one compiled rule to a sentence, yielding zero or more cues.
///
/// Quality-control rules are skipped outright. A match whose start is
/// already claimed is suppressed (first writer wins); a guard hit discards
/// the match without claiming its start.
#[must_use]
pub fn apply_rule(rule: &Rule, sent: &SentenceText, ctx: &mut SentenceContext) -> Vec<Cue> {
    let mut out = Vec::new();
    if rule.deferred {
        return out;
    }
    let Some(pattern) = rule.pattern.as_ref() else {
        return out;
    };
    let text = sent.normalized();
    for caps in pattern.captures_iter(text) {
        let Some(m) = caps.get(0) else { continue };
        let match_start = sent.byte_to_char(m.start());
        let match_end = sent.byte_to_char(m.end());
        if match_start >= match_end {
            continue;
        }
        if ctx.is_claimed(match_start) {
            debug!(
                "rule {}: match at {} suppressed, start already claimed",
                rule.id, match_start
            );
            continue;
        }
        if guard_hits(rule, sent, match_start, match_end) {
            debug!("rule {}: match at {} removed by guard", rule.id, match_start);
            continue;
        }
        let particles_only = rule.options.exclude_verbs_from_cue || rule.group == Group::Bipartite;
        let (label, start, end) = if particles_only {
            extract_particles(m.as_str(), match_start)
        } else {
            match render_label(&rule.labels, &caps) {
                Some(label) => {
                    let normalized = normalize_spaces(&label);
                    if normalized == m.as_str() {
                        (normalized, match_start, match_end)
                    } else {
                        // A canonical label that differs from the surface
                        // match still needs real offsets.
                        let span = locate_near(sent, &normalized, match_start);
                        (normalized, span.start, span.end)
                    }
                }
                None => (m.as_str().to_string(), match_start, match_end),
            }
        };
        ctx.claim(match_start);
        if start != match_start {
            ctx.claim(start);
        }
        out.push(Cue::new(rule.id.clone(), rule.group, label, start, end));
    }
    out
}

// ============================================================================
// Deterministic surface markers
// ============================================================================

static MALGRE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bmalgré\b").expect("valid regex"));

/// Inject the fixed surface markers that are detected without any rule.
///
/// Currently the concessive preposition "malgré", which downstream
/// strategies treat as a support anchor.
#[must_use]
pub fn inject_surface_markers(sent: &SentenceText, ctx: &mut SentenceContext) -> Vec<Cue> {
    let mut out = Vec::new();
    for m in MALGRE.find_iter(sent.normalized()) {
        let start = sent.byte_to_char(m.start());
        let end = sent.byte_to_char(m.end());
        if !ctx.try_claim(start) {
            continue;
        }
        out.push(Cue::new(
            "PREP_MALGRÉ",
            Group::Preposition,
            m.as_str().to_lowercase(),
            start,
            end,
        ));
    }
    out
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn extract_particles_spans_are_ordered(text in ".{0,60}", start in 0usize..100) {
            let (_, a, b) = extract_particles(&text, start);
            prop_assert!(a <= b);
            prop_assert!(a >= start);
        }

        #[test]
        fn locate_near_never_panics(text in ".{0,80}", needle in ".{0,12}", approx in 0usize..100) {
            let sent = SentenceText::new(&text);
            let span = locate_near(&sent, &needle, approx.min(sent.char_len()));
            prop_assert!(span.start <= span.end || needle.is_empty());
        }
    }
}
