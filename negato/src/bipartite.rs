//! Cross-token detection of bipartite negation.
//!
//! A regex can only pair "ne ... pas" when it also spells out everything in
//! between; it cannot express "opener and closer separated by any number of
//! intervening words". This detector works on tokens instead: it scans for an
//! opener ("ne", an elided "n'", or the split "n" + "'" pair), then walks
//! forward over non-punctuation tokens looking for a closer within the rule's
//! token-gap budget.
//!
//! Punctuation tokens do not count toward the gap, except the configured
//! hard-stop marks which abort the search for that opener. An opener that
//! never pairs still yields a single-particle cue (elliptical negation), and
//! every opener/closer boundary is consumed at most once.

use std::collections::HashSet;

use negato_core::{Cue, Token};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::rules::Rule;
use crate::text::SentenceText;
use crate::tokenize::{is_punct_token, DEFAULT_STOP_PUNCT};

static OPENER_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(?:ne|n'?)").expect("valid regex"));
static CLOSER_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:pas|plus|jamais|rien|personne|guère|guere|point|nul)")
        .expect("valid regex")
});

fn is_closer(token_lower: &str) -> bool {
    matches!(
        token_lower,
        "pas" | "plus" | "jamais" | "rien" | "personne" | "guère" | "point" | "nul"
    )
}

/// The opener particle of token `i`: its text and char span.
///
/// For a split elision (`"n"` followed by an apostrophe token) the two tokens
/// are merged on the fly; otherwise the particle is the `ne`/`n'` prefix of
/// the token itself.
fn opener_particle(tokens: &[Token], i: usize) -> (String, usize, usize) {
    let tok = &tokens[i];
    if tok.text.eq_ignore_ascii_case("n")
        && tokens.get(i + 1).is_some_and(|next| next.text == "'")
    {
        let apostrophe = &tokens[i + 1];
        return (format!("{}'", tok.text), tok.start, apostrophe.end);
    }
    match OPENER_PREFIX.find(&tok.text) {
        Some(m) => {
            let prefix_chars = tok.text[..m.end()].chars().count();
            (
                m.as_str().to_string(),
                tok.start,
                tok.start + prefix_chars,
            )
        }
        None => (tok.text.clone(), tok.start, tok.end),
    }
}

/// Detect bipartite cues whose particles sit in different tokens.
///
/// Only active when the rule declares `max_token_gap`. Running the detector
/// again over its own output is a no-op: the `(rule id, start, end)` triples
/// already present in `existing` are never re-emitted.
#[must_use]
pub fn detect_cross_tokens(
    _sent: &SentenceText,
    tokens: &[Token],
    existing: &[Cue],
    rule: &Rule,
) -> Vec<Cue> {
    let mut out: Vec<Cue> = Vec::new();
    let Some(max_gap) = rule.options.max_token_gap else {
        return out;
    };
    let stop_punct: &[String] = rule
        .options
        .stop_punct
        .as_deref()
        .unwrap_or(&DEFAULT_STOP_PUNCT);
    let existing_keys: HashSet<(String, usize, usize)> = existing
        .iter()
        .map(|c| (c.rule_id.clone(), c.start, c.end))
        .collect();
    let mut used_opener_pos: HashSet<usize> = HashSet::new();
    let mut used_closer_pos: HashSet<usize> = HashSet::new();

    for (i, tok) in tokens.iter().enumerate() {
        let t = tok.text.to_lowercase();
        let split_elision =
            t == "n" && tokens.get(i + 1).is_some_and(|next| next.text == "'");
        let is_opener = t == "ne" || t.starts_with("n'") || split_elision;
        if !is_opener {
            continue;
        }
        if used_opener_pos.contains(&tok.start) {
            continue;
        }

        let start_search = if split_elision { i + 2 } else { i + 1 };
        let mut gap = 0;
        let mut paired = false;
        for closer_tok in &tokens[start_search.min(tokens.len())..] {
            if is_punct_token(&closer_tok.text) {
                if stop_punct.iter().any(|p| p == &closer_tok.text) {
                    break;
                }
                continue;
            }
            gap += 1;
            if gap > max_gap {
                break;
            }
            let t2 = closer_tok.text.to_lowercase();
            if !is_closer(&t2) {
                continue;
            }
            if used_closer_pos.contains(&closer_tok.end) {
                break;
            }
            let key = (rule.id.clone(), tok.start, closer_tok.end);
            if !existing_keys.contains(&key) {
                let (opener_text, _, _) = opener_particle(tokens, i);
                let closer_text = CLOSER_PREFIX
                    .find(&closer_tok.text)
                    .map_or_else(|| closer_tok.text.clone(), |m| m.as_str().to_string());
                let label = format!("{} {}", opener_text, closer_text);
                out.push(Cue::new(
                    rule.id.clone(),
                    rule.group,
                    label.trim().to_string(),
                    tok.start,
                    closer_tok.end,
                ));
                used_opener_pos.insert(tok.start);
                used_closer_pos.insert(closer_tok.end);
            }
            paired = true;
            break;
        }

        if !paired {
            // Elliptical negation: the closer is implicit or out of reach.
            let (opener_text, p_start, p_end) = opener_particle(tokens, i);
            let key = (rule.id.clone(), p_start, p_end);
            if !existing_keys.contains(&key) {
                out.push(Cue::new(
                    rule.id.clone(),
                    rule.group,
                    opener_text,
                    p_start,
                    p_end,
                ));
            }
            used_opener_pos.insert(tok.start);
        }
    }
    out
}
