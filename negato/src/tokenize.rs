//! Tokenizer and token-window primitives.
//!
//! Splitting is two-staged: whitespace first, then each chunk is re-split at
//! punctuation boundaries so that punctuation marks always form their own
//! token. Offsets are character offsets into the apostrophe-normalized
//! sentence (see [`crate::text`]); the same input always yields the same
//! tokens.

use negato_core::{CharSpan, Token};
use once_cell::sync::Lazy;
use regex::Regex;

/// Punctuation characters that form standalone tokens.
pub const PUNCT_CHARS: &[char] = &[
    ',', ';', ':', '!', '?', '.', '(', ')', '[', ']', '{', '}', '«', '»', '\u{201C}', '\u{201D}',
    '"', '\'',
];

/// Punctuation tokens that terminate a rightward token window by default.
pub static DEFAULT_STOP_PUNCT: Lazy<Vec<String>> = Lazy::new(|| {
    [",", ";", ":", ".", "!", "?"]
        .iter()
        .map(|s| s.to_string())
        .collect()
});

/// Concessive connectives that terminate a rightward token window by default.
pub static DEFAULT_STOP_LEXEMES: Lazy<Vec<String>> = Lazy::new(|| {
    ["malgré", "mais", "cependant", "pourtant", "toutefois", "néanmoins"]
        .iter()
        .map(|s| s.to_string())
        .collect()
});

static LEADING_DE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:de|d')\s+").expect("valid regex"));

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// True when `c` is a standalone-token punctuation character.
#[must_use]
pub fn is_punct_char(c: char) -> bool {
    PUNCT_CHARS.contains(&c)
}

/// True when a token is a punctuation token (its first char is punctuation).
#[must_use]
pub fn is_punct_token(token: &str) -> bool {
    token.chars().next().is_some_and(is_punct_char)
}

/// Split a sentence into tokens with character offsets.
///
/// `text` must already be apostrophe-normalized; pass
/// [`crate::text::SentenceText::normalized`].
#[must_use]
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word_start: Option<usize> = None;
    let mut word = String::new();
    let flush = |start: Option<usize>, word: &mut String, tokens: &mut Vec<Token>| {
        if let Some(s) = start {
            if !word.is_empty() {
                let end = s + word.chars().count();
                tokens.push(Token::new(word.clone(), s, end));
                word.clear();
            }
        }
    };
    for (idx, c) in text.chars().enumerate() {
        if c.is_whitespace() {
            flush(word_start.take(), &mut word, &mut tokens);
        } else if is_punct_char(c) {
            flush(word_start.take(), &mut word, &mut tokens);
            tokens.push(Token::new(c.to_string(), idx, idx + 1));
        } else {
            if word_start.is_none() {
                word_start = Some(idx);
            }
            word.push(c);
        }
    }
    flush(word_start.take(), &mut word, &mut tokens);
    tokens
}

/// Collect consecutive tokens rightward from `start_char`.
///
/// Collection halts (stop token excluded) at the first stop-punctuation
/// token, the first stop lexeme, or after `max_tokens` tokens. Returns `None`
/// when nothing was collected.
#[must_use]
pub fn window_right(
    tokens: &[Token],
    start_char: usize,
    max_tokens: usize,
    stop_punct: &[String],
    stop_lexemes: &[String],
) -> Option<CharSpan> {
    let mut collected: Option<CharSpan> = None;
    let mut count = 0;
    for tok in tokens {
        if tok.start < start_char {
            continue;
        }
        if stop_punct.iter().any(|p| p == &tok.text) {
            break;
        }
        let lower = tok.text.to_lowercase();
        if stop_lexemes.iter().any(|w| w.to_lowercase() == lower) {
            break;
        }
        collected = Some(match collected {
            None => CharSpan::new(tok.start, tok.end),
            Some(span) => CharSpan::new(span.start, tok.end),
        });
        count += 1;
        if count >= max_tokens {
            break;
        }
    }
    collected
}

/// Char count of a leading "de " / "d' " prefix, 0 when absent.
///
/// Used to pull a scope window forward past the partitive article so the
/// recorded span still matches the scope text exactly.
#[must_use]
pub fn leading_de_offset(span: &str) -> usize {
    LEADING_DE
        .find(span)
        .map(|m| span[..m.end()].chars().count())
        .unwrap_or(0)
}

/// Collapse whitespace runs, trim, and normalize apostrophes.
#[must_use]
pub fn normalize_spaces(s: &str) -> String {
    let collapsed = WHITESPACE_RUN.replace_all(s.trim(), " ");
    crate::text::normalize_apostrophes(&collapsed)
}
