//! Sentence text with byte/char offset reconciliation.
//!
//! Two facts collide here:
//!
//! 1. The regex engine reports **byte** offsets.
//! 2. Every record this crate emits carries **character** offsets, because
//!    the corpus is French and `é`, `’`, `«` are multi-byte.
//!
//! On top of that, typographic apostrophes (`’`, `‘`) are normalized to the
//! ASCII apostrophe *before* any matching, so that rule patterns written with
//! `'` hit both spellings. Normalization is 1 char → 1 char and therefore
//! never shifts character offsets: a span computed on the normalized text is
//! valid in the original.
//!
//! [`SentenceText`] owns both renditions plus the conversion tables, and is
//! built once per sentence.

/// A sentence prepared for matching: original text, apostrophe-normalized
/// text, and byte↔char conversion tables for the normalized rendition.
#[derive(Debug, Clone)]
pub struct SentenceText {
    original: String,
    normalized: String,
    /// Char index for every byte offset of `normalized` (length + 1 entries).
    char_at_byte: Vec<usize>,
    /// Byte offset for every char index of `normalized` (char count + 1).
    byte_at_char: Vec<usize>,
}

/// Replace typographic apostrophe variants with the ASCII apostrophe.
#[must_use]
pub fn normalize_apostrophes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2019}' | '\u{2018}' => '\'',
            c => c,
        })
        .collect()
}

impl SentenceText {
    /// Prepare a sentence for annotation.
    #[must_use]
    pub fn new(original: &str) -> Self {
        let normalized = normalize_apostrophes(original);
        let mut char_at_byte = vec![0usize; normalized.len() + 1];
        let mut byte_at_char = Vec::with_capacity(normalized.len() + 1);
        let mut char_idx = 0;
        for (byte, ch) in normalized.char_indices() {
            byte_at_char.push(byte);
            for k in 0..ch.len_utf8() {
                char_at_byte[byte + k] = char_idx;
            }
            char_idx += 1;
        }
        byte_at_char.push(normalized.len());
        char_at_byte[normalized.len()] = char_idx;
        Self {
            original: original.to_string(),
            normalized,
            char_at_byte,
            byte_at_char,
        }
    }

    /// The sentence as received.
    #[must_use]
    pub fn original(&self) -> &str {
        &self.original
    }

    /// The apostrophe-normalized sentence all matching runs against.
    #[must_use]
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Sentence length in characters.
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.byte_at_char.len() - 1
    }

    /// Convert a byte offset of the normalized text to a char offset.
    ///
    /// Offsets past the end clamp to the char length.
    #[must_use]
    pub fn byte_to_char(&self, byte: usize) -> usize {
        let byte = byte.min(self.normalized.len());
        self.char_at_byte[byte]
    }

    /// Convert a char offset to a byte offset of the normalized text.
    #[must_use]
    pub fn char_to_byte(&self, ch: usize) -> usize {
        let ch = ch.min(self.char_len());
        self.byte_at_char[ch]
    }

    /// Slice the normalized text by char offsets.
    #[must_use]
    pub fn slice(&self, start: usize, end: usize) -> &str {
        let a = self.char_to_byte(start);
        let b = self.char_to_byte(end.max(start));
        &self.normalized[a..b]
    }
}
