//! Sentence segmentation
//!
//! Splits cleaned document text into sentence-like units. Units shorter than
//! the configured minimum are treated as fragments (page numbers, headings)
//! and dropped.

use serde::{Deserialize, Serialize};

/// A trimmed sentence-like span of source text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextUnit {
    /// Position among the units kept for this document.
    pub index: usize,
    /// Trimmed text, original casing.
    pub text: String,
    /// Length of `text` in chars.
    pub trimmed_len: usize,
}

impl TextUnit {
    pub fn new(index: usize, text: &str) -> Self {
        let text = text.trim();
        Self {
            index,
            text: text.to_string(),
            trimmed_len: text.chars().count(),
        }
    }

    /// Lower-cased text, used for matching.
    pub fn folded(&self) -> String {
        self.text.to_lowercase()
    }
}

/// Sentence splitter with a minimum unit length
#[derive(Debug, Clone, Copy)]
pub struct Segmenter {
    min_chars: usize,
}

impl Segmenter {
    pub fn new(min_chars: usize) -> Self {
        Self { min_chars }
    }

    pub fn min_chars(&self) -> usize {
        self.min_chars
    }

    /// Split on `.`, `!`, `?`; a run of terminators counts as one delimiter.
    pub fn segment(&self, text: &str) -> Vec<TextUnit> {
        let mut units = Vec::new();
        for piece in text.split(is_terminator) {
            let trimmed = piece.trim();
            // Empty pieces between consecutive terminators fall out here too.
            if trimmed.is_empty() || trimmed.chars().count() < self.min_chars {
                continue;
            }
            units.push(TextUnit::new(units.len(), trimmed));
        }
        units
    }
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Segment `text`, keeping units of at least `min_chars` chars.
pub fn segment(text: &str, min_chars: usize) -> Vec<TextUnit> {
    Segmenter::new(min_chars).segment(text)
}
