//! Evidence span resolution: find where a quote sits in its source text.
//!
//! Single-token quotes match whole words only ("pt" must not land inside
//! "symptoms"); multi-token quotes match as case-insensitive substrings. The
//! returned span always carries the source's own casing, never the query's.

use regex::Regex;

use crate::models::EvidenceSpan;

/// Quotes at least this many characters long pass the quality bar.
pub const MIN_QUOTE_CHARS: usize = 8;

/// Quotes with at least this many whitespace-separated tokens pass the bar.
pub const MIN_QUOTE_TOKENS: usize = 2;

/// Why a claimed quote was not turned into a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteRejection {
    Empty,
    TooWeak,
    NotFound,
}

impl std::fmt::Display for QuoteRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty quote"),
            Self::TooWeak => write!(f, "quote below minimum quality"),
            Self::NotFound => write!(f, "quote not found verbatim"),
        }
    }
}

/// Minimum provenance quality: long enough, multi-word, or numeric ("x6").
pub fn meets_quality_bar(quote: &str) -> bool {
    quote.chars().count() >= MIN_QUOTE_CHARS
        || quote.split_whitespace().count() >= MIN_QUOTE_TOKENS
        || quote.chars().any(|c| c.is_ascii_digit())
}

/// Byte range of the first match of `quote` in `text`.
pub fn locate_quote(quote: &str, text: &str) -> Option<(usize, usize)> {
    if quote.is_empty() {
        return None;
    }
    if quote.split_whitespace().count() == 1 {
        return locate_whole_word(quote, text);
    }

    // ASCII lowercasing keeps byte offsets aligned with the original
    let idx = text.to_ascii_lowercase().find(&quote.to_ascii_lowercase())?;
    Some((idx, idx + quote.len()))
}

fn locate_whole_word(token: &str, text: &str) -> Option<(usize, usize)> {
    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
    let left = if is_word(token.chars().next()) { r"\b" } else { "" };
    let right = if is_word(token.chars().next_back()) { r"\b" } else { "" };

    let re = Regex::new(&format!("(?i){left}{}{right}", regex::escape(token))).ok()?;
    re.find(text).map(|m| (m.start(), m.end()))
}

/// Resolve a claimed quote against the note, enforcing the quality bar.
pub fn resolve_note_quote(quote: &str, note: &str) -> Result<EvidenceSpan, QuoteRejection> {
    let quote = quote.trim();
    if quote.is_empty() {
        return Err(QuoteRejection::Empty);
    }
    if !meets_quality_bar(quote) {
        return Err(QuoteRejection::TooWeak);
    }
    let (start, end) = locate_quote(quote, note).ok_or(QuoteRejection::NotFound)?;
    EvidenceSpan::note(note, start, end).ok_or(QuoteRejection::NotFound)
}
