//! Local negation scope for keyword hits.
//!
//! A hit is negated when the short window of text just before it ends with a
//! negation cue ("denies fever", "no evidence of trauma"). No parsing beyond
//! that window.

/// Characters inspected before a keyword hit.
pub const NEGATION_WINDOW: usize = 30;

/// Negation cues, longest phrases first.
const NEGATION_CUES: &[&str] = &[
    "no evidence of",
    "negative for",
    "ruled out",
    "rules out",
    "denies",
    "deny",
    "denied",
    "without",
    "no",
    "not",
    "absent",
];

/// Whether the hit starting at `match_start` in `text_lower` is negated.
///
/// `text_lower` must already be lowercased. The trimmed window (surrounding
/// whitespace removed, then trailing `.,;:`) must end with a whole-word cue.
pub fn is_negated(text_lower: &str, match_start: usize) -> bool {
    if match_start > text_lower.len() {
        return false;
    }
    let mut window_start = match_start.saturating_sub(NEGATION_WINDOW);
    while !text_lower.is_char_boundary(window_start) {
        window_start += 1;
    }
    let Some(window) = text_lower.get(window_start..match_start) else {
        return false;
    };
    let prefix = window.trim().trim_end_matches(['.', ',', ';', ':']);

    NEGATION_CUES.iter().any(|cue| ends_with_word(prefix, cue))
}

/// `text` ends with `cue` and the cue is not the tail of a longer word.
fn ends_with_word(text: &str, cue: &str) -> bool {
    if !text.ends_with(cue) {
        return false;
    }
    text[..text.len() - cue.len()]
        .chars()
        .next_back()
        .map_or(true, |c| !c.is_alphanumeric())
}
