//! Duration quantities: numeral + time unit → whole weeks.
//!
//! Numerals are 1–2 digit strings or the words one..twelve. Units are
//! week(s) and month(s); a month counts as 4 weeks. Anything outside that
//! vocabulary is unrecognized, never zero.

/// Word-form numerals accepted in duration phrases.
const WORD_NUMERALS: &[(&str, u32)] = &[
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
    ("eleven", 11),
    ("twelve", 12),
];

const WEEKS_PER_MONTH: u32 = 4;

/// Regex alternation matching any supported numeral (digits first).
pub(crate) fn numeral_pattern() -> String {
    let words: Vec<&str> = WORD_NUMERALS.iter().map(|(w, _)| *w).collect();
    format!(r"\d{{1,2}}|{}", words.join("|"))
}

/// Regex alternation matching any supported unit.
pub(crate) const UNIT_PATTERN: &str = r"weeks?|months?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationUnit {
    Week,
    Month,
}

impl DurationUnit {
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "week" | "weeks" => Some(Self::Week),
            "month" | "months" => Some(Self::Month),
            _ => None,
        }
    }
}

/// Parse a digit string (1–2 digits) or a word-form numeral.
pub fn parse_numeral(token: &str) -> Option<u32> {
    let token = token.trim();
    if !token.is_empty() && token.len() <= 2 && token.bytes().all(|b| b.is_ascii_digit()) {
        return token.parse().ok();
    }
    let lower = token.to_ascii_lowercase();
    WORD_NUMERALS
        .iter()
        .find(|(word, _)| *word == lower)
        .map(|(_, value)| *value)
}

pub fn to_weeks(value: u32, unit: DurationUnit) -> u32 {
    match unit {
        DurationUnit::Week => value,
        DurationUnit::Month => value * WEEKS_PER_MONTH,
    }
}

/// Normalize a numeral token and unit token to weeks.
pub fn normalize_weeks(numeral: &str, unit: &str) -> Option<u32> {
    let value = parse_numeral(numeral)?;
    let unit = DurationUnit::parse(unit)?;
    Some(to_weeks(value, unit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digits_and_words_parse() {
        assert_eq!(parse_numeral("8"), Some(8));
        assert_eq!(parse_numeral("12"), Some(12));
        assert_eq!(parse_numeral("Two"), Some(2));
        assert_eq!(parse_numeral("twelve"), Some(12));
    }

    #[test]
    fn out_of_vocabulary_numerals_are_unrecognized() {
        assert_eq!(parse_numeral("thirteen"), None);
        assert_eq!(parse_numeral("123"), None);
        assert_eq!(parse_numeral(""), None);
        assert_eq!(parse_numeral("a few"), None);
    }

    #[test]
    fn months_convert_to_four_weeks() {
        assert_eq!(normalize_weeks("two", "months"), Some(8));
        assert_eq!(normalize_weeks("3", "month"), Some(12));
        assert_eq!(normalize_weeks("6", "weeks"), Some(6));
    }

    #[test]
    fn unsupported_unit_is_no_match_not_zero() {
        assert_eq!(normalize_weeks("3", "days"), None);
        assert_eq!(normalize_weeks("2", "years"), None);
    }

    #[test]
    fn numeral_pattern_lists_every_word() {
        let pattern = numeral_pattern();
        assert!(pattern.starts_with(r"\d{1,2}|one|two"));
        assert!(pattern.ends_with("twelve"));
    }
}
