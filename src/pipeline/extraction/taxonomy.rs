//! Keyword taxonomy matching over clinical note text.
//!
//! Treatments are detected on any occurrence of a trigger phrase. Red flags
//! additionally require at least one occurrence that is not negated. The
//! asymmetry is intentional: negated treatments ("no PT yet") are out of
//! scope, negated red flags ("denies fever") are the common case.
//!
//! Trigger phrases only match at the start of a word so that short triggers
//! ("pt", "esi") do not fire inside unrelated words ("symptoms", "resist").

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::negation::is_negated;
use super::quantity::{normalize_weeks, numeral_pattern, DurationUnit, UNIT_PATTERN};
use crate::models::{Category, RedFlagCategory, TreatmentCategory};

/// One located trigger phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerHit<C> {
    pub category: C,
    pub trigger: &'static str,
    pub start: usize,
    pub end: usize,
}

/// A duration phrase normalized to weeks, with its byte range in the note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationMatch {
    pub weeks: u32,
    pub start: usize,
    pub end: usize,
}

// ═══════════════════════════════════════════
// Trigger scanning
// ═══════════════════════════════════════════

/// Start offsets of every word-initial occurrence of `trigger` in `text_lower`.
pub fn trigger_hits<'a>(text_lower: &'a str, trigger: &'a str) -> impl Iterator<Item = usize> + 'a {
    text_lower
        .match_indices(trigger)
        .map(|(idx, _)| idx)
        .filter(move |&idx| starts_word(text_lower, idx))
}

fn starts_word(text: &str, idx: usize) -> bool {
    text[..idx]
        .chars()
        .next_back()
        .map_or(true, |c| !c.is_alphanumeric())
}

/// First hit of the category's triggers, trying triggers in table order and
/// keeping the first occurrence `accept` lets through.
fn first_hit<C: Category>(
    text_lower: &str,
    category: C,
    accept: impl Fn(usize) -> bool,
) -> Option<TriggerHit<C>> {
    category.triggers().iter().find_map(|&trigger| {
        trigger_hits(text_lower, trigger)
            .find(|&idx| accept(idx))
            .map(|start| TriggerHit {
                category,
                trigger,
                start,
                end: start + trigger.len(),
            })
    })
}

/// First occurrence of any trigger of `category` (no negation check).
pub fn treatment_hit(text_lower: &str, category: TreatmentCategory) -> Option<TriggerHit<TreatmentCategory>> {
    first_hit(text_lower, category, |_| true)
}

/// First non-negated occurrence of any trigger of `category`.
pub fn red_flag_hit(text_lower: &str, category: RedFlagCategory) -> Option<TriggerHit<RedFlagCategory>> {
    first_hit(text_lower, category, |idx| !is_negated(text_lower, idx))
}

pub fn detect_treatments(note: &str) -> BTreeSet<TreatmentCategory> {
    let lower = note.to_ascii_lowercase();
    TreatmentCategory::ALL
        .iter()
        .copied()
        .filter(|&category| treatment_hit(&lower, category).is_some())
        .collect()
}

pub fn detect_red_flags(note: &str) -> BTreeSet<RedFlagCategory> {
    let lower = note.to_ascii_lowercase();
    RedFlagCategory::ALL
        .iter()
        .copied()
        .filter(|&category| red_flag_hit(&lower, category).is_some())
        .collect()
}

/// Map a free-form category name to its canonical code.
///
/// Accepts the code itself in any case with spaces or hyphens for
/// underscores ("Home Exercise"), else any trigger phrase ("ibuprofen").
pub fn normalize_category<C: Category>(name: &str) -> Option<C> {
    let lower = name.trim().to_ascii_lowercase();
    if lower.is_empty() {
        return None;
    }
    let key = lower.replace([' ', '-'], "_");
    if let Some(&category) = C::ALL.iter().find(|c| c.code() == key) {
        return Some(category);
    }
    C::ALL
        .iter()
        .copied()
        .find(|c| c.triggers().iter().any(|t| *t == lower))
}

// ═══════════════════════════════════════════
// Durations
// ═══════════════════════════════════════════

/// "<N> weeks" / "<N>-month"; the leading non-digit keeps "120 weeks" out.
static DIGIT_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(?:^|\D)(?P<num>\d{{1,2}})\s*-?\s*(?P<unit>{UNIT_PATTERN})\b"
    ))
    .expect("Invalid digit duration pattern")
});

/// "two months" and friends.
static WORD_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?P<num>{})\s+(?P<unit>{UNIT_PATTERN})\b",
        numeral_pattern()
    ))
    .expect("Invalid word duration pattern")
});

/// All treatment trigger phrases as one alternation, longest first.
fn care_pattern() -> String {
    let mut phrases: Vec<&str> = TreatmentCategory::ALL
        .iter()
        .flat_map(|c| c.triggers().iter().copied())
        .collect();
    phrases.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    phrases.dedup();
    phrases
        .iter()
        .map(|p| regex::escape(p).replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|")
}

/// "<N> <unit> of <treatment>"
static CARE_DURATION_OF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?P<num>{})\s+(?P<unit>{UNIT_PATTERN})\s+of\s+(?:{})s?\b",
        numeral_pattern(),
        care_pattern()
    ))
    .expect("Invalid care duration pattern")
});

/// "<treatment> for <N> <unit>"
static CARE_DURATION_FOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:{})s?\s+for\s+(?P<num>{})\s+(?P<unit>{UNIT_PATTERN})\b",
        care_pattern(),
        numeral_pattern()
    ))
    .expect("Invalid care duration pattern")
});

/// Build a match from `num`/`unit` captures. The span starts at the numeral
/// when the phrase leads with it, else at the start of the whole match.
fn duration_from(caps: &Captures<'_>, starts_at_numeral: bool) -> Option<DurationMatch> {
    let num = caps.name("num")?;
    let weeks = normalize_weeks(num.as_str(), caps.name("unit")?.as_str())?;
    let whole = caps.get(0)?;
    let start = if starts_at_numeral { num.start() } else { whole.start() };
    Some(DurationMatch { weeks, start, end: whole.end() })
}

/// First digit-form duration whose unit is `unit`.
fn first_digit_duration(note: &str, unit: DurationUnit) -> Option<DurationMatch> {
    DIGIT_DURATION
        .captures_iter(note)
        .filter(|caps| {
            caps.name("unit")
                .and_then(|u| DurationUnit::parse(u.as_str()))
                == Some(unit)
        })
        .find_map(|caps| duration_from(&caps, true))
}

/// Symptom duration: the first digit-form "<N> weeks", else the first
/// digit-form "<N> months", else the first word-form duration. Only the first
/// match of the winning form counts.
pub fn find_symptom_duration(note: &str) -> Option<DurationMatch> {
    first_digit_duration(note, DurationUnit::Week)
        .or_else(|| first_digit_duration(note, DurationUnit::Month))
        .or_else(|| {
            WORD_DURATION
                .captures_iter(note)
                .find_map(|caps| duration_from(&caps, true))
        })
}

/// Conservative-care duration: every "<N> <unit> of <treatment>" match, then
/// every "<treatment> for <N> <unit>" match; the longest wins, ties going to
/// the first found in that order.
pub fn find_conservative_care(note: &str) -> Option<DurationMatch> {
    let forward = CARE_DURATION_OF
        .captures_iter(note)
        .filter_map(|caps| duration_from(&caps, true));
    let backward = CARE_DURATION_FOR
        .captures_iter(note)
        .filter_map(|caps| duration_from(&caps, false));

    forward.chain(backward).fold(None, |best: Option<DurationMatch>, m| match best {
        Some(b) if b.weeks >= m.weeks => Some(b),
        _ => Some(m),
    })
}
