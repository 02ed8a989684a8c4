//! Reconciliation of a parsed model answer with the rule-based baseline.
//!
//! Each step takes a record and returns a new one, so every stage can be
//! tested on its own. Order matters: evidence is validated before anything is
//! boosted, and treatment boosting runs before evidence backfill so boosted
//! categories get their spans.
//!
//! The baseline is a safety net: detections are unioned in, never removed;
//! a missing conservative-care value is filled from it; nothing the model
//! claims survives without a verbatim quote in the note.

use std::collections::BTreeSet;

use super::types::{ClaimedEvidence, ClaimedSource, ModelAnswer};
use crate::models::{
    Category, EvidenceSpan, ExtractionMode, FactField, FactRecord, RedFlagCategory,
    TreatmentCategory,
};
use crate::pipeline::extraction::negation::is_negated;
use crate::pipeline::extraction::{
    mark_unevidenced, normalize_category, red_flag_span, resolve_note_quote, trigger_hits,
};

/// Run the full reconciliation pipeline.
pub fn reconcile(answer: &ModelAnswer, note: &str, baseline: &FactRecord) -> FactRecord {
    let record = validate_answer(answer, note);
    let record = boost_red_flags(record, note, baseline);
    let record = boost_conservative_care(record, baseline);
    let record = boost_treatments(record, baseline);
    let record = backfill_evidence(record, note);
    finalize(record)
}

// ═══════════════════════════════════════════
// Validation
// ═══════════════════════════════════════════

/// Turn the model's claims into a record, keeping only evidence that
/// re-resolves verbatim in the note. Populated fields left without valid
/// evidence are nulled and listed as missing.
pub fn validate_answer(answer: &ModelAnswer, note: &str) -> FactRecord {
    let mut record = FactRecord::empty(ExtractionMode::Llm);
    record.symptoms_duration_weeks = answer.symptoms_duration_weeks;
    record.conservative_care_weeks = answer.conservative_care_weeks;
    record.treatments = normalize_names::<TreatmentCategory>(&answer.treatments);
    record.set_red_flags(normalize_names::<RedFlagCategory>(&answer.red_flags));

    for field in FactField::ALL {
        let claimed = answer.evidence.get(&field).map(Vec::as_slice).unwrap_or(&[]);
        for span in claimed.iter().filter_map(|c| validate_claim(field, c, note)) {
            record.push_evidence(field, span);
        }

        if record.has_value(field) && record.evidence_for(field).is_empty() {
            tracing::debug!(field = %field, "Dropping model value without valid evidence");
            record.clear_field(field);
            record.missing_evidence.insert(field);
        }
    }

    // The model's own gaps only count for fields that are still empty
    let declared: Vec<FactField> = answer
        .missing_evidence
        .iter()
        .copied()
        .filter(|&f| !record.has_value(f))
        .collect();
    record.missing_evidence.extend(declared);
    record
}

/// The declared source is ignored: every quote is re-resolved in the note.
fn validate_claim(field: FactField, claim: &ClaimedEvidence, note: &str) -> Option<EvidenceSpan> {
    if claim.source != ClaimedSource::Note {
        tracing::debug!(field = %field, source = ?claim.source, "Re-resolving evidence against the note");
    }
    match resolve_note_quote(&claim.quote, note) {
        Ok(span) => Some(span),
        Err(reason) => {
            tracing::debug!(field = %field, reason = %reason, "Rejecting claimed evidence");
            None
        }
    }
}

fn normalize_names<C: Category>(names: &[String]) -> BTreeSet<C> {
    names
        .iter()
        .filter_map(|name| {
            let category = normalize_category::<C>(name);
            if category.is_none() {
                tracing::debug!(name = %name, "Dropping unrecognized category name");
            }
            category
        })
        .collect()
}

// ═══════════════════════════════════════════
// Boosting
// ═══════════════════════════════════════════

/// Union in every baseline red flag the model missed, each with a span over
/// its first non-negated trigger.
pub fn boost_red_flags(mut record: FactRecord, note: &str, baseline: &FactRecord) -> FactRecord {
    let missed: Vec<RedFlagCategory> = baseline
        .red_flags
        .difference(&record.red_flags)
        .copied()
        .collect();
    if missed.is_empty() {
        return record;
    }

    let lower = note.to_ascii_lowercase();
    for &category in &missed {
        if let Some(span) = red_flag_span(note, &lower, category) {
            record.push_evidence(FactField::RedFlags, span);
        }
    }
    let merged = record.red_flags.iter().chain(&missed).copied().collect();
    record.set_red_flags(merged);
    record
}

/// Fill a missing conservative-care value from the baseline.
pub fn boost_conservative_care(mut record: FactRecord, baseline: &FactRecord) -> FactRecord {
    let field = FactField::ConservativeCareWeeks;
    if record.conservative_care_weeks.is_some() || baseline.conservative_care_weeks.is_none() {
        return record;
    }

    record.conservative_care_weeks = baseline.conservative_care_weeks;
    record
        .evidence
        .insert(field, baseline.evidence_for(field).to_vec());
    record.missing_evidence.remove(&field);
    record
}

/// Union in every baseline treatment the model missed. Spans are left to
/// [`backfill_evidence`].
pub fn boost_treatments(mut record: FactRecord, baseline: &FactRecord) -> FactRecord {
    record.treatments.extend(baseline.treatments.iter().copied());
    record
}

// ═══════════════════════════════════════════
// Evidence backfill
// ═══════════════════════════════════════════

/// Give every treatment and red-flag category at least one span, trying its
/// trigger phrases in order and skipping any already quoted. Red-flag
/// triggers must occur un-negated.
pub fn backfill_evidence(mut record: FactRecord, note: &str) -> FactRecord {
    let lower = note.to_ascii_lowercase();

    for category in record.treatments.clone() {
        backfill_category(&mut record, FactField::Treatments, note, &lower, category, |_| true);
    }
    for category in record.red_flags.clone() {
        backfill_category(&mut record, FactField::RedFlags, note, &lower, category, |idx| {
            !is_negated(&lower, idx)
        });
    }
    record
}

fn backfill_category<C: Category>(
    record: &mut FactRecord,
    field: FactField,
    note: &str,
    lower: &str,
    category: C,
    accept: impl Fn(usize) -> bool,
) {
    let quoted: Vec<String> = record
        .evidence_for(field)
        .iter()
        .map(|s| s.quote.to_ascii_lowercase())
        .collect();

    let covered = category
        .triggers()
        .iter()
        .any(|t| quoted.iter().any(|q| mentions(q, t)));
    if covered {
        return;
    }

    let span = category
        .triggers()
        .iter()
        .filter(|t| !quoted.iter().any(|q| q == *t))
        .find_map(|t| {
            let start = trigger_hits(lower, t).find(|&idx| accept(idx))?;
            EvidenceSpan::note(note, start, start + t.len())
        });

    match span {
        Some(span) => record.push_evidence(field, span),
        None => tracing::debug!(field = %field, category = category.code(), "No span found for category"),
    }
}

/// `quote` contains `trigger` starting at a word boundary.
fn mentions(quote: &str, trigger: &str) -> bool {
    trigger_hits(quote, trigger).next().is_some()
}

/// Clear gaps that boosting filled, record any populated field still
/// without evidence, and stamp the mode.
pub fn finalize(mut record: FactRecord) -> FactRecord {
    let filled: Vec<FactField> = record
        .missing_evidence
        .iter()
        .copied()
        .filter(|&f| record.has_value(f) && !record.evidence_for(f).is_empty())
        .collect();
    for field in filled {
        record.missing_evidence.remove(&field);
    }
    record.evidence.retain(|_, spans| !spans.is_empty());
    mark_unevidenced(record).with_mode(ExtractionMode::Llm)
}
