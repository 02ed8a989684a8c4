//! Deterministic rule-based fact extraction.
//!
//! Always computed, also in model mode, where it is the safety net the model
//! answer is reconciled against. Pure: same note in, same record out.

use std::collections::BTreeSet;

use super::taxonomy::{
    detect_red_flags, detect_treatments, find_conservative_care, find_symptom_duration,
    red_flag_hit, treatment_hit, DurationMatch,
};
use super::FactExtractor;
use crate::models::{
    EvidenceSpan, ExtractionMode, FactField, FactRecord, PolicyChunk, RedFlagCategory,
    TreatmentCategory,
};

/// Rule-based extractor; see [`extract_facts_baseline`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BaselineExtractor;

impl FactExtractor for BaselineExtractor {
    fn extract(&self, note: &str, retrieved_policy: &[PolicyChunk]) -> FactRecord {
        extract_facts_baseline(note, retrieved_policy)
    }
}

/// Extract a complete fact record from `note` with one evidence span per
/// populated field (one per category for treatments and red flags).
///
/// Policy chunks do not influence the rules; they are accepted so both
/// extractors share one signature.
pub fn extract_facts_baseline(note: &str, _retrieved_policy: &[PolicyChunk]) -> FactRecord {
    let mut record = FactRecord::empty(ExtractionMode::Baseline);
    let lower = note.to_ascii_lowercase();

    if let Some(m) = find_symptom_duration(note) {
        record.symptoms_duration_weeks = Some(m.weeks);
        push_duration_span(&mut record, FactField::SymptomsDurationWeeks, note, m);
    }

    if let Some(m) = find_conservative_care(note) {
        record.conservative_care_weeks = Some(m.weeks);
        push_duration_span(&mut record, FactField::ConservativeCareWeeks, note, m);
    }

    record.treatments = detect_treatments(note);
    for &category in &record.treatments.clone() {
        if let Some(span) = treatment_span(note, &lower, category) {
            record.push_evidence(FactField::Treatments, span);
        }
    }

    record.set_red_flags(detect_red_flags(note));
    for &category in &record.red_flags.clone() {
        if let Some(span) = red_flag_span(note, &lower, category) {
            record.push_evidence(FactField::RedFlags, span);
        }
    }

    mark_unevidenced(record)
}

fn push_duration_span(record: &mut FactRecord, field: FactField, note: &str, m: DurationMatch) {
    if let Some(span) = EvidenceSpan::note(note, m.start, m.end) {
        record.push_evidence(field, span);
    }
}

/// Span over the first trigger phrase found for a treatment category.
pub fn treatment_span(note: &str, note_lower: &str, category: TreatmentCategory) -> Option<EvidenceSpan> {
    let hit = treatment_hit(note_lower, category)?;
    EvidenceSpan::note(note, hit.start, hit.end)
}

/// Span over the first non-negated trigger phrase found for a red-flag category.
pub fn red_flag_span(note: &str, note_lower: &str, category: RedFlagCategory) -> Option<EvidenceSpan> {
    let hit = red_flag_hit(note_lower, category)?;
    EvidenceSpan::note(note, hit.start, hit.end)
}

/// Record every populated field that ended up without evidence as missing.
pub fn mark_unevidenced(mut record: FactRecord) -> FactRecord {
    let unevidenced: BTreeSet<FactField> = FactField::ALL
        .into_iter()
        .filter(|&f| record.has_value(f) && record.evidence_for(f).is_empty())
        .collect();
    record.missing_evidence.extend(unevidenced);
    record
}
