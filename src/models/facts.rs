use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::enums::{EvidenceSource, ExtractionMode, FactField, RedFlagCategory, TreatmentCategory};

/// A verbatim, offset-addressed quotation from a source text.
///
/// Offsets are UTF-8 byte offsets; `quote` is always the exact slice
/// `source_text[start..end]` at the time the span was built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSpan {
    pub source: EvidenceSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    pub start: usize,
    pub end: usize,
    pub quote: String,
}

impl EvidenceSpan {
    /// Span over `note[start..end]`. `None` if the range is empty, out of
    /// bounds or splits a character.
    pub fn note(note: &str, start: usize, end: usize) -> Option<Self> {
        let quote = checked_slice(note, start, end)?;
        Some(Self {
            source: EvidenceSource::Note,
            chunk_id: None,
            start,
            end,
            quote: quote.to_string(),
        })
    }

    /// Span over `chunk_text[start..end]` of the policy chunk `chunk_id`.
    pub fn policy(chunk_id: &str, chunk_text: &str, start: usize, end: usize) -> Option<Self> {
        let quote = checked_slice(chunk_text, start, end)?;
        Some(Self {
            source: EvidenceSource::Policy,
            chunk_id: Some(chunk_id.to_string()),
            start,
            end,
            quote: quote.to_string(),
        })
    }

    /// Whether the span still addresses its quote exactly in `source_text`.
    pub fn is_exact_in(&self, source_text: &str) -> bool {
        checked_slice(source_text, self.start, self.end) == Some(self.quote.as_str())
    }
}

fn checked_slice(text: &str, start: usize, end: usize) -> Option<&str> {
    if start >= end {
        return None;
    }
    text.get(start..end)
}

/// Structured facts extracted from one note, with provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactRecord {
    pub symptoms_duration_weeks: Option<u32>,
    pub conservative_care_weeks: Option<u32>,
    pub treatments: BTreeSet<TreatmentCategory>,
    pub red_flags: BTreeSet<RedFlagCategory>,
    pub red_flags_present: bool,
    pub evidence: BTreeMap<FactField, Vec<EvidenceSpan>>,
    pub missing_evidence: BTreeSet<FactField>,
    pub extraction_mode: ExtractionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refusal_message: Option<String>,
}

impl FactRecord {
    /// A record with every field null/empty.
    pub fn empty(extraction_mode: ExtractionMode) -> Self {
        Self {
            symptoms_duration_weeks: None,
            conservative_care_weeks: None,
            treatments: BTreeSet::new(),
            red_flags: BTreeSet::new(),
            red_flags_present: false,
            evidence: BTreeMap::new(),
            missing_evidence: BTreeSet::new(),
            extraction_mode,
            refusal_message: None,
        }
    }

    pub fn with_mode(mut self, extraction_mode: ExtractionMode) -> Self {
        self.extraction_mode = extraction_mode;
        self
    }

    /// Replace the red-flag set, keeping `red_flags_present` in sync.
    pub fn set_red_flags(&mut self, flags: BTreeSet<RedFlagCategory>) {
        self.red_flags_present = !flags.is_empty();
        self.red_flags = flags;
    }

    /// Whether the field holds a non-null / non-empty value.
    pub fn has_value(&self, field: FactField) -> bool {
        match field {
            FactField::SymptomsDurationWeeks => self.symptoms_duration_weeks.is_some(),
            FactField::ConservativeCareWeeks => self.conservative_care_weeks.is_some(),
            FactField::Treatments => !self.treatments.is_empty(),
            FactField::RedFlags => !self.red_flags.is_empty(),
        }
    }

    /// Null or empty the field's value and drop its evidence.
    pub fn clear_field(&mut self, field: FactField) {
        match field {
            FactField::SymptomsDurationWeeks => self.symptoms_duration_weeks = None,
            FactField::ConservativeCareWeeks => self.conservative_care_weeks = None,
            FactField::Treatments => self.treatments.clear(),
            FactField::RedFlags => self.set_red_flags(BTreeSet::new()),
        }
        self.evidence.remove(&field);
    }

    pub fn evidence_for(&self, field: FactField) -> &[EvidenceSpan] {
        self.evidence.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn push_evidence(&mut self, field: FactField, span: EvidenceSpan) {
        self.evidence.entry(field).or_default().push(span);
    }

    /// Every evidence span, in field order.
    pub fn all_spans(&self) -> impl Iterator<Item = &EvidenceSpan> {
        self.evidence.values().flatten()
    }

    pub fn is_refusal(&self) -> bool {
        self.extraction_mode == ExtractionMode::LlmRefused
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOTE: &str = "Low back pain for 8 weeks.";

    #[test]
    fn note_span_quotes_exact_slice() {
        let span = EvidenceSpan::note(NOTE, 18, 25).unwrap();
        assert_eq!(span.quote, "8 weeks");
        assert!(span.is_exact_in(NOTE));
        assert!(span.chunk_id.is_none());
    }

    #[test]
    fn note_span_rejects_bad_ranges() {
        assert!(EvidenceSpan::note(NOTE, 5, 5).is_none());
        assert!(EvidenceSpan::note(NOTE, 10, 4).is_none());
        assert!(EvidenceSpan::note(NOTE, 0, NOTE.len() + 1).is_none());
        // "é" is two bytes; offset 1 splits it
        assert!(EvidenceSpan::note("é pain", 1, 3).is_none());
    }

    #[test]
    fn policy_span_carries_chunk_id() {
        let span = EvidenceSpan::policy("spine_mri_02", "Six weeks of conservative care.", 0, 9).unwrap();
        assert_eq!(span.source, EvidenceSource::Policy);
        assert_eq!(span.chunk_id.as_deref(), Some("spine_mri_02"));
        assert_eq!(span.quote, "Six weeks");
    }

    #[test]
    fn set_red_flags_keeps_present_in_sync() {
        let mut record = FactRecord::empty(ExtractionMode::Baseline);
        record.set_red_flags(BTreeSet::from([RedFlagCategory::Infection]));
        assert!(record.red_flags_present);
        record.clear_field(FactField::RedFlags);
        assert!(!record.red_flags_present);
        assert!(record.red_flags.is_empty());
    }

    #[test]
    fn serialized_record_uses_field_names_as_keys() {
        let mut record = FactRecord::empty(ExtractionMode::Baseline);
        record.symptoms_duration_weeks = Some(8);
        record.push_evidence(
            FactField::SymptomsDurationWeeks,
            EvidenceSpan::note(NOTE, 18, 25).unwrap(),
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["evidence"]["symptoms_duration_weeks"][0]["quote"], "8 weeks");
        assert_eq!(value["extraction_mode"], "baseline");
        assert!(value.get("refusal_message").is_none());
    }
}
