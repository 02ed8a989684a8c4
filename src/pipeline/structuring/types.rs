use std::collections::BTreeMap;

use super::StructuringError;
use crate::models::FactField;

/// Model backend abstraction (allows mocking).
pub trait LlmClient {
    fn generate(
        &self,
        model: &str,
        prompt: &str,
        system: &str,
    ) -> Result<String, StructuringError>;

    fn is_model_available(&self, model: &str) -> Result<bool, StructuringError>;

    fn list_models(&self) -> Result<Vec<String>, StructuringError>;
}

/// The model's structured answer, as claimed. Nothing here is trusted until
/// the reconciler has checked it against the note.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelAnswer {
    pub symptoms_duration_weeks: Option<u32>,
    pub conservative_care_weeks: Option<u32>,
    /// Free-form names; normalized to category codes during reconciliation.
    pub treatments: Vec<String>,
    pub red_flags: Vec<String>,
    pub evidence: BTreeMap<FactField, Vec<ClaimedEvidence>>,
    pub missing_evidence: Vec<FactField>,
}

/// One evidence item as the model reported it. Model offsets are never
/// trusted, so they are not kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedEvidence {
    pub source: ClaimedSource,
    pub quote: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimedSource {
    Note,
    Policy { chunk_id: Option<String> },
    Other(String),
}

impl ClaimedEvidence {
    /// A bare quote string, taken to come from the note.
    pub fn note_quote(quote: &str) -> Self {
        Self {
            source: ClaimedSource::Note,
            quote: quote.to_string(),
        }
    }
}
