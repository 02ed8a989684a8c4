//! Refusal guardrail for clinical-recommendation requests.
//!
//! The tool drafts paperwork. Input phrased as a request for a clinical
//! decision ("should the patient...", "recommend I ...") is refused before
//! any model is consulted.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{ExtractionMode, FactRecord};

pub const REFUSAL_MESSAGE: &str =
    "This tool drafts PA documentation only. It does not provide clinical recommendations.";

/// A directive verb followed by the patient or a first-person address.
static CLINICAL_REQUEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:should|recommend|advise|prescribe|diagnose)\s+(?:the\s+)?(?:patients?|i)\b")
        .expect("Invalid clinical request pattern")
});

/// The phrase that makes `text` read as a clinical-recommendation request.
pub fn clinical_request(text: &str) -> Option<&str> {
    CLINICAL_REQUEST.find(text).map(|m| m.as_str())
}

/// Terminal record for a refused case: no facts, no evidence.
pub fn refusal_record() -> FactRecord {
    FactRecord {
        refusal_message: Some(REFUSAL_MESSAGE.to_string()),
        ..FactRecord::empty(ExtractionMode::LlmRefused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_about_patient_is_refused() {
        assert_eq!(
            clinical_request("Should the patient get an MRI or keep doing PT?"),
            Some("Should the patient")
        );
        assert!(clinical_request("Please recommend patient next steps.").is_some());
        assert!(clinical_request("What would you advise I do?").is_some());
    }

    #[test]
    fn ordinary_notes_pass() {
        assert!(clinical_request("62-year-old with 8 weeks of low back pain.").is_none());
        assert!(clinical_request("PT recommended by PCP, patient completed 6 weeks.").is_none());
        assert!(clinical_request("Patient should continue home exercises.").is_none());
    }

    #[test]
    fn verb_must_be_a_whole_word() {
        assert!(clinical_request("The shoulder patient reports pain.").is_none());
        assert!(clinical_request("Diagnosed patient with sciatica.").is_none());
    }

    #[test]
    fn refusal_record_carries_message_and_no_facts() {
        let record = refusal_record();
        assert!(record.is_refusal());
        assert_eq!(record.refusal_message.as_deref(), Some(REFUSAL_MESSAGE));
        assert!(record.evidence.is_empty());
        assert!(record.treatments.is_empty());
        assert!(!record.red_flags_present);
    }
}
