use super::guardrail::{clinical_request, refusal_record};
use super::ollama::select_model;
use super::parser::parse_model_answer;
use super::prompt::{build_extraction_prompt, EXTRACTION_SYSTEM_PROMPT};
use super::reconcile::reconcile;
use super::types::{LlmClient, ModelAnswer};
use super::StructuringError;
use crate::models::{ExtractionMode, FactRecord, PolicyChunk};
use crate::pipeline::extraction::{extract_facts_baseline, FactExtractor};

/// Model retry attempts after the first call, for transport or parse errors.
const MAX_LLM_RETRIES: usize = 1;

/// Model-assisted extraction:
/// guardrail → prompt → model → parse → reconcile against baseline.
///
/// The backend is optional. Without one, or when it fails, the baseline
/// record is returned tagged `llm_fallback_baseline`.
pub struct ModelExtractor {
    llm: Option<Box<dyn LlmClient + Send + Sync>>,
    model_name: String,
}

impl ModelExtractor {
    pub fn new(llm: Box<dyn LlmClient + Send + Sync>, model_name: &str) -> Self {
        Self {
            llm: Some(llm),
            model_name: model_name.to_string(),
        }
    }

    /// An extractor with no backend; every non-refused case degrades.
    pub fn unavailable() -> Self {
        Self {
            llm: None,
            model_name: String::new(),
        }
    }

    /// Probe `llm` once and keep it only if a usable model is installed.
    pub fn connect(llm: Box<dyn LlmClient + Send + Sync>, requested_model: Option<&str>) -> Self {
        match select_model(llm.as_ref(), requested_model) {
            Ok(model) => {
                tracing::info!(model = %model, "Model backend ready");
                Self::new(llm, &model)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Model backend unavailable, extraction will use baseline");
                Self::unavailable()
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.llm.is_some()
    }

    pub fn model_name(&self) -> Option<&str> {
        self.llm.as_ref().map(|_| self.model_name.as_str())
    }

    /// Extract facts from `note`. Never fails: see the type docs.
    pub fn extract_facts(&self, note: &str, retrieved_policy: &[PolicyChunk]) -> FactRecord {
        if let Some(phrase) = clinical_request(note) {
            tracing::info!(trigger = %phrase, "Refusing clinical recommendation request");
            return refusal_record();
        }

        let baseline = extract_facts_baseline(note, retrieved_policy);

        let Some(llm) = self.llm.as_deref() else {
            tracing::warn!("Model not available, falling back to baseline");
            return baseline.with_mode(ExtractionMode::LlmFallbackBaseline);
        };

        let prompt = build_extraction_prompt(note, retrieved_policy);
        match self.call_llm_with_retry(llm, &prompt) {
            Ok(answer) => reconcile(&answer, note, &baseline),
            Err(e) => {
                tracing::warn!(error = %e, "Model extraction failed, falling back to baseline");
                baseline.with_mode(ExtractionMode::LlmFallbackBaseline)
            }
        }
    }

    fn call_llm_with_retry(
        &self,
        llm: &(dyn LlmClient + Send + Sync),
        prompt: &str,
    ) -> Result<ModelAnswer, StructuringError> {
        let mut last_error: Option<StructuringError> = None;

        for attempt in 0..=MAX_LLM_RETRIES {
            let response = match llm.generate(&self.model_name, prompt, EXTRACTION_SYSTEM_PROMPT) {
                Ok(resp) => resp,
                Err(e) if is_retryable_error(&e) && attempt < MAX_LLM_RETRIES => {
                    tracing::warn!(attempt = attempt + 1, error = %e, "Model call failed, retrying");
                    last_error = Some(e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            match parse_model_answer(&response) {
                Ok(answer) => return Ok(answer),
                Err(e) if is_parse_error(&e) && attempt < MAX_LLM_RETRIES => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        error = %e,
                        "Model answer parse failed, retrying"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            StructuringError::MalformedResponse("All retry attempts exhausted".into())
        }))
    }
}

impl FactExtractor for ModelExtractor {
    fn extract(&self, note: &str, retrieved_policy: &[PolicyChunk]) -> FactRecord {
        self.extract_facts(note, retrieved_policy)
    }
}

/// Transport errors at the model call level.
fn is_retryable_error(e: &StructuringError) -> bool {
    matches!(
        e,
        StructuringError::OllamaConnection(_)
            | StructuringError::HttpClient(_)
            | StructuringError::OllamaError { .. }
    )
}

/// An unusable answer; a fresh call may produce a parseable one.
fn is_parse_error(e: &StructuringError) -> bool {
    matches!(
        e,
        StructuringError::MalformedResponse(_)
            | StructuringError::JsonParsing(_)
            | StructuringError::ResponseParsing(_)
    )
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::models::{FactField, RedFlagCategory, TreatmentCategory};
    use crate::pipeline::structuring::ollama::MockLlmClient;

    const NOTE: &str = "62-year-old with 8 weeks of low back pain, tried 6 weeks of physical therapy, denies fever, no trauma.";

    /// Returns `fail_response` for the first `fail_count` calls, then `success_response`.
    struct FailThenSucceedLlmClient {
        fail_count: usize,
        call_count: Arc<AtomicUsize>,
        fail_response: String,
        success_response: String,
    }

    impl LlmClient for FailThenSucceedLlmClient {
        fn generate(
            &self,
            _model: &str,
            _prompt: &str,
            _system: &str,
        ) -> Result<String, StructuringError> {
            let count = self.call_count.fetch_add(1, Ordering::SeqCst);
            if count < self.fail_count {
                Ok(self.fail_response.clone())
            } else {
                Ok(self.success_response.clone())
            }
        }

        fn is_model_available(&self, _model: &str) -> Result<bool, StructuringError> {
            Ok(true)
        }

        fn list_models(&self) -> Result<Vec<String>, StructuringError> {
            Ok(vec!["medgemma:latest".into()])
        }
    }

    fn good_answer() -> String {
        format!(
            "```json\n{}\n```",
            json!({
                "symptoms_duration_weeks": 8,
                "conservative_care_weeks": 6,
                "treatments": ["physical therapy"],
                "red_flags": [],
                "red_flags_present": false,
                "evidence": {
                    "symptoms_duration_weeks": [{"source": "note", "start": 0, "end": 3, "quote": "8 weeks of low back pain"}],
                    "conservative_care_weeks": [{"source": "note", "start": 0, "end": 3, "quote": "6 weeks of physical therapy"}],
                    "treatments": ["tried 6 weeks of physical therapy"]
                },
                "missing_evidence": []
            })
        )
    }

    fn extractor(response: &str) -> ModelExtractor {
        ModelExtractor::new(Box::new(MockLlmClient::new(response)), "medgemma:latest")
    }

    #[test]
    fn successful_answer_is_reconciled() {
        let record = extractor(&good_answer()).extract_facts(NOTE, &[]);
        assert_eq!(record.extraction_mode, ExtractionMode::Llm);
        assert_eq!(record.symptoms_duration_weeks, Some(8));
        assert_eq!(record.conservative_care_weeks, Some(6));
        assert_eq!(record.treatments, BTreeSet::from([TreatmentCategory::Pt]));
        assert!(record.red_flags.is_empty());
        assert!(record.missing_evidence.is_empty());
        // offsets come from the note, not from the model
        let span = &record.evidence_for(FactField::SymptomsDurationWeeks)[0];
        assert_eq!(&NOTE[span.start..span.end], "8 weeks of low back pain");
    }

    #[test]
    fn refusal_short_circuits_before_model() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = FailThenSucceedLlmClient {
            fail_count: 0,
            call_count: Arc::clone(&calls),
            fail_response: String::new(),
            success_response: good_answer(),
        };
        let extractor = ModelExtractor::new(Box::new(client), "medgemma");
        let record = extractor.extract_facts("Should the patient get an MRI? 8 weeks of pain.", &[]);
        assert_eq!(record.extraction_mode, ExtractionMode::LlmRefused);
        assert!(record.refusal_message.is_some());
        assert_eq!(record.symptoms_duration_weeks, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_backend_falls_back_to_baseline() {
        let record = ModelExtractor::unavailable().extract_facts(NOTE, &[]);
        let baseline = extract_facts_baseline(NOTE, &[]);
        assert_eq!(record.extraction_mode, ExtractionMode::LlmFallbackBaseline);
        assert_eq!(record, baseline.with_mode(ExtractionMode::LlmFallbackBaseline));
    }

    #[test]
    fn unreachable_backend_falls_back_to_baseline() {
        let extractor = ModelExtractor::new(Box::new(MockLlmClient::unreachable()), "medgemma");
        let record = extractor.extract_facts(NOTE, &[]);
        assert_eq!(record.extraction_mode, ExtractionMode::LlmFallbackBaseline);
        assert_eq!(record.conservative_care_weeks, Some(6));
    }

    #[test]
    fn unparseable_answer_falls_back_after_one_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = FailThenSucceedLlmClient {
            fail_count: usize::MAX,
            call_count: Arc::clone(&calls),
            fail_response: "I am unable to produce JSON today.".into(),
            success_response: String::new(),
        };
        let record = ModelExtractor::new(Box::new(client), "medgemma").extract_facts(NOTE, &[]);
        assert_eq!(record.extraction_mode, ExtractionMode::LlmFallbackBaseline);
        assert_eq!(calls.load(Ordering::SeqCst), 1 + MAX_LLM_RETRIES);
    }

    #[test]
    fn retry_recovers_from_one_malformed_answer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = FailThenSucceedLlmClient {
            fail_count: 1,
            call_count: Arc::clone(&calls),
            fail_response: "{ not json".into(),
            success_response: good_answer(),
        };
        let record = ModelExtractor::new(Box::new(client), "medgemma").extract_facts(NOTE, &[]);
        assert_eq!(record.extraction_mode, ExtractionMode::Llm);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missed_red_flag_is_boosted() {
        let note = "Low back pain x 3 weeks after he fell from a ladder. Fever to 102.";
        let answer = json!({"symptoms_duration_weeks": 3, "evidence": {"symptoms_duration_weeks": ["3 weeks"]}});
        let record = extractor(&answer.to_string()).extract_facts(note, &[]);
        assert_eq!(
            record.red_flags,
            BTreeSet::from([RedFlagCategory::FractureTrauma, RedFlagCategory::Infection])
        );
        assert!(record.red_flags_present);
        assert_eq!(record.evidence_for(FactField::RedFlags).len(), 2);
    }

    #[test]
    fn connect_keeps_backend_with_medgemma() {
        let extractor = ModelExtractor::connect(Box::new(MockLlmClient::new("")), None);
        assert!(extractor.is_available());
        assert_eq!(extractor.model_name(), Some("medgemma:latest"));
    }

    #[test]
    fn connect_without_model_degrades() {
        let client = MockLlmClient::new("").with_models(vec!["llama3:8b".into()]);
        let extractor = ModelExtractor::connect(Box::new(client), None);
        assert!(!extractor.is_available());
        assert_eq!(extractor.model_name(), None);

        let offline = ModelExtractor::connect(Box::new(MockLlmClient::unreachable()), None);
        assert!(!offline.is_available());
    }
}
