use serde::{Deserialize, Serialize};

use super::enums::CriterionStatus;

/// One prior-authorization case as handed over by the intake system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseInput {
    pub case_id: String,
    #[serde(default)]
    pub note_text: String,
    #[serde(default)]
    pub exam_request: ExamRequest,
    #[serde(default)]
    pub patient: serde_json::Value,
    #[serde(default)]
    pub requesting_provider: serde_json::Value,
}

/// The imaging exam being requested. Only `procedure` is interpreted;
/// everything else is carried through to the packet untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExamRequest {
    #[serde(default)]
    pub procedure: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A retrievable chunk of payer policy text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyChunk {
    pub chunk_id: String,
    pub text: String,
}

/// Reference labels for one case, used by evaluation only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldLabel {
    #[serde(default)]
    pub symptoms_duration_weeks: Option<u32>,
    #[serde(default)]
    pub conservative_care_weeks: Option<u32>,
    #[serde(default)]
    pub red_flags_present: Option<bool>,
    #[serde(default)]
    pub expected_status: Option<CriterionStatus>,
}
