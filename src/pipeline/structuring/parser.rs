use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::types::{ClaimedEvidence, ClaimedSource, ModelAnswer};
use super::StructuringError;
use crate::models::FactField;

/// A fenced code block, optionally tagged `json`.
static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("Invalid fence pattern"));

/// Parse the model's raw output into a [`ModelAnswer`].
pub fn parse_model_answer(response: &str) -> Result<ModelAnswer, StructuringError> {
    let json_str = extract_json_object(response)?;
    let value: Value =
        serde_json::from_str(json_str).map_err(|e| StructuringError::JsonParsing(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| StructuringError::MalformedResponse("Answer is not a JSON object".into()))?;
    Ok(answer_from_object(object))
}

/// Strip a fenced block if present, then take the first `{` to the last `}`.
pub fn extract_json_object(response: &str) -> Result<&str, StructuringError> {
    let body = FENCED_BLOCK
        .captures(response)
        .and_then(|caps| caps.get(1))
        .map_or(response, |m| m.as_str());

    let start = body
        .find('{')
        .ok_or_else(|| StructuringError::MalformedResponse("No JSON object found".into()))?;
    let end = body
        .rfind('}')
        .filter(|&end| end > start)
        .ok_or_else(|| StructuringError::MalformedResponse("Unclosed JSON object".into()))?;

    Ok(&body[start..=end])
}

fn answer_from_object(object: &Map<String, Value>) -> ModelAnswer {
    ModelAnswer {
        symptoms_duration_weeks: weeks_field(object.get("symptoms_duration_weeks")),
        conservative_care_weeks: weeks_field(object.get("conservative_care_weeks")),
        treatments: string_list(object.get("treatments")),
        red_flags: string_list(object.get("red_flags")),
        evidence: evidence_map(object.get("evidence")),
        missing_evidence: string_list(object.get("missing_evidence"))
            .iter()
            .filter_map(|name| FactField::from_str(name.trim()).ok())
            .collect(),
    }
}

/// Non-negative integer weeks; integral floats and digit strings are accepted.
fn weeks_field(value: Option<&Value>) -> Option<u32> {
    let weeks = match value? {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    u32::try_from(weeks).ok()
}

/// Array of strings (non-strings skipped), or a lone string.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

fn evidence_map(value: Option<&Value>) -> BTreeMap<FactField, Vec<ClaimedEvidence>> {
    let Some(Value::Object(fields)) = value else {
        return BTreeMap::new();
    };

    let mut evidence = BTreeMap::new();
    for (key, items) in fields {
        let Ok(field) = FactField::from_str(key) else {
            tracing::debug!(key = %key, "Ignoring evidence for unknown field");
            continue;
        };
        let claimed: Vec<ClaimedEvidence> = match items {
            Value::Array(items) => items.iter().filter_map(claimed_evidence).collect(),
            single => claimed_evidence(single).into_iter().collect(),
        };
        evidence.insert(field, claimed);
    }
    evidence
}

/// One evidence item. Bare strings become note quotes; objects need a string
/// `quote`. Anything else is dropped.
fn claimed_evidence(item: &Value) -> Option<ClaimedEvidence> {
    match item {
        Value::String(quote) => Some(ClaimedEvidence::note_quote(quote)),
        Value::Object(obj) => {
            let quote = obj.get("quote")?.as_str()?;
            let source = match obj.get("source").and_then(Value::as_str) {
                None => ClaimedSource::Note,
                Some(s) if s.eq_ignore_ascii_case("note") => ClaimedSource::Note,
                Some(s) if s.eq_ignore_ascii_case("policy") => ClaimedSource::Policy {
                    chunk_id: obj.get("chunk_id").and_then(Value::as_str).map(String::from),
                },
                Some(other) => ClaimedSource::Other(other.to_string()),
            };
            Some(ClaimedEvidence {
                source,
                quote: quote.to_string(),
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_fenced_answer_with_prose() {
        let response = format!(
            "Here is the extraction:\n```json\n{}\n```\nDone.",
            json!({
                "symptoms_duration_weeks": 8,
                "conservative_care_weeks": null,
                "treatments": ["pt"],
                "red_flags": [],
                "evidence": {
                    "symptoms_duration_weeks": [
                        {"source": "note", "start": 17, "end": 24, "quote": "8 weeks of low back pain"}
                    ]
                },
                "missing_evidence": ["conservative_care_weeks"]
            })
        );
        let answer = parse_model_answer(&response).unwrap();
        assert_eq!(answer.symptoms_duration_weeks, Some(8));
        assert_eq!(answer.conservative_care_weeks, None);
        assert_eq!(answer.treatments, vec!["pt"]);
        assert_eq!(
            answer.evidence[&FactField::SymptomsDurationWeeks][0].quote,
            "8 weeks of low back pain"
        );
        assert_eq!(answer.missing_evidence, vec![FactField::ConservativeCareWeeks]);
    }

    #[test]
    fn parses_unfenced_object_surrounded_by_text() {
        let answer = parse_model_answer(r#"Sure! {"conservative_care_weeks": 6.0} Hope this helps."#).unwrap();
        assert_eq!(answer.conservative_care_weeks, Some(6));
    }

    #[test]
    fn plain_fence_without_language_tag() {
        let answer = parse_model_answer("```\n{\"red_flags\": \"infection\"}\n```").unwrap();
        assert_eq!(answer.red_flags, vec!["infection"]);
    }

    #[test]
    fn bare_string_evidence_is_coerced_to_note_quote() {
        let answer = parse_model_answer(
            &json!({"evidence": {"treatments": ["6 weeks of physical therapy", 42]}}).to_string(),
        )
        .unwrap();
        let items = &answer.evidence[&FactField::Treatments];
        assert_eq!(items.len(), 1);
        assert_eq!(items[0], ClaimedEvidence::note_quote("6 weeks of physical therapy"));
    }

    #[test]
    fn policy_sources_keep_chunk_id() {
        let answer = parse_model_answer(
            &json!({"evidence": {"red_flags": [
                {"source": "policy", "chunk_id": "spine_mri_02", "quote": "red flag symptoms"}
            ]}})
            .to_string(),
        )
        .unwrap();
        assert_eq!(
            answer.evidence[&FactField::RedFlags][0].source,
            ClaimedSource::Policy {
                chunk_id: Some("spine_mri_02".into())
            }
        );
    }

    #[test]
    fn unknown_keys_and_bad_values_are_ignored() {
        let answer = parse_model_answer(
            &json!({
                "symptoms_duration_weeks": "eight",
                "conservative_care_weeks": -2,
                "extraction_mode": "llm",
                "evidence": {"age": ["62-year-old"]},
                "missing_evidence": ["age", "red_flags"]
            })
            .to_string(),
        )
        .unwrap();
        assert_eq!(answer.symptoms_duration_weeks, None);
        assert_eq!(answer.conservative_care_weeks, None);
        assert!(answer.evidence.is_empty());
        assert_eq!(answer.missing_evidence, vec![FactField::RedFlags]);
    }

    #[test]
    fn missing_object_is_malformed() {
        assert!(matches!(
            parse_model_answer("I cannot help with that."),
            Err(StructuringError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_model_answer("} backwards {"),
            Err(StructuringError::MalformedResponse(_))
        ));
    }

    #[test]
    fn broken_json_is_a_parse_error() {
        assert!(matches!(
            parse_model_answer("```json\n{\"treatments\": [\"pt\",}\n```"),
            Err(StructuringError::JsonParsing(_))
        ));
    }
}
