use crate::models::{Category, FactField, PolicyChunk, RedFlagCategory, TreatmentCategory};

pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"
You are a medical document extraction assistant drafting prior-authorization
paperwork. You ONLY output valid JSON, never code, advice or explanations.
You never recommend, diagnose or decide anything about the patient.
"#;

const EVIDENCE_RULES: &str = r#"EVIDENCE REQUIREMENTS (STRICT):
- Every evidence.quote MUST be copied VERBATIM from the NOTE (exact substring).
- Do NOT expand or normalize abbreviations inside evidence.quote.
- Prefer quotes with enough context: at least 2 words or 10 characters.
  Good: "6 weeks of physical therapy", "failed PT x 6 weeks"
  Bad: "PT", "6"
- For every non-null field you output, include at least one evidence item.
- If you cannot find an exact supporting quote, output null/empty for the
  field and list it under missing_evidence."#;

const DURATION_RULES: &str = r#"FIELD GUIDANCE:
- symptoms_duration_weeks: how long symptoms have lasted ("8 weeks", "3 months").
  Patient age is NOT a duration ("45-year-old" is age).
- conservative_care_weeks: how long conservative treatment was tried. It must be
  explicit ("6 weeks of PT", "failed 8 weeks of therapy").
  Convert months to weeks: 1 month = 4 weeks. Word numbers count: "two months" = 8.
  If several treatments have different durations, use the LONGEST.
  Example: "home exercises for two months and PT for 4 weeks" -> 8.
- treatments: ONLY therapies or medications tried. Symptoms ("incontinence"),
  exam findings ("weakness") and diagnoses are NOT treatments."#;

/// Build the extraction prompt for one note and its retrieved policy chunks.
///
/// Category codes and their indicator phrases come from the taxonomy tables,
/// so the prompt never offers a code the matcher does not know.
pub fn build_extraction_prompt(note_text: &str, retrieved_policy: &[PolicyChunk]) -> String {
    let policy_json =
        serde_json::to_string_pretty(retrieved_policy).unwrap_or_else(|_| "[]".to_string());

    format!(
        r#"You are extracting structured fields for a prior-authorization (PA) packet draft.
Output MUST be a single JSON object (no markdown, no extra keys).

{EVIDENCE_RULES}

{DURATION_RULES}

RED FLAG DETECTION (HIGHEST PRIORITY):
Red flags indicate serious pathology that bypasses conservative care requirements.
Detect ALL red flags present in the note. A negated mention ("denies fever") is
NOT a red flag. Categories and their indicators:
{red_flag_guide}

Input NOTE:
<note>
{note_text}
</note>

Retrieved POLICY CHUNKS (context only, never quote them as evidence):
{policy_json}

Return JSON with this schema:
{schema}

Allowed red_flags values: {red_flag_codes}
Allowed treatments values: {treatment_codes}
"#,
        red_flag_guide = indicator_guide::<RedFlagCategory>(),
        schema = answer_schema(),
        red_flag_codes = code_list::<RedFlagCategory>(),
        treatment_codes = code_list::<TreatmentCategory>(),
    )
}

fn indicator_guide<C: Category>() -> String {
    C::ALL
        .iter()
        .map(|c| format!("- \"{}\": {}", c.code(), c.triggers().join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn code_list<C: Category>() -> String {
    let codes: Vec<String> = C::ALL.iter().map(|c| format!("\"{}\"", c.code())).collect();
    format!("[{}]", codes.join(","))
}

fn answer_schema() -> String {
    let evidence_keys = FactField::ALL
        .iter()
        .map(|f| {
            format!(
                r#"     "{}": [{{"source":"note","quote":"..."}}]"#,
                f.as_str()
            )
        })
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        r#"{{
  "symptoms_duration_weeks": <int|null>,
  "conservative_care_weeks": <int|null>,
  "treatments": <array of strings>,
  "red_flags": <array of strings>,
  "red_flags_present": <bool>,
  "evidence": {{
{evidence_keys}
  }},
  "missing_evidence": <array of field names>
}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk() -> PolicyChunk {
        PolicyChunk {
            chunk_id: "spine_mri_01".into(),
            text: "Six weeks of conservative care are required.".into(),
        }
    }

    #[test]
    fn prompt_contains_note_verbatim() {
        let note = "Low back pain x 8 weeks. Failed PT.";
        let prompt = build_extraction_prompt(note, &[]);
        assert!(prompt.contains(note));
    }

    #[test]
    fn prompt_embeds_policy_chunks() {
        let prompt = build_extraction_prompt("note", &[chunk()]);
        assert!(prompt.contains("\"chunk_id\": \"spine_mri_01\""));
    }

    #[test]
    fn prompt_lists_every_category_code() {
        let prompt = build_extraction_prompt("note", &[]);
        for c in TreatmentCategory::ALL {
            assert!(prompt.contains(&format!("\"{}\"", c.code())), "missing {c:?}");
        }
        for c in RedFlagCategory::ALL {
            assert!(prompt.contains(&format!("\"{}\"", c.code())), "missing {c:?}");
        }
    }

    #[test]
    fn red_flag_guide_lists_indicators() {
        let guide = indicator_guide::<RedFlagCategory>();
        assert!(guide.contains("\"cauda_equina\": urinary retention, saddle anesthesia"));
        assert_eq!(guide.lines().count(), RedFlagCategory::ALL.len());
    }

    #[test]
    fn schema_has_evidence_slot_per_field() {
        let schema = answer_schema();
        for field in FactField::ALL {
            assert!(schema.contains(&format!("\"{}\": [", field.as_str())));
        }
    }

    #[test]
    fn system_prompt_forbids_advice() {
        assert!(EXTRACTION_SYSTEM_PROMPT.contains("ONLY output valid JSON"));
        assert!(EXTRACTION_SYSTEM_PROMPT.contains("never recommend"));
    }
}
