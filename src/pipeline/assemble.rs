//! Packet bundle rendering: JSON artifacts, a Markdown summary and an HTML
//! view of the note with every evidence span highlighted.

use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;
use serde_json::json;

use super::processor::{CaseBundle, PipelineError};
use crate::config;
use crate::models::{Category, EvidenceSource, EvidenceSpan, FactRecord};

const EMPTY: &str = "—";

pub fn write_packet_bundle(bundle: &CaseBundle, out_dir: &Path) -> Result<(), PipelineError> {
    std::fs::create_dir_all(out_dir).map_err(|source| PipelineError::Write {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let case = &bundle.case;
    let facts = &bundle.extracted;
    let packet = json!({
        "case_id": case.case_id,
        "run_id": bundle.run_id,
        "generated_at": bundle.generated_at,
        "generator": format!("{} {}", config::APP_NAME, config::APP_VERSION),
        "exam_request": case.exam_request,
        "patient": case.patient,
        "requesting_provider": case.requesting_provider,
        "clinical_summary": {
            "symptoms_duration_weeks": facts.symptoms_duration_weeks,
            "conservative_care_weeks": facts.conservative_care_weeks,
            "treatments": facts.treatments,
            "red_flags": facts.red_flags,
        },
        "extraction_mode": facts.extraction_mode,
        "checklist_overall": bundle.checklist.overall_status,
    });

    write_json(&out_dir.join("packet.json"), &packet)?;
    write_json(&out_dir.join("checklist.json"), &bundle.checklist)?;
    write_json(&out_dir.join("provenance.json"), &facts.evidence)?;
    write_text(&out_dir.join("packet.md"), &render_packet_md(bundle))?;
    write_text(&out_dir.join("highlights.html"), &render_highlights_html(bundle))?;
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PipelineError> {
    write_text(path, &serde_json::to_string_pretty(value)?)
}

fn write_text(path: &Path, contents: &str) -> Result<(), PipelineError> {
    std::fs::write(path, contents).map_err(|source| PipelineError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn join_codes<C: Category>(items: impl IntoIterator<Item = C>) -> String {
    let joined = items
        .into_iter()
        .map(|c| c.code())
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() {
        EMPTY.to_string()
    } else {
        joined
    }
}

fn display_weeks(weeks: Option<u32>) -> String {
    weeks.map_or_else(|| "null".to_string(), |w| w.to_string())
}

// ═══════════════════════════════════════════
// Markdown
// ═══════════════════════════════════════════

pub fn render_packet_md(bundle: &CaseBundle) -> String {
    let case = &bundle.case;
    let facts = &bundle.extracted;
    let checklist = &bundle.checklist;
    let mut md = String::new();

    let _ = writeln!(md, "# PA-Trace Packet Draft — {}\n", case.case_id);
    let _ = writeln!(md, "## Exam request");
    let _ = writeln!(
        md,
        "- Procedure: {}\n",
        case.exam_request.procedure.as_deref().unwrap_or(EMPTY)
    );

    let _ = writeln!(md, "## Extracted facts (draft, mode: {})", facts.extraction_mode);
    if let Some(message) = &facts.refusal_message {
        let _ = writeln!(md, "- Refused: {message}");
    }
    let _ = writeln!(md, "- Symptoms duration (weeks): {}", display_weeks(facts.symptoms_duration_weeks));
    let _ = writeln!(
        md,
        "- Conservative care duration (weeks): {}",
        display_weeks(facts.conservative_care_weeks)
    );
    let _ = writeln!(md, "- Treatments: {}", join_codes(facts.treatments.iter().copied()));
    let _ = writeln!(md, "- Red flags: {}\n", join_codes(facts.red_flags.iter().copied()));

    let _ = writeln!(md, "## Checklist");
    let _ = writeln!(md, "- Overall: **{}**", checklist.overall_status);
    for criterion in &checklist.criteria {
        let _ = writeln!(md, "- {}: {} ({})", criterion.id, criterion.status, criterion.description);
    }
    if !checklist.missing_evidence.is_empty() {
        let missing: Vec<&str> = checklist.missing_evidence.iter().map(|f| f.as_str()).collect();
        let _ = writeln!(md, "- Missing evidence: {}", missing.join(", "));
    }

    let _ = writeln!(md, "\n## Provenance (evidence quotes)");
    for (field, spans) in facts.evidence.iter().filter(|(_, s)| !s.is_empty()) {
        let _ = writeln!(md, "- **{field}**:");
        for span in spans {
            let _ = writeln!(md, "  - ({}) “{}”", span.source, span.quote);
        }
    }
    md
}

// ═══════════════════════════════════════════
// HTML
// ═══════════════════════════════════════════

/// Escape text for HTML element and attribute content.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

/// HTML-escaped `text` with `<mark>` around every note span. Spans that are
/// empty, inverted, out of range or not on character boundaries are skipped.
pub fn apply_marks(text: &str, spans: &[&EvidenceSpan]) -> String {
    // (offset, is_open); closes sort before opens at the same offset
    let mut events: Vec<(usize, bool)> = spans
        .iter()
        .filter(|s| s.source == EvidenceSource::Note)
        .filter(|s| s.start < s.end && text.get(s.start..s.end).is_some())
        .flat_map(|s| [(s.start, true), (s.end, false)])
        .collect();
    events.sort();

    let mut out = String::with_capacity(text.len() + events.len() * 7);
    let mut cursor = 0;
    for (offset, is_open) in events {
        out.push_str(&escape_html(&text[cursor..offset]));
        out.push_str(if is_open { "<mark>" } else { "</mark>" });
        cursor = offset;
    }
    out.push_str(&escape_html(&text[cursor..]));
    out
}

fn note_spans(facts: &FactRecord) -> Vec<&EvidenceSpan> {
    facts
        .all_spans()
        .filter(|s| s.source == EvidenceSource::Note)
        .collect()
}

pub fn render_highlights_html(bundle: &CaseBundle) -> String {
    let case = &bundle.case;
    let facts = &bundle.extracted;
    let note_marked = apply_marks(&case.note_text, &note_spans(facts));

    let rows = [
        ("symptoms_duration_weeks", display_weeks(facts.symptoms_duration_weeks)),
        ("conservative_care_weeks", display_weeks(facts.conservative_care_weeks)),
        ("treatments", join_codes(facts.treatments.iter().copied())),
        ("red_flags", join_codes(facts.red_flags.iter().copied())),
        ("extraction_mode", facts.extraction_mode.to_string()),
        ("overall_status", bundle.checklist.overall_status.to_string()),
    ];
    let rows_html: String = rows
        .iter()
        .map(|(k, v)| format!("<tr><td>{}</td><td>{}</td></tr>", escape_html(k), escape_html(v)))
        .collect::<Vec<_>>()
        .join("\n");

    let missing: Vec<&str> = bundle
        .checklist
        .missing_evidence
        .iter()
        .map(|f| f.as_str())
        .collect();
    let missing_html = if missing.is_empty() {
        EMPTY.to_string()
    } else {
        escape_html(&missing.join(", "))
    };

    let policy_html = if bundle.retrieved_policy.is_empty() {
        r#"<div class="muted">No policy chunks retrieved.</div>"#.to_string()
    } else {
        bundle
            .retrieved_policy
            .iter()
            .map(|chunk| {
                format!(
                    "<div class='chunk'><div class='chunk_id'>{}</div><pre>{}</pre></div>",
                    escape_html(&chunk.chunk_id),
                    escape_html(&chunk.text)
                )
            })
            .collect()
    };

    format!(
        r#"<!doctype html>
<html>
<head>
  <meta charset="utf-8"/>
  <title>PA-Trace Highlights — {title}</title>
  <style>
    body {{ font-family: system-ui, -apple-system, Segoe UI, Roboto, Arial, sans-serif; margin: 24px; }}
    h1 {{ margin: 0 0 12px 0; }}
    .grid {{ display: grid; grid-template-columns: 1fr 1fr; gap: 16px; }}
    .card {{ border: 1px solid #ddd; border-radius: 10px; padding: 14px; }}
    pre {{ white-space: pre-wrap; word-wrap: break-word; }}
    mark {{ padding: 0 2px; border-radius: 3px; }}
    table {{ border-collapse: collapse; width: 100%; }}
    td {{ border: 1px solid #eee; padding: 6px 8px; vertical-align: top; }}
    .chunk_id {{ font-weight: 600; margin-bottom: 6px; }}
    .muted {{ color: #666; }}
  </style>
</head>
<body>
  <h1>PA-Trace Highlights</h1>
  <div class="muted">Draft only. Highlights show evidence spans found in the note.</div>

  <div class="grid" style="margin-top:16px;">
    <div class="card">
      <h2>Note (highlighted)</h2>
      <pre>{note_marked}</pre>
    </div>
    <div class="card">
      <h2>Extracted fields</h2>
      <table>{rows_html}</table>
      <h3 style="margin-top:14px;">Missing evidence</h3>
      <pre>{missing_html}</pre>
    </div>
  </div>

  <div class="card" style="margin-top:16px;">
    <h2>Retrieved policy chunks (for traceability)</h2>
    {policy_html}
  </div>
</body>
</html>
"#,
        title = escape_html(&case.case_id),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processor::{process_case, RunMode};
    use crate::pipeline::structuring::ModelExtractor;
    use crate::models::{CaseInput, PolicyChunk};

    fn span(text: &str, start: usize, end: usize) -> EvidenceSpan {
        EvidenceSpan::note(text, start, end).unwrap()
    }

    fn bundle(note: &str) -> CaseBundle {
        let case: CaseInput = serde_json::from_value(json!({
            "case_id": "case_<7>",
            "note_text": note,
            "exam_request": {"procedure": "MRI lumbar spine"}
        }))
        .unwrap();
        let store = vec![PolicyChunk {
            chunk_id: "spine_mri_01".into(),
            text: "Conservative care <6 weeks> & red flags.".into(),
        }];
        process_case(case, &store, RunMode::Baseline, &ModelExtractor::unavailable())
    }

    #[test]
    fn escape_covers_markup_characters() {
        assert_eq!(escape_html(r#"<b>"A&B's"</b>"#), "&lt;b&gt;&quot;A&amp;B&#x27;s&quot;&lt;/b&gt;");
    }

    #[test]
    fn marks_wrap_spans_and_escape_text() {
        let note = "Pain <8 weeks> & PT";
        let spans = [span(note, 6, 13), span(note, 17, 19)];
        let refs: Vec<&EvidenceSpan> = spans.iter().collect();
        assert_eq!(
            apply_marks(note, &refs),
            "Pain &lt;<mark>8 weeks</mark>&gt; &amp; <mark>PT</mark>"
        );
    }

    #[test]
    fn invalid_spans_are_skipped() {
        let note = "short note";
        let mut bad = span(note, 0, 5);
        bad.end = 50;
        let mut inverted = span(note, 0, 5);
        inverted.start = 6;
        let refs = vec![&bad, &inverted];
        assert_eq!(apply_marks(note, &refs), "short note");
    }

    #[test]
    fn policy_spans_are_not_marked_in_note() {
        let note = "Six weeks of PT";
        let policy = EvidenceSpan::policy("spine_mri_01", note, 0, 9).unwrap();
        assert_eq!(apply_marks(note, &[&policy]), "Six weeks of PT");
    }

    #[test]
    fn markdown_lists_facts_and_quotes() {
        let md = render_packet_md(&bundle("Low back pain for 8 weeks. Completed 6 weeks of physical therapy."));
        assert!(md.starts_with("# PA-Trace Packet Draft — case_<7>"));
        assert!(md.contains("- Procedure: MRI lumbar spine"));
        assert!(md.contains("- Conservative care duration (weeks): 6"));
        assert!(md.contains("- Treatments: pt"));
        assert!(md.contains("- Red flags: —"));
        assert!(md.contains("- Overall: **MET**"));
        assert!(md.contains("  - (note) “6 weeks of physical therapy”"));
    }

    #[test]
    fn html_highlights_note_and_escapes_everything() {
        let html = render_highlights_html(&bundle("Completed 6 weeks of physical therapy."));
        assert!(html.contains("<title>PA-Trace Highlights — case_&lt;7&gt;</title>"));
        // symptom, care and treatment spans overlap and nest
        assert!(html.contains("Completed <mark><mark>6 weeks</mark> of <mark>physical therapy</mark></mark>."));
        assert!(html.contains("Conservative care &lt;6 weeks&gt; &amp; red flags."));
        assert!(!html.contains("<6 weeks>"));
    }

    #[test]
    fn bundle_files_are_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let b = bundle("Low back pain for 8 weeks. No treatment yet.");
        write_packet_bundle(&b, dir.path()).unwrap();

        let packet: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("packet.json")).unwrap()).unwrap();
        assert_eq!(packet["case_id"], "case_<7>");
        assert_eq!(packet["checklist_overall"], "UNKNOWN");
        assert_eq!(packet["clinical_summary"]["symptoms_duration_weeks"], 8);
        assert!(packet["clinical_summary"]["conservative_care_weeks"].is_null());

        let provenance: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("provenance.json")).unwrap()).unwrap();
        assert_eq!(provenance["symptoms_duration_weeks"][0]["quote"], "8 weeks");
    }
}
