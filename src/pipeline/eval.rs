//! Batch evaluation against gold labels.
//!
//! Field accuracy, decision accuracy, provenance validity (does every quote
//! still sit at its offsets in the declared source?) and abstention precision
//! on the cases whose gold decision is `UNKNOWN`.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::processor::{read_case, run_case_file, CaseBundle, PipelineError, RunMode};
use crate::models::{CriterionStatus, EvidenceSource, EvidenceSpan, GoldLabel, PolicyChunk};
use crate::pipeline::structuring::ModelExtractor;

/// Fields compared against gold labels, in report order.
pub const EVAL_FIELDS: [&str; 3] = [
    "symptoms_duration_weeks",
    "conservative_care_weeks",
    "red_flags_present",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalMetrics {
    pub mode: RunMode,
    pub n_cases: usize,
    pub field_accuracy: BTreeMap<String, f64>,
    pub decision_accuracy: f64,
    pub provenance_valid_rate: Option<f64>,
    pub abstention_precision_on_unknown: Option<f64>,
}

/// Running hit counts across the evaluated cases.
#[derive(Debug, Default)]
struct Tally {
    field_hits: [usize; 3],
    decision_hits: usize,
    cases: usize,
    evidence_valid: usize,
    evidence_total: usize,
    unknown_gold: usize,
    unknown_abstained: usize,
}

impl Tally {
    fn record(&mut self, bundle: &CaseBundle, gold: &GoldLabel) {
        let facts = &bundle.extracted;
        let hits = [
            gold.symptoms_duration_weeks == facts.symptoms_duration_weeks,
            gold.conservative_care_weeks == facts.conservative_care_weeks,
            gold.red_flags_present == Some(facts.red_flags_present),
        ];
        for (slot, hit) in self.field_hits.iter_mut().zip(hits) {
            *slot += usize::from(hit);
        }

        let decision = bundle.checklist.overall_status;
        self.decision_hits += usize::from(gold.expected_status == Some(decision));
        if gold.expected_status == Some(CriterionStatus::Unknown) {
            self.unknown_gold += 1;
            self.unknown_abstained += usize::from(decision == CriterionStatus::Unknown);
        }

        let (valid, total) = provenance_counts(bundle);
        self.evidence_valid += valid;
        self.evidence_total += total;
        self.cases += 1;
    }

    fn metrics(&self, mode: RunMode) -> EvalMetrics {
        let rate = |hits: usize, n: usize| if n == 0 { 0.0 } else { hits as f64 / n as f64 };
        let ratio = |hits: usize, n: usize| (n > 0).then(|| hits as f64 / n as f64);

        EvalMetrics {
            mode,
            n_cases: self.cases,
            field_accuracy: EVAL_FIELDS
                .iter()
                .zip(self.field_hits)
                .map(|(field, hits)| (field.to_string(), rate(hits, self.cases)))
                .collect(),
            decision_accuracy: rate(self.decision_hits, self.cases),
            provenance_valid_rate: ratio(self.evidence_valid, self.evidence_total),
            abstention_precision_on_unknown: ratio(self.unknown_abstained, self.unknown_gold),
        }
    }
}

/// `(valid, total)` evidence spans: valid when the quote is exactly the slice
/// at its offsets in the note, or in the retrieved chunk it names.
pub fn provenance_counts(bundle: &CaseBundle) -> (usize, usize) {
    let chunks: HashMap<&str, &str> = bundle
        .retrieved_policy
        .iter()
        .map(|c| (c.chunk_id.as_str(), c.text.as_str()))
        .collect();

    let is_valid = |span: &EvidenceSpan| match span.source {
        EvidenceSource::Note => span.is_exact_in(&bundle.case.note_text),
        EvidenceSource::Policy => span
            .chunk_id
            .as_deref()
            .and_then(|id| chunks.get(id))
            .is_some_and(|text| span.is_exact_in(text)),
    };

    bundle
        .extracted
        .all_spans()
        .fold((0, 0), |(valid, total), span| {
            (valid + usize::from(is_valid(span)), total + 1)
        })
}

/// `case_*.json` files in `cases_dir`, sorted by name.
pub fn list_case_files(cases_dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = std::fs::read_dir(cases_dir).map_err(|source| PipelineError::Read {
        path: cases_dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("case_") && n.ends_with(".json"))
        })
        .collect();
    paths.sort();
    Ok(paths)
}

pub fn load_gold(path: &Path) -> Result<HashMap<String, GoldLabel>, PipelineError> {
    let raw = std::fs::read_to_string(path).map_err(|source| PipelineError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| PipelineError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Process every case in `cases_dir`, writing one bundle per case under
/// `out_dir/<case_id>/`, then `metrics.json` and `eval_report.md`.
pub fn run_eval(
    cases_dir: &Path,
    gold_path: &Path,
    out_dir: &Path,
    mode: RunMode,
    policy_store: &[PolicyChunk],
    model: &ModelExtractor,
) -> Result<EvalMetrics, PipelineError> {
    std::fs::create_dir_all(out_dir).map_err(|source| PipelineError::Write {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let gold = load_gold(gold_path)?;
    let mut tally = Tally::default();

    for case_path in list_case_files(cases_dir)? {
        let case_id = read_case(&case_path)?.case_id;
        let label = gold
            .get(&case_id)
            .ok_or_else(|| PipelineError::MissingGold(case_id.clone()))?;
        let bundle = run_case_file(&case_path, &out_dir.join(&case_id), policy_store, mode, model)?;
        tally.record(&bundle, label);
    }

    let metrics = tally.metrics(mode);
    let metrics_path = out_dir.join("metrics.json");
    std::fs::write(&metrics_path, serde_json::to_string_pretty(&metrics)?).map_err(|source| {
        PipelineError::Write {
            path: metrics_path.clone(),
            source,
        }
    })?;
    let report_path = out_dir.join("eval_report.md");
    std::fs::write(&report_path, render_report(&metrics)).map_err(|source| PipelineError::Write {
        path: report_path.clone(),
        source,
    })?;

    tracing::info!(
        cases = metrics.n_cases,
        decision_accuracy = metrics.decision_accuracy,
        out_dir = %out_dir.display(),
        "Evaluation complete"
    );
    Ok(metrics)
}

pub fn render_report(metrics: &EvalMetrics) -> String {
    let mut report = String::from("# PA-Trace Evaluation Report\n\n");
    let _ = writeln!(report, "- Mode: {}", metrics.mode);
    let _ = writeln!(report, "- Cases: {}", metrics.n_cases);

    let _ = writeln!(report, "\n## Field accuracy");
    for field in EVAL_FIELDS {
        if let Some(acc) = metrics.field_accuracy.get(field) {
            let _ = writeln!(report, "- {field}: {acc:.2}");
        }
    }
    let _ = writeln!(report, "\n## Decision accuracy\n- {:.2}", metrics.decision_accuracy);
    if let Some(rate) = metrics.provenance_valid_rate {
        let _ = writeln!(report, "\n## Provenance validity rate\n- {rate:.2}");
    }
    if let Some(precision) = metrics.abstention_precision_on_unknown {
        let _ = writeln!(report, "\n## Abstention precision (on UNKNOWN gold cases)\n- {precision:.2}");
    }
    report
}
