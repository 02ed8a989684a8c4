//! Case processing orchestrator.
//!
//! One entry point per case: retrieve policy → extract facts → checklist →
//! (write packet bundle). The extractor is picked by run mode behind the
//! `FactExtractor` trait, so the orchestrator is testable with a mock model.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::config;
use crate::models::{CaseInput, Checklist, FactRecord, PolicyChunk};
use crate::pipeline::assemble::write_packet_bundle;
use crate::pipeline::checklist::build_checklist;
use crate::pipeline::extraction::{BaselineExtractor, FactExtractor};
use crate::pipeline::policy::{policy_query, retrieve_policy_chunks, PolicyError};
use crate::pipeline::structuring::ModelExtractor;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Policy store error: {0}")]
    Policy(#[from] PolicyError),

    #[error("No gold label for case {0}")]
    MissingGold(String),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which extractor a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Baseline,
    Llm,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Llm => "llm",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything produced for one case.
#[derive(Debug, Clone, Serialize)]
pub struct CaseBundle {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub mode: RunMode,
    pub case: CaseInput,
    pub retrieved_policy: Vec<PolicyChunk>,
    pub extracted: FactRecord,
    pub checklist: Checklist,
}

// ---------------------------------------------------------------------------
// Processing
// ---------------------------------------------------------------------------

/// Run one case through retrieval, extraction and the checklist. Never fails:
/// degraded extraction shows up in `extracted.extraction_mode`.
pub fn process_case(
    case: CaseInput,
    policy_store: &[PolicyChunk],
    mode: RunMode,
    model: &ModelExtractor,
) -> CaseBundle {
    let _span = tracing::info_span!("process_case", case_id = %case.case_id, mode = %mode).entered();

    let query = policy_query(case.exam_request.procedure.as_deref());
    let retrieved_policy = retrieve_policy_chunks(policy_store, &query, config::POLICY_TOP_K);

    let extractor: &dyn FactExtractor = match mode {
        RunMode::Baseline => &BaselineExtractor,
        RunMode::Llm => model,
    };
    let extracted = extractor.extract(&case.note_text, &retrieved_policy);
    let checklist = build_checklist(&extracted);

    tracing::info!(
        case_id = %case.case_id,
        chunks = ?retrieved_policy.iter().map(|c| c.chunk_id.as_str()).collect::<Vec<_>>(),
        extraction_mode = %extracted.extraction_mode,
        decision = %checklist.overall_status,
        missing = ?checklist.missing_evidence,
        "Case processed"
    );

    CaseBundle {
        run_id: Uuid::new_v4(),
        generated_at: Utc::now(),
        mode,
        case,
        retrieved_policy,
        extracted,
        checklist,
    }
}

pub fn read_case(path: &Path) -> Result<CaseInput, PipelineError> {
    let raw = std::fs::read_to_string(path).map_err(|source| PipelineError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| PipelineError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a case file, process it and write its packet bundle into `out_dir`.
pub fn run_case_file(
    case_path: &Path,
    out_dir: &Path,
    policy_store: &[PolicyChunk],
    mode: RunMode,
    model: &ModelExtractor,
) -> Result<CaseBundle, PipelineError> {
    let case = read_case(case_path)?;
    let bundle = process_case(case, policy_store, mode, model);
    write_packet_bundle(&bundle, out_dir)?;
    tracing::info!(case_id = %bundle.case.case_id, out_dir = %out_dir.display(), "Wrote packet bundle");
    Ok(bundle)
}
