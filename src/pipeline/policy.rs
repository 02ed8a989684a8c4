//! Payer policy store and lightweight retrieval.
//!
//! The store is a JSON array of `{chunk_id, text}`. A malformed store is the
//! one condition that aborts processing: it means the input collaborator is
//! broken, not that one case is unusual.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::models::PolicyChunk;

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Cannot read policy store {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Policy store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Policy store must be a JSON array of chunks")]
    NotAnArray,

    #[error("Policy chunk #{index} is missing {field}")]
    MissingField { index: usize, field: &'static str },

    #[error("Policy chunk #{index} has an empty chunk_id")]
    EmptyChunkId { index: usize },
}

pub fn load_policy_store(path: &Path) -> Result<Vec<PolicyChunk>, PolicyError> {
    let raw = std::fs::read_to_string(path).map_err(|source| PolicyError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let store = parse_policy_store(&raw)?;
    tracing::debug!(path = %path.display(), chunks = store.len(), "Loaded policy store");
    Ok(store)
}

/// Parse and structurally check a policy store document.
pub fn parse_policy_store(raw: &str) -> Result<Vec<PolicyChunk>, PolicyError> {
    let value: Value = serde_json::from_str(raw)?;
    let items = value.as_array().ok_or(PolicyError::NotAnArray)?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let chunk_id = string_field(item, "chunk_id", index)?;
            if chunk_id.trim().is_empty() {
                return Err(PolicyError::EmptyChunkId { index });
            }
            let text = string_field(item, "text", index)?;
            Ok(PolicyChunk {
                chunk_id: chunk_id.to_string(),
                text: text.to_string(),
            })
        })
        .collect()
}

fn string_field<'a>(item: &'a Value, field: &'static str, index: usize) -> Result<&'a str, PolicyError> {
    item.get(field)
        .and_then(Value::as_str)
        .ok_or(PolicyError::MissingField { index, field })
}

/// Query used to pick policy chunks for a requested procedure.
pub fn policy_query(procedure: Option<&str>) -> String {
    format!(
        "{} criteria conservative care red flags",
        procedure.unwrap_or_default()
    )
}

/// Top `k` chunks by token overlap with `query`, `|q ∩ t| / max(1, |q|)`.
/// Equal scores keep store order.
pub fn retrieve_policy_chunks(store: &[PolicyChunk], query: &str, k: usize) -> Vec<PolicyChunk> {
    let query_tokens = tokenize(query);
    let denominator = query_tokens.len().max(1) as f64;

    let mut scored: Vec<(f64, &PolicyChunk)> = store
        .iter()
        .map(|chunk| {
            let overlap = tokenize(&chunk.text).intersection(&query_tokens).count();
            (overlap as f64 / denominator, chunk)
        })
        .collect();
    // stable sort: ties stay in store order
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    scored
        .into_iter()
        .take(k)
        .map(|(_, chunk)| chunk.clone())
        .collect()
}

/// Lowercase `[a-z0-9]+` runs.
fn tokenize(text: &str) -> HashSet<String> {
    text.to_ascii_lowercase()
        .split(|c: char| !(c.is_ascii_lowercase() || c.is_ascii_digit()))
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, text: &str) -> PolicyChunk {
        PolicyChunk {
            chunk_id: id.into(),
            text: text.into(),
        }
    }

    #[test]
    fn loads_store_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(
            &path,
            r#"[{"chunk_id": "a", "text": "Six weeks of conservative care.", "section": "2.1"}]"#,
        )
        .unwrap();
        let store = load_policy_store(&path).unwrap();
        assert_eq!(store, vec![chunk("a", "Six weeks of conservative care.")]);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_policy_store(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, PolicyError::Read { .. }));
    }

    #[test]
    fn malformed_stores_fail_loudly() {
        assert!(matches!(parse_policy_store("{}"), Err(PolicyError::NotAnArray)));
        assert!(matches!(parse_policy_store("not json"), Err(PolicyError::Json(_))));
        assert!(matches!(
            parse_policy_store(r#"[{"chunk_id": "a"}]"#),
            Err(PolicyError::MissingField { index: 0, field: "text" })
        ));
        assert!(matches!(
            parse_policy_store(r#"[{"chunk_id": "a", "text": "x"}, {"text": "y"}]"#),
            Err(PolicyError::MissingField { index: 1, field: "chunk_id" })
        ));
        assert!(matches!(
            parse_policy_store(r#"[{"chunk_id": " ", "text": "x"}]"#),
            Err(PolicyError::EmptyChunkId { index: 0 })
        ));
    }

    #[test]
    fn tokenize_splits_on_non_alphanumerics() {
        let tokens = tokenize("MRI, L-spine: 6+ weeks!");
        let expected: HashSet<String> = ["mri", "l", "spine", "6", "weeks"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn retrieval_ranks_by_overlap() {
        let store = vec![
            chunk("billing", "Claims must be submitted within 90 days."),
            chunk("care", "At least six weeks of conservative care is required."),
            chunk("flags", "Red flags such as cauda equina bypass conservative care criteria."),
        ];
        let query = policy_query(Some("MRI lumbar spine"));
        let top = retrieve_policy_chunks(&store, &query, 2);
        let ids: Vec<_> = top.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["flags", "care"]);
    }

    #[test]
    fn ties_keep_store_order_and_k_truncates() {
        let store = vec![chunk("a", "nothing"), chunk("b", "matching"), chunk("c", "nada")];
        let top = retrieve_policy_chunks(&store, "unrelated query", 2);
        let ids: Vec<_> = top.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(retrieve_policy_chunks(&store, "q", 0).is_empty());
    }

    #[test]
    fn shipped_demo_store_is_valid() {
        let store = parse_policy_store(include_str!("../../policies/policy_demo_spine_mri.json")).unwrap();
        assert_eq!(store.len(), 5);
        let top = retrieve_policy_chunks(&store, &policy_query(Some("MRI lumbar spine")), 3);
        assert!(top.iter().all(|c| c.chunk_id.starts_with("spine_mri_")));
    }

    #[test]
    fn query_without_procedure() {
        assert_eq!(policy_query(None), " criteria conservative care red flags");
    }
}
