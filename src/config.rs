use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "PA-Trace";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Policy chunks handed to extraction and rendering per case.
pub const POLICY_TOP_K: usize = 3;

/// Minimum documented conservative care, in weeks, for criterion C2.
pub const CONSERVATIVE_CARE_THRESHOLD_WEEKS: u32 = 6;

/// Model backend request timeout when `PA_TRACE_TIMEOUT_SECS` is unset.
pub const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 300;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

const OLLAMA_URL_ENV: &str = "PA_TRACE_OLLAMA_URL";
const MODEL_ENV: &str = "PA_TRACE_MODEL";
const TIMEOUT_ENV: &str = "PA_TRACE_TIMEOUT_SECS";

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "pa_trace_lib=debug,pa_trace=debug,warn"
    } else {
        "pa_trace_lib=info,pa_trace=info,warn"
    }
}

/// Demo policy store shipped with the repository.
pub fn default_policy_path() -> PathBuf {
    PathBuf::from("policies").join("policy_demo_spine_mri.json")
}

/// Base URL of the Ollama server.
pub fn ollama_url() -> String {
    non_empty_env(OLLAMA_URL_ENV).unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
}

/// Explicit model tag, if the operator pinned one.
pub fn model_override() -> Option<String> {
    non_empty_env(MODEL_ENV)
}

pub fn model_timeout_secs() -> u64 {
    non_empty_env(TIMEOUT_ENV)
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MODEL_TIMEOUT_SECS)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
