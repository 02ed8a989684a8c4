use std::sync::atomic::{AtomicUsize, Ordering};

use reqwest::blocking::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::types::LlmClient;
use super::StructuringError;
use crate::config;

/// Preferred MedGemma models in order of preference.
const MEDGEMMA_MODELS: &[&str] = &[
    "medgemma",
    "medgemma:27b",
    "medgemma:4b",
    "medgemma:latest",
];

/// Ollama HTTP client for local model inference.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, StructuringError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StructuringError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }

    /// Default Ollama instance at localhost:11434 with 5-minute timeout.
    pub fn default_local() -> Result<Self, StructuringError> {
        Self::new(config::DEFAULT_OLLAMA_URL, config::DEFAULT_MODEL_TIMEOUT_SECS)
    }

    /// Client configured from `PA_TRACE_OLLAMA_URL` / `PA_TRACE_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, StructuringError> {
        Self::new(&config::ollama_url(), config::model_timeout_secs())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send `request` and decode a JSON body; non-2xx statuses carry the body
    /// text in the error.
    fn fetch_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, StructuringError> {
        let response = request.send().map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StructuringError::OllamaError {
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }
        response
            .json()
            .map_err(|e| StructuringError::ResponseParsing(e.to_string()))
    }

    fn map_send_error(&self, e: reqwest::Error) -> StructuringError {
        if e.is_connect() {
            StructuringError::OllamaConnection(self.base_url.clone())
        } else if e.is_timeout() {
            StructuringError::HttpClient(format!(
                "Request timed out after {}s",
                self.timeout_secs
            ))
        } else {
            StructuringError::HttpClient(e.to_string())
        }
    }
}

/// Pick the model to run: the requested tag if installed, otherwise the
/// installed tag matching the most preferred MedGemma name.
pub fn select_model(
    llm: &dyn LlmClient,
    requested: Option<&str>,
) -> Result<String, StructuringError> {
    if let Some(model) = requested {
        return if llm.is_model_available(model)? {
            Ok(model.to_string())
        } else {
            Err(StructuringError::ModelNotInstalled(model.to_string()))
        };
    }

    let available = llm.list_models()?;
    MEDGEMMA_MODELS
        .iter()
        .find_map(|preferred| available.iter().find(|m| m.starts_with(preferred)))
        .cloned()
        .ok_or(StructuringError::NoModelAvailable)
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Low temperature keeps answers stable across reruns of the same case.
const GENERATE_OPTIONS: OllamaOptions = OllamaOptions {
    temperature: 0.1,
    num_predict: 1024,
};

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

/// Response body from Ollama /api/tags
#[derive(Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

impl LlmClient for OllamaClient {
    fn generate(
        &self,
        model: &str,
        prompt: &str,
        system: &str,
    ) -> Result<String, StructuringError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model,
            prompt,
            system,
            stream: false,
            options: GENERATE_OPTIONS,
        };

        let parsed: OllamaGenerateResponse = self.fetch_json(self.client.post(&url).json(&body))?;
        Ok(parsed.response)
    }

    fn is_model_available(&self, model: &str) -> Result<bool, StructuringError> {
        let models = self.list_models()?;
        Ok(models.iter().any(|m| m.starts_with(model)))
    }

    fn list_models(&self) -> Result<Vec<String>, StructuringError> {
        let url = format!("{}/api/tags", self.base_url);
        let tags: OllamaTagsResponse = self.fetch_json(self.client.get(&url))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

/// Mock model client for testing: returns a configurable response, or a
/// connection error when built with [`MockLlmClient::unreachable`].
pub struct MockLlmClient {
    response: String,
    available_models: Vec<String>,
    unreachable: bool,
    calls: AtomicUsize,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            available_models: vec!["medgemma:latest".to_string()],
            unreachable: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call fails as if the server were down.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::new("")
        }
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.available_models = models;
        self
    }

    /// Number of `generate` calls made so far.
    pub fn generate_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LlmClient for MockLlmClient {
    fn generate(
        &self,
        _model: &str,
        _prompt: &str,
        _system: &str,
    ) -> Result<String, StructuringError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(StructuringError::OllamaConnection("mock://offline".into()));
        }
        Ok(self.response.clone())
    }

    fn is_model_available(&self, model: &str) -> Result<bool, StructuringError> {
        if self.unreachable {
            return Err(StructuringError::OllamaConnection("mock://offline".into()));
        }
        Ok(self.available_models.iter().any(|m| m.starts_with(model)))
    }

    fn list_models(&self) -> Result<Vec<String>, StructuringError> {
        if self.unreachable {
            return Err(StructuringError::OllamaConnection("mock://offline".into()));
        }
        Ok(self.available_models.clone())
    }
}
