pub mod types;
pub mod prompt;
pub mod parser;
pub mod guardrail;
pub mod reconcile;
pub mod ollama;
pub mod orchestrator;

pub use types::*;
pub use prompt::*;
pub use parser::*;
pub use guardrail::*;
pub use reconcile::*;
pub use ollama::*;
pub use orchestrator::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StructuringError {
    #[error("Ollama is not running at {0}")]
    OllamaConnection(String),

    #[error("Ollama returned error (status {status}): {body}")]
    OllamaError { status: u16, body: String },

    #[error("No compatible MedGemma model available")]
    NoModelAvailable,

    #[error("Model {0} is not installed on the backend")]
    ModelNotInstalled(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Malformed model answer: {0}")]
    MalformedResponse(String),

    #[error("JSON parsing error: {0}")]
    JsonParsing(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),
}
