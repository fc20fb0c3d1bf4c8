use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("No extractable content for document {0}")]
    ContentUnavailable(String),

    #[error("Generation failed on every backend (primary: {primary}; secondary: {secondary})")]
    GenerationFailed { primary: String, secondary: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised by a generation backend. These are the only errors that
/// trigger engine failover.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    #[error("Backend request failed: {message}")]
    Request { message: String },

    #[error("Backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Streaming error: {message}")]
    Stream { message: String },

    #[error("Backend response parse error: {message}")]
    Parse { message: String },

    #[error("Generation timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Stream ended without final content")]
    EmptyResponse,
}
