//! Error types for the course generation orchestrator.

use thiserror::Error;

/// Errors surfaced by the session registry, the generation queue and the
/// task-generation provider.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Step not found: {0}")]
    StepNotFound(u32),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Provider request failed: {0}")]
    ProviderRequestFailed(String),

    #[error("Provider rejected request: {0}")]
    ProviderRejected(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Session transport closed: {0}")]
    SessionClosed(String),
}

impl ApiError {
    /// Whether the queue may schedule another attempt after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::InvalidInput(_) => false,
            ApiError::ProviderRejected(_) => false,
            ApiError::ConfigError(_) | ApiError::Io(_) => false,
            ApiError::SessionNotFound(_) | ApiError::StepNotFound(_) => false,
            ApiError::SessionClosed(_) => false,
            ApiError::RetriesExhausted { .. } => false,
            ApiError::Timeout(_) => true,
            ApiError::ProviderRequestFailed(_) => true,
            ApiError::ProviderError(_) => true,
            ApiError::GenerationFailed(_) => true,
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Io(err.to_string())
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
