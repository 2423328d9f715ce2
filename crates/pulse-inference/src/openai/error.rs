//! OpenAI-specific error classification.

use pulse_core::Error;

/// Error categories derived from an OpenAI error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAIErrorCode {
    AuthenticationError,
    RateLimitExceeded,
    ModelNotFound,
    ContextLengthExceeded,
    ServerError,
    Unknown,
}

impl OpenAIErrorCode {
    /// Determine error code from HTTP status and error type.
    pub fn from_response(status: u16, error_type: &str) -> Self {
        match (status, error_type) {
            (401, _) => Self::AuthenticationError,
            (429, _) => Self::RateLimitExceeded,
            (404, _) | (_, "model_not_found") => Self::ModelNotFound,
            (400, _) if error_type.contains("context_length") => Self::ContextLengthExceeded,
            (500..=599, _) => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimitExceeded | Self::ServerError)
    }
}

/// Convert a classified OpenAI failure into a pulse error.
///
/// `wrap` builds the variant for the calling operation (embedding or
/// generation); credential and model problems are configuration errors.
pub fn to_pulse_error(code: OpenAIErrorCode, message: &str, wrap: fn(String) -> Error) -> Error {
    match code {
        OpenAIErrorCode::AuthenticationError => {
            Error::Config(format!("Authentication failed: {}", message))
        }
        OpenAIErrorCode::ModelNotFound => Error::Config(format!("Model not found: {}", message)),
        OpenAIErrorCode::RateLimitExceeded => wrap(format!("Rate limit exceeded: {}", message)),
        OpenAIErrorCode::ContextLengthExceeded => wrap(format!("Context too long: {}", message)),
        OpenAIErrorCode::ServerError => wrap(format!("Server error: {}", message)),
        OpenAIErrorCode::Unknown => wrap(message.to_string()),
    }
}
