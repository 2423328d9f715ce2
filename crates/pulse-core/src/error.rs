//! Error types for pulse.

use thiserror::Error;

/// Result type alias using pulse's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for pulse operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource with the same unique key already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Inference/generation failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Similarity search provider failed
    #[error("Search error: {0}")]
    Search(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Background job error
    #[error("Job error: {0}")]
    Job(String),

    /// A run for this worker is already in flight
    #[error("Worker is already running: {0}")]
    AlreadyRunning(String),

    /// No run for this worker is in flight
    #[error("Worker is not running: {0}")]
    NotRunning(String),

    /// Run was cancelled cooperatively
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for the `AlreadyExists` conflict variant.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists(_))
    }

    /// True for the `NotFound` variant.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("data source".to_string());
        assert_eq!(err.to_string(), "Not found: data source");
    }

    #[test]
    fn test_error_display_already_exists() {
        let err = Error::AlreadyExists("https://example.com".to_string());
        assert_eq!(err.to_string(), "Already exists: https://example.com");
    }

    #[test]
    fn test_error_display_control_errors() {
        assert_eq!(
            Error::AlreadyRunning("crawl".into()).to_string(),
            "Worker is already running: crawl"
        );
        assert_eq!(
            Error::NotRunning("crawl".into()).to_string(),
            "Worker is not running: crawl"
        );
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("missing API key".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing API key");
    }

    #[test]
    fn test_is_already_exists() {
        assert!(Error::AlreadyExists("x".into()).is_already_exists());
        assert!(!Error::NotFound("x".into()).is_already_exists());
        assert!(Error::NotFound("x".into()).is_not_found());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
