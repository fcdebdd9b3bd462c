//! Error types for reverie.

use thiserror::Error;

/// Result type alias using reverie's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for reverie operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Idea not found
    #[error("Idea not found: {0}")]
    IdeaNotFound(uuid::Uuid),

    /// Dream not found
    #[error("Dream not found: {0}")]
    DreamNotFound(uuid::Uuid),

    /// Media blob not found
    #[error("Media not found: {0}")]
    MediaNotFound(uuid::Uuid),

    /// Inference/generation failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Audio transcription failed
    #[error("Transcription error: {0}")]
    Transcription(String),

    /// Job queue error
    #[error("Job error: {0}")]
    Job(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Authentication failed (no identity)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Forbidden (authenticated but not the record owner)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
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
    use uuid::Uuid;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("test resource".to_string());
        assert_eq!(err.to_string(), "Not found: test resource");
    }

    #[test]
    fn test_error_display_idea_not_found() {
        let id = Uuid::nil();
        let err = Error::IdeaNotFound(id);
        assert_eq!(err.to_string(), format!("Idea not found: {}", id));
    }

    #[test]
    fn test_error_display_dream_not_found() {
        let id = Uuid::new_v4();
        let err = Error::DreamNotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_error_display_inference() {
        let err = Error::Inference("model timeout".to_string());
        assert_eq!(err.to_string(), "Inference error: model timeout");
    }

    #[test]
    fn test_error_display_transcription() {
        let err = Error::Transcription("empty audio".to_string());
        assert_eq!(err.to_string(), "Transcription error: empty audio");
    }

    #[test]
    fn test_error_display_job() {
        let err = Error::Job("queue full".to_string());
        assert_eq!(err.to_string(), "Job error: queue full");
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("missing API key".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing API key");
    }

    #[test]
    fn test_error_display_invalid_input() {
        let err = Error::InvalidInput("empty content".to_string());
        assert_eq!(err.to_string(), "Invalid input: empty content");
    }

    #[test]
    fn test_error_display_unauthorized() {
        let err = Error::Unauthorized("no identity".to_string());
        assert_eq!(err.to_string(), "Unauthorized: no identity");
    }

    #[test]
    fn test_error_display_forbidden() {
        let err = Error::Forbidden("not the owner".to_string());
        assert_eq!(err.to_string(), "Forbidden: not the owner");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number");
        assert!(json_err.is_err());

        let err: Error = json_err.unwrap_err().into();
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
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn test_result_type_ok() {
        fn get_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(get_result().unwrap(), 42);
    }
}
