use thiserror::Error;

use crate::analysis::AnalysisError;

/// Snapflow agent errors
#[derive(Debug, Error)]
pub enum SnapflowError {
    /// Configuration errors (missing credentials, unreadable file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request validation errors (missing fields, bad encoding)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Image decoding and size-limit errors
    #[error("Image error: {0}")]
    Decode(String),

    /// AI provider failures
    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    /// Notification delivery failures (best-effort, never item-fatal)
    #[error("Notification error: {0}")]
    Notification(String),

    /// Requested port is already bound by another process
    #[error("Port {0} is already in use")]
    PortInUse(u16),

    /// Start requested while a session is live
    #[error("Server is already running")]
    AlreadyRunning,

    /// Stop or toggle requested with no live session
    #[error("Server is not running")]
    NotRunning,

    /// I/O errors
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Convert SnapflowError to String for shell embeddings that can only
/// surface string errors to their frontend
impl From<SnapflowError> for String {
    fn from(err: SnapflowError) -> String {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SnapflowError::Validation("Missing image field".to_string());
        assert_eq!(err.to_string(), "Validation error: Missing image field");
    }

    #[test]
    fn test_error_conversion_to_string() {
        let err = SnapflowError::Config("Missing API key".to_string());
        let s: String = err.into();
        assert_eq!(s, "Configuration error: Missing API key");
    }

    #[test]
    fn test_lifecycle_errors_are_stable_strings() {
        assert_eq!(
            SnapflowError::AlreadyRunning.to_string(),
            "Server is already running"
        );
        assert_eq!(
            SnapflowError::PortInUse(5001).to_string(),
            "Port 5001 is already in use"
        );
    }

    #[test]
    fn test_analysis_error_passthrough() {
        let err: SnapflowError = AnalysisError::RateLimited.into();
        assert!(err.to_string().contains("rate limited"));
    }
}
