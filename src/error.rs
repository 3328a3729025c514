//! Error types for Canvas Data operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while talking to the Canvas Data API or
/// materializing its files locally.
#[derive(Error, Debug)]
pub enum CanvasDataError {
    /// Missing or empty credentials, or an unreadable config file.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// A transport failure that survived every retry attempt.
    #[error("Connection to {url} failed after {attempts} attempts: {source}")]
    ConnectionFailure {
        url: String,
        attempts: usize,
        #[source]
        source: reqwest::Error,
    },

    /// A non-success HTTP response from the API.
    #[error("{}", api_error_display(.status, .message))]
    ApiError {
        status: Option<u16>,
        message: String,
    },

    /// Caller supplied an unusable selector or pagination request.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The dump listing did not contain the dumps an operation needs.
    #[error("Dump not found: {0}")]
    DumpNotFound(String),

    /// Local filesystem failure while moving data from one file to another.
    #[error("Error writing {} from {}: {source}", .to.display(), .from.display())]
    IoFailure {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    /// I/O error during file operations.
    #[error(transparent)]
    IoError(#[from] io::Error),

    /// HTTP request error that is not a connection failure.
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

fn api_error_display(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("API error (HTTP {}): {}", status, message),
        None => format!("API error: {}", message),
    }
}

impl CanvasDataError {
    /// Process exit code for this kind of error, used by the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            CanvasDataError::ConfigurationError(_) => 2,
            CanvasDataError::InvalidArgument(_) => 3,
            CanvasDataError::ConnectionFailure { .. } => 4,
            CanvasDataError::ApiError { .. } => 5,
            CanvasDataError::DumpNotFound(_) => 7,
            CanvasDataError::IoFailure { .. } | CanvasDataError::IoError(_) => 6,
            CanvasDataError::ReqwestError(_) | CanvasDataError::SerdeJsonError(_) => 1,
        }
    }

    pub(crate) fn io_failure(
        from: impl Into<PathBuf>,
        to: impl Into<PathBuf>,
        source: io::Error,
    ) -> Self {
        CanvasDataError::IoFailure {
            from: from.into(),
            to: to.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_message_includes_status_when_known() {
        let err = CanvasDataError::ApiError {
            status: Some(403),
            message: "Invalid signature".to_string(),
        };
        assert_eq!(err.to_string(), "API error (HTTP 403): Invalid signature");
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn io_failure_names_both_paths() {
        let err = CanvasDataError::io_failure(
            "downloads/a.gz",
            "data/course_dim.txt",
            io::Error::new(io::ErrorKind::Other, "disk full"),
        );
        let text = err.to_string();
        assert!(text.contains("downloads/a.gz"));
        assert!(text.contains("data/course_dim.txt"));
        assert_eq!(err.exit_code(), 6);
    }

    #[test]
    fn exit_codes_are_distinct_per_kind() {
        let codes = [
            CanvasDataError::ConfigurationError(String::new()).exit_code(),
            CanvasDataError::InvalidArgument(String::new()).exit_code(),
            CanvasDataError::ApiError {
                status: None,
                message: String::new(),
            }
            .exit_code(),
            CanvasDataError::DumpNotFound(String::new()).exit_code(),
            CanvasDataError::IoError(io::Error::new(io::ErrorKind::Other, "x")).exit_code(),
        ];
        let mut sorted = codes.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len());
    }
}
