/*!
 * Error types for Upflow
 */

use std::io;
use std::time::Duration;
use thiserror::Error;
use upflow_core_resilience::ResilienceError;

/// Exit code: upload finished
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code: the upload failed at runtime
pub const EXIT_FAILED: i32 = 1;
/// Exit code: bad configuration or input, nothing was sent
pub const EXIT_FATAL: i32 = 2;
/// Exit code: interrupted by the user
pub const EXIT_CANCELLED: i32 = 130;

/// Result type alias for upload operations
pub type Result<T> = std::result::Result<T, UploadError>;

/// Errors that can occur while uploading
///
/// Part-upload failures are surfaced as whatever variant the last attempt
/// produced; nothing in the pipeline wraps them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UploadError {
    /// Invalid or missing configuration (public key, chunk size, limits)
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Caller-supplied input that cannot be uploaded as given
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Reading the source failed
    #[error("I/O error: {0}")]
    Io(String),

    /// Connection, DNS or timeout failure below HTTP
    #[error("Network error: {0}")]
    Network(String),

    /// The service kept answering 429 after the transport's own retries
    #[error("Request throttled (retry after {retry_after:?})")]
    Throttled { retry_after: Option<Duration> },

    /// The service rejected the request
    #[error("Upload API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The multipart session could not be started or completed consistently
    #[error("Multipart session error: {0}")]
    Session(String),

    /// A response body could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The caller's cancellation token fired
    #[error("Upload cancelled")]
    Cancelled,

    /// Readiness polling ran past its deadline
    #[error("Timed out after {0:?}")]
    TimedOut(Duration),
}

impl UploadError {
    /// Whether this is a user-initiated cancellation rather than a fault
    pub fn is_cancelled(&self) -> bool {
        matches!(self, UploadError::Cancelled)
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            UploadError::Config(_) | UploadError::InvalidInput(_) => EXIT_FATAL,
            UploadError::Cancelled => EXIT_CANCELLED,
            _ => EXIT_FAILED,
        }
    }

    /// Check if error is transient (safe to retry)
    pub fn is_transient(&self) -> bool {
        match self {
            UploadError::Network(_) | UploadError::Io(_) | UploadError::Throttled { .. } => true,
            UploadError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<ResilienceError> for UploadError {
    fn from(err: ResilienceError) -> Self {
        match err {
            ResilienceError::Cancelled => UploadError::Cancelled,
            ResilienceError::TimedOut(limit) => UploadError::TimedOut(limit),
            ResilienceError::InvalidConcurrency(_) => UploadError::Config(err.to_string()),
        }
    }
}

impl From<io::Error> for UploadError {
    fn from(err: io::Error) -> Self {
        UploadError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for UploadError {
    fn from(err: serde_json::Error) -> Self {
        UploadError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for UploadError {
    fn from(err: url::ParseError) -> Self {
        UploadError::Config(format!("invalid URL: {}", err))
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            UploadError::Serialization(err.to_string())
        } else if let Some(status) = err.status() {
            UploadError::Api {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_builder() {
            UploadError::Config(err.to_string())
        } else {
            UploadError::Network(err.to_string())
        }
    }
}
