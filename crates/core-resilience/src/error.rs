//! Error type shared by the resilience primitives

use std::time::Duration;
use thiserror::Error;

/// Failures raised by the primitives themselves, as opposed to the
/// operations they drive.
///
/// Callers fold these into their own error type through `From`, which is
/// why every generic entry point in this crate is bounded on
/// `E: From<ResilienceError>`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResilienceError {
    /// The shared cancellation token fired
    #[error("operation cancelled")]
    Cancelled,

    /// A poll loop exceeded its overall deadline
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// A concurrency limit of zero can never make progress
    #[error("invalid concurrency limit: {0} (must be at least 1)")]
    InvalidConcurrency(usize),
}

impl ResilienceError {
    /// Whether this error came from the cancellation token
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ResilienceError::Cancelled)
    }
}
