//! Generic readiness poll loop
//!
//! [`poll`] repeatedly invokes a check until it yields a value, fails, the
//! optional deadline passes, or the cancellation token fires. It knows
//! nothing about what "ready" means; the check answers `Ok(None)` for
//! "not yet" and `Ok(Some(value))` to finish.

use super::cancel::cancellable;
use super::error::ResilienceError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Default pause between two checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Timing for a poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Pause between a "not yet" answer and the next check
    pub interval: Duration,
    /// Overall deadline; `None` polls until ready or cancelled
    pub timeout: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }
}

impl PollConfig {
    /// Poll every `interval` with no deadline
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            timeout: None,
        }
    }

    /// Give up after `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Poll `check` until it produces a value.
///
/// The first check runs immediately. The check receives a clone of the
/// token so it can forward cancellation into its own I/O. Cancelling the
/// token aborts both an in-flight check and a pending wait.
///
/// # Errors
///
/// - [`ResilienceError::Cancelled`] when `cancel` fires, including before the
///   first check (in which case `check` is never invoked).
/// - [`ResilienceError::TimedOut`] when `config.timeout` elapses.
/// - Any error returned by `check`, unchanged.
pub async fn poll<C, Fut, T, E>(
    mut check: C,
    config: PollConfig,
    cancel: &CancellationToken,
) -> Result<T, E>
where
    C: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    E: From<ResilienceError>,
{
    if cancel.is_cancelled() {
        return Err(ResilienceError::Cancelled.into());
    }

    let ticks = async {
        let mut iteration = 0u32;
        loop {
            iteration += 1;
            match check(cancel.clone()).await {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => trace!(iteration, "not ready yet"),
                Err(err) => return Err(err),
            }
            tokio::time::sleep(config.interval).await;
        }
    };

    let bounded = async {
        match config.timeout {
            Some(limit) => match tokio::time::timeout(limit, ticks).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ResilienceError::TimedOut(limit).into()),
            },
            None => ticks.await,
        }
    };

    match cancellable(cancel, bounded).await {
        Ok(outcome) => outcome,
        Err(err) => Err(err.into()),
    }
}
