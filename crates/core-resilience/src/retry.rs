//! Retry loop with caller-owned exhaustion policy
//!
//! [`retrier`] re-invokes an async operation with an increasing attempt
//! number. It has no built-in cap: whether a failure is retried, after what
//! delay, and when to give up is decided per attempt by a [`RetryPolicy`].
//! Different call sites can therefore use different policies (capped part
//! uploads, throttle-aware transport retries, and so on).

use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Per-attempt context handed to the operation and the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryContext {
    /// 1-based attempt number
    pub attempt: u32,
}

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-invoke the operation immediately
    Retry,
    /// Re-invoke the operation after the given delay
    RetryAfter(Duration),
    /// Stop and return the last error unchanged
    Fail,
}

/// Strategy deciding whether a failed attempt is retried
pub trait RetryPolicy<E> {
    /// Inspect the failed attempt and its error
    fn decide(&mut self, ctx: &RetryContext, error: &E) -> RetryDecision;
}

/// Retry any error until `max_attempts` attempts have been made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxAttempts {
    max_attempts: u32,
    delay: Option<Duration>,
}

impl MaxAttempts {
    /// Cap at `max_attempts` total attempts, retrying immediately
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay: None,
        }
    }

    /// Wait a fixed `delay` before each retry
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Configured attempt cap
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl<E> RetryPolicy<E> for MaxAttempts {
    fn decide(&mut self, ctx: &RetryContext, _error: &E) -> RetryDecision {
        if ctx.attempt < self.max_attempts {
            self.delay
                .map_or(RetryDecision::Retry, RetryDecision::RetryAfter)
        } else {
            RetryDecision::Fail
        }
    }
}

/// Policy backed by a closure, see [`policy_fn`]
#[derive(Debug, Clone, Copy)]
pub struct PolicyFn<F>(F);

/// Wrap a closure as a [`RetryPolicy`]
///
/// ```
/// use upflow_core_resilience::{policy_fn, RetryContext, RetryDecision};
///
/// let policy = policy_fn(|ctx: &RetryContext, err: &std::io::Error| {
///     if err.kind() == std::io::ErrorKind::TimedOut && ctx.attempt < 5 {
///         RetryDecision::Retry
///     } else {
///         RetryDecision::Fail
///     }
/// });
/// # let _ = policy;
/// ```
pub fn policy_fn<E, F>(f: F) -> PolicyFn<F>
where
    F: FnMut(&RetryContext, &E) -> RetryDecision,
{
    PolicyFn(f)
}

impl<E, F> RetryPolicy<E> for PolicyFn<F>
where
    F: FnMut(&RetryContext, &E) -> RetryDecision,
{
    fn decide(&mut self, ctx: &RetryContext, error: &E) -> RetryDecision {
        (self.0)(ctx, error)
    }
}

/// Run `operation` until it succeeds or `policy` gives up.
///
/// Each retry is a fresh invocation with `attempt + 1`. When the policy
/// returns [`RetryDecision::Fail`] the error of that attempt is returned
/// without wrapping, so the original failure cause survives.
pub async fn retrier<Op, Fut, P, T, E>(mut operation: Op, mut policy: P) -> Result<T, E>
where
    Op: FnMut(RetryContext) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: RetryPolicy<E>,
{
    let mut ctx = RetryContext { attempt: 1 };

    loop {
        let err = match operation(ctx).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        match policy.decide(&ctx, &err) {
            RetryDecision::Fail => return Err(err),
            RetryDecision::Retry => {
                debug!(attempt = ctx.attempt, "attempt failed, retrying");
            }
            RetryDecision::RetryAfter(delay) => {
                debug!(attempt = ctx.attempt, ?delay, "attempt failed, retrying after delay");
                tokio::time::sleep(delay).await;
            }
        }

        ctx.attempt += 1;
    }
}
