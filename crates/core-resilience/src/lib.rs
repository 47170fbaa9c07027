//! Upflow Core Resilience: pure-logic async primitives
//!
//! # Overview
//!
//! This crate provides the building blocks the upload pipeline composes to
//! turn many concurrent, failure-prone network operations into one logical
//! result:
//!
//! - **Concurrency Limiter**: runs deferred tasks with at most K in flight,
//!   keeping results index-aligned with the input
//! - **Retrier**: re-invokes an operation with an attempt counter while a
//!   caller-supplied policy says so
//! - **Readiness Poller**: repeats a check at an interval until it yields a
//!   value, times out, or is cancelled
//! - **Cancellation**: races any future against a shared token
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - HTTP, authentication, or the upload service
//! - What the tasks it schedules actually do
//!
//! All primitives run on the caller's task. Nothing is spawned, so tasks may
//! borrow from the caller and need not be `Send`.
//!
//! # Usage Example
//!
//! ```no_run
//! use upflow_core_resilience::{retrier, run_with_concurrency, MaxAttempts, ResilienceError};
//!
//! # async fn example() -> Result<(), ResilienceError> {
//! let tasks: Vec<_> = (0..8u32)
//!     .map(|part| {
//!         move || async move {
//!             retrier(
//!                 |ctx| async move {
//!                     // Upload `part`; `ctx.attempt` starts at 1
//!                     let _ = ctx;
//!                     Ok::<_, ResilienceError>(part)
//!                 },
//!                 MaxAttempts::new(3),
//!             )
//!             .await
//!         }
//!     })
//!     .collect();
//!
//! let parts = run_with_concurrency(4, tasks).await?;
//! assert_eq!(parts.len(), 8);
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod concurrency;
pub mod error;
pub mod poll;
pub mod retry;

// Re-export main types for convenience
pub use cancel::cancellable;
pub use concurrency::run_with_concurrency;
pub use error::ResilienceError;
pub use poll::{poll, PollConfig, DEFAULT_POLL_INTERVAL};
pub use retry::{policy_fn, retrier, MaxAttempts, PolicyFn, RetryContext, RetryDecision, RetryPolicy};

pub use tokio_util::sync::CancellationToken;

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use upflow_core_resilience::prelude::*;
/// ```
pub mod prelude {
    pub use super::cancel::cancellable;
    pub use super::concurrency::run_with_concurrency;
    pub use super::error::ResilienceError;
    pub use super::poll::{poll, PollConfig};
    pub use super::retry::{policy_fn, retrier, MaxAttempts, RetryContext, RetryDecision, RetryPolicy};
    pub use tokio_util::sync::CancellationToken;
}
