//! Concurrency control for deferred async tasks
//!
//! [`run_with_concurrency`] keeps at most `limit` tasks in flight, filling
//! freed slots in original order, and returns results index-aligned with the
//! input regardless of completion order. Tasks are multiplexed on the
//! calling task rather than spawned, so they need neither `Send` nor
//! `'static`.

use super::error::ResilienceError;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use tracing::{debug, trace};

/// Run deferred `tasks` with at most `limit` of them in flight.
///
/// The first task to fail stops dispatch and its error is returned as-is.
/// In-flight siblings are dropped with the internal set at that point, which
/// aborts them: a dropped future runs its destructors and never resumes, so
/// an HTTP transfer inside one is torn down rather than left to finish.
///
/// # Errors
///
/// - [`ResilienceError::InvalidConcurrency`] (converted into `E`) when `limit == 0`,
///   before any task starts.
/// - The error of the first task that fails.
///
/// # Example
///
/// ```
/// use upflow_core_resilience::{run_with_concurrency, ResilienceError};
///
/// # tokio_test::block_on(async {
/// let tasks: Vec<_> = (0..4u32)
///     .map(|i| move || async move { Ok::<_, ResilienceError>(i * 10) })
///     .collect();
///
/// let results = run_with_concurrency(2, tasks).await.unwrap();
/// assert_eq!(results, vec![0, 10, 20, 30]);
/// # });
/// ```
pub async fn run_with_concurrency<F, Fut, T, E>(limit: usize, tasks: Vec<F>) -> Result<Vec<T>, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<ResilienceError>,
{
    if limit == 0 {
        return Err(ResilienceError::InvalidConcurrency(limit).into());
    }

    let total = tasks.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let mut pending = tasks.into_iter().enumerate();
    let mut in_flight = FuturesUnordered::new();
    let mut results: Vec<Option<T>> = (0..total).map(|_| None).collect();

    for (index, task) in pending.by_ref().take(limit) {
        in_flight.push(dispatch(index, task));
    }

    while let Some((index, outcome)) = in_flight.next().await {
        match outcome {
            Ok(value) => {
                trace!(index, "task settled");
                results[index] = Some(value);
            }
            Err(err) => {
                debug!(
                    index,
                    in_flight = in_flight.len(),
                    "task failed, abandoning remaining work"
                );
                return Err(err);
            }
        }

        if let Some((next, task)) = pending.next() {
            in_flight.push(dispatch(next, task));
        }
    }

    // Every slot was filled: each index is dispatched exactly once and the
    // loop only exits once all dispatched futures have settled successfully.
    Ok(results.into_iter().flatten().collect())
}

fn dispatch<F, Fut, T, E>(index: usize, task: F) -> impl Future<Output = (usize, Result<T, E>)>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    trace!(index, "dispatching task");
    async move { (index, task().await) }
}
