//! Cancellation helper
//!
//! Every suspension point in the upload pipeline is raced against one
//! caller-supplied [`CancellationToken`]. Futures that lose the race are
//! dropped; requests already handed to the network are not forcibly torn
//! down beyond what dropping the future does.

use super::error::ResilienceError;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Run `future` unless `token` fires first.
///
/// An already-cancelled token wins without polling `future` at all.
pub async fn cancellable<F, T>(token: &CancellationToken, future: F) -> Result<T, ResilienceError>
where
    F: Future<Output = T>,
{
    if token.is_cancelled() {
        return Err(ResilienceError::Cancelled);
    }

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ResilienceError::Cancelled),
        output = future => Ok(output),
    }
}
