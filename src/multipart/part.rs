//! Per-part upload with a capped retry policy

use tracing::{debug, warn};
use upflow_core_resilience::{cancellable, policy_fn, retrier, CancellationToken, RetryContext, RetryDecision};

use crate::api::UploadApi;
use crate::chunk::ChunkPlan;
use crate::error::{Result, UploadError};
use crate::progress::ProgressSink;
use crate::source::ChunkSource;
use crate::types::PartAck;

/// Everything one part upload needs besides its index and target
#[derive(Clone, Copy)]
pub struct PartContext<'a> {
    pub api: &'a dyn UploadApi,
    pub source: &'a dyn ChunkSource,
    pub plan: &'a ChunkPlan,
    pub max_attempts: u32,
    pub cancel: &'a CancellationToken,
}

/// Upload chunk `index` to `url`, retrying until `max_attempts` is reached.
///
/// The chunk is re-read from the source on every attempt. Cancellation is
/// never retried. When attempts run out the last error is returned as-is.
pub async fn upload_part_with_retry(
    ctx: PartContext<'_>,
    index: usize,
    url: &str,
    reporter: ProgressSink,
) -> Result<PartAck> {
    let max_attempts = ctx.max_attempts;
    let policy = policy_fn(move |retry: &RetryContext, err: &UploadError| {
        if retry.attempt < max_attempts && !err.is_cancelled() {
            warn!(
                part = index,
                attempt = retry.attempt,
                max_attempts,
                error = %err,
                "part upload failed, retrying"
            );
            RetryDecision::Retry
        } else {
            RetryDecision::Fail
        }
    });

    let ack = retrier(
        |retry| {
            let reporter = reporter.clone();
            async move {
                let data = ctx.plan.read_chunk(ctx.source, index).await?;
                debug!(part = index, attempt = retry.attempt, bytes = data.len(), "uploading part");
                let upload = ctx
                    .api
                    .multipart_upload_part(url, index, data, reporter, ctx.cancel);
                match cancellable(ctx.cancel, upload).await {
                    Ok(result) => result,
                    Err(err) => Err(err.into()),
                }
            }
        },
        policy,
    )
    .await?;

    debug!(part = index, status = ack.status, "part uploaded");
    Ok(ack)
}
