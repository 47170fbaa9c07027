//! Multipart session state machine
//!
//! ```text
//!   Idle ──start──> Started ──dispatch──> PartsUploading ──all ok──> PartsComplete
//!                                                                       │
//!   Ready <──is_ready── ServerCompleted <──complete── ServerCompleting <─┘
//!     ^                       │
//!     └──ready── PollingReadiness <──not ready
//! ```
//!
//! Any failing step moves the session to `Failed`. A start call that is
//! rejected or cancelled never reaches `Started`, so that edge is
//! `Idle -> Failed`.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use upflow_core_resilience::{cancellable, poll, run_with_concurrency, CancellationToken, PollConfig};

use super::part::{upload_part_with_retry, PartContext};
use crate::api::UploadApi;
use crate::chunk::ChunkPlan;
use crate::error::{Result, UploadError};
use crate::progress::{ProgressAggregator, ProgressInfo, ProgressSink};
use crate::source::ChunkSource;
use crate::types::{FileInfo, MultipartStartRequest, PartAck};

/// Stages of a multipart upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Started,
    PartsUploading,
    PartsComplete,
    ServerCompleting,
    ServerCompleted,
    PollingReadiness,
    /// Terminal success
    Ready,
    /// Terminal error
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Started => "started",
            SessionState::PartsUploading => "parts_uploading",
            SessionState::PartsComplete => "parts_complete",
            SessionState::ServerCompleting => "server_completing",
            SessionState::ServerCompleted => "server_completed",
            SessionState::PollingReadiness => "polling_readiness",
            SessionState::Ready => "ready",
            SessionState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Ready | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded state change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    pub from: SessionState,
    pub to: SessionState,
    pub at: Instant,
}

/// Server-side handle of an open session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    /// Opaque session token, later the file UUID
    pub uuid: String,
    /// Upload target per chunk, index-aligned with the plan
    pub part_urls: Vec<String>,
}

/// Knobs for a single session run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub chunk_size: u64,
    pub max_concurrent_requests: usize,
    pub max_attempts: u32,
    pub poll: PollConfig,
}

/// Drives one multipart upload from start to readiness
pub struct MultipartSession<'a> {
    api: &'a dyn UploadApi,
    source: &'a dyn ChunkSource,
    request: MultipartStartRequest,
    plan: ChunkPlan,
    config: SessionConfig,
    progress: ProgressSink,
    cancel: CancellationToken,
    state: SessionState,
    state_entered_at: Instant,
    handle: Option<SessionHandle>,
    transitions: Vec<StateTransition>,
}

impl<'a> MultipartSession<'a> {
    /// Prepare a session; nothing is sent until [`MultipartSession::run`].
    ///
    /// The request's `size` must match the source length.
    pub fn new(
        api: &'a dyn UploadApi,
        source: &'a dyn ChunkSource,
        request: MultipartStartRequest,
        config: SessionConfig,
        progress: ProgressSink,
        cancel: CancellationToken,
    ) -> Result<Self> {
        if request.size != source.len() {
            return Err(UploadError::InvalidInput(format!(
                "declared size {} does not match source length {}",
                request.size,
                source.len()
            )));
        }
        if config.max_attempts == 0 {
            return Err(UploadError::Config(
                "max attempts must be at least 1".to_string(),
            ));
        }
        let plan = ChunkPlan::new(request.size, config.chunk_size)?;

        Ok(Self {
            api,
            source,
            request,
            plan,
            config,
            progress,
            cancel,
            state: SessionState::Idle,
            state_entered_at: Instant::now(),
            handle: None,
            transitions: Vec::new(),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    /// Session id and part targets, once started
    pub fn handle(&self) -> Option<&SessionHandle> {
        self.handle.as_ref()
    }

    /// Every state change so far, oldest first
    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    pub fn time_in_state(&self) -> Duration {
        self.state_entered_at.elapsed()
    }

    /// Run the whole pipeline and return the ready file descriptor.
    ///
    /// A session runs once; calling this again is a session error.
    pub async fn run(&mut self) -> Result<FileInfo> {
        if self.state != SessionState::Idle {
            return Err(UploadError::Session(format!(
                "session already ran (state: {})",
                self.state
            )));
        }

        match self.drive().await {
            Ok(info) => Ok(info),
            Err(err) => {
                if err.is_cancelled() {
                    warn!(state = %self.state, "multipart upload cancelled");
                } else {
                    warn!(state = %self.state, error = %err, "multipart upload failed");
                }
                self.transition(SessionState::Failed);
                Err(err)
            }
        }
    }

    async fn drive(&mut self) -> Result<FileInfo> {
        let cancel = self.cancel.clone();

        info!(
            size = self.request.size,
            chunks = self.plan.count(),
            chunk_size = self.plan.chunk_size(),
            "starting multipart session"
        );
        let started = cancellable(&cancel, self.api.multipart_start(&self.request, &cancel)).await??;
        let handle = SessionHandle {
            uuid: started.uuid,
            part_urls: started.parts,
        };
        self.handle = Some(handle.clone());
        self.transition(SessionState::Started);

        if handle.part_urls.len() != self.plan.count() {
            return Err(UploadError::Session(format!(
                "service returned {} part targets for {} chunks",
                handle.part_urls.len(),
                self.plan.count()
            )));
        }

        self.transition(SessionState::PartsUploading);
        let acks = self.upload_parts(&handle.part_urls).await?;
        debug!(uuid = %handle.uuid, parts = acks.len(), "all parts uploaded");
        self.transition(SessionState::PartsComplete);

        self.transition(SessionState::ServerCompleting);
        let completed =
            cancellable(&cancel, self.api.multipart_complete(&handle.uuid, &cancel)).await??;
        self.transition(SessionState::ServerCompleted);
        info!(uuid = %handle.uuid, is_ready = completed.is_ready, "multipart session completed");

        if completed.is_ready {
            self.transition(SessionState::Ready);
            return Ok(completed);
        }

        self.transition(SessionState::PollingReadiness);
        let ready = self.wait_until_ready(&handle.uuid).await?;
        self.transition(SessionState::Ready);
        info!(uuid = %handle.uuid, "file is ready");
        Ok(ready)
    }

    async fn upload_parts(&self, part_urls: &[String]) -> Result<Vec<PartAck>> {
        let aggregator = ProgressAggregator::new(self.plan.count(), self.progress.clone());
        let ctx = PartContext {
            api: self.api,
            source: self.source,
            plan: &self.plan,
            max_attempts: self.config.max_attempts,
            cancel: &self.cancel,
        };

        let tasks: Vec<_> = part_urls
            .iter()
            .enumerate()
            .map(|(index, url)| {
                let reporter = aggregator.reporter_for(index);
                move || upload_part_with_retry(ctx, index, url, reporter)
            })
            .collect();

        run_with_concurrency(self.config.max_concurrent_requests, tasks).await
    }

    async fn wait_until_ready(&self, uuid: &str) -> Result<FileInfo> {
        let api = self.api;
        let progress = &self.progress;

        poll(
            |token: CancellationToken| async move {
                let info = match api.info(uuid, &token).await {
                    Ok(info) => info,
                    Err(err) => return Err(err),
                };
                if info.is_ready {
                    Ok(Some(info))
                } else {
                    debug!(uuid, "file not ready yet");
                    progress(ProgressInfo::Computable { value: 1.0 });
                    Ok(None)
                }
            },
            self.config.poll,
            &self.cancel,
        )
        .await
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.state;
        let at = Instant::now();
        debug!(from = %from, to = %to, "multipart session transition");

        self.state = to;
        self.state_entered_at = at;
        self.transitions.push(StateTransition { from, to, at });
    }
}

impl fmt::Debug for MultipartSession<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultipartSession")
            .field("state", &self.state)
            .field("plan", &self.plan)
            .field("config", &self.config)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multipart::testing::MockApi;
    use crate::progress::{noop_sink, progress_sink};
    use crate::types::{Metadata, StoreSetting};
    use bytes::Bytes;
    use std::sync::{Arc, Mutex};

    fn request(size: u64) -> MultipartStartRequest {
        MultipartStartRequest {
            size,
            file_name: "data.bin".to_string(),
            content_type: "application/octet-stream".to_string(),
            store: StoreSetting::Auto,
            secure_signature: None,
            secure_expire: None,
            metadata: Metadata::new(),
        }
    }

    fn config() -> SessionConfig {
        SessionConfig {
            chunk_size: 5,
            max_concurrent_requests: 2,
            max_attempts: 3,
            poll: PollConfig::every(Duration::from_millis(100)),
        }
    }

    fn states(session: &MultipartSession<'_>) -> Vec<SessionState> {
        session.transitions().iter().map(|t| t.to).collect()
    }

    #[tokio::test]
    async fn test_ready_on_complete_skips_polling() {
        let api = MockApi::new();
        let source = Bytes::from_static(b"0123456789abc");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink = progress_sink(move |info| sink_seen.lock().unwrap().push(info));

        let mut session = MultipartSession::new(
            &api,
            &source,
            request(13),
            config(),
            sink,
            CancellationToken::new(),
        )
        .unwrap();
        let info = session.run().await.unwrap();

        assert!(info.is_ready);
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(
            states(&session),
            vec![
                SessionState::Started,
                SessionState::PartsUploading,
                SessionState::PartsComplete,
                SessionState::ServerCompleting,
                SessionState::ServerCompleted,
                SessionState::Ready,
            ]
        );

        let calls = api.calls.lock().unwrap();
        assert_eq!(calls.complete, 1);
        assert_eq!(calls.info, 0);
        let mut uploaded = calls.uploaded.clone();
        uploaded.sort_by_key(|(index, _)| *index);
        let lens: Vec<_> = uploaded.iter().map(|(_, data)| data.len()).collect();
        assert_eq!(lens, vec![5, 5, 3]);
        assert_eq!(
            seen.lock().unwrap().last(),
            Some(&ProgressInfo::Computable { value: 1.0 })
        );
        assert_eq!(session.handle().unwrap().uuid, "session-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_ready() {
        let api = MockApi::new().ready_after(3);
        let source = Bytes::from_static(b"0123456789");
        let mut session = MultipartSession::new(
            &api,
            &source,
            request(10),
            config(),
            noop_sink(),
            CancellationToken::new(),
        )
        .unwrap();

        let info = session.run().await.unwrap();

        assert!(info.is_ready);
        assert_eq!(api.calls.lock().unwrap().info, 3);
        assert!(states(&session).contains(&SessionState::PollingReadiness));
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_exhausted_part_fails_session() {
        let api = MockApi::new().failing(1, u32::MAX);
        let source = Bytes::from_static(b"0123456789abcde");
        let mut session = MultipartSession::new(
            &api,
            &source,
            request(15),
            config(),
            noop_sink(),
            CancellationToken::new(),
        )
        .unwrap();

        let err = session.run().await.unwrap_err();

        assert_eq!(err, UploadError::Network("part 1 attempt 3".to_string()));
        assert_eq!(session.state(), SessionState::Failed);
        let calls = api.calls.lock().unwrap();
        assert_eq!(calls.part_attempts[&1], 3);
        assert_eq!(calls.complete, 0);
    }

    #[tokio::test]
    async fn test_part_count_mismatch_is_session_error() {
        let api = MockApi::new().with_part_count(1);
        let source = Bytes::from_static(b"0123456789");
        let mut session = MultipartSession::new(
            &api,
            &source,
            request(10),
            config(),
            noop_sink(),
            CancellationToken::new(),
        )
        .unwrap();

        assert!(matches!(session.run().await, Err(UploadError::Session(_))));
        assert_eq!(
            states(&session),
            vec![SessionState::Started, SessionState::Failed]
        );
        assert!(api.calls.lock().unwrap().part_attempts.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_start_is_fatal() {
        let rejection = UploadError::Api {
            status: 403,
            message: "pub_key is invalid.".to_string(),
        };
        let api = MockApi::new().failing_start(rejection.clone());
        let source = Bytes::from_static(b"0123456789");
        let mut session = MultipartSession::new(
            &api,
            &source,
            request(10),
            config(),
            noop_sink(),
            CancellationToken::new(),
        )
        .unwrap();

        let err = session.run().await.unwrap_err();

        assert_eq!(err, rejection);
        assert_eq!(states(&session), vec![SessionState::Failed]);
        assert_eq!(session.transitions()[0].from, SessionState::Idle);
        assert!(session.handle().is_none());
        let calls = api.calls.lock().unwrap();
        assert_eq!(calls.start, 1);
        assert!(calls.part_attempts.is_empty());
        assert_eq!(calls.complete, 0);
        assert_eq!(calls.info, 0);
    }

    #[tokio::test]
    async fn test_failed_complete_is_fatal() {
        let failure = UploadError::Network("connection reset".to_string());
        let api = MockApi::new().failing_complete(failure.clone());
        let source = Bytes::from_static(b"0123456789");
        let mut session = MultipartSession::new(
            &api,
            &source,
            request(10),
            config(),
            noop_sink(),
            CancellationToken::new(),
        )
        .unwrap();

        let err = session.run().await.unwrap_err();

        assert_eq!(err, failure);
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(
            states(&session),
            vec![
                SessionState::Started,
                SessionState::PartsUploading,
                SessionState::PartsComplete,
                SessionState::ServerCompleting,
                SessionState::Failed,
            ]
        );
        let calls = api.calls.lock().unwrap();
        assert_eq!(calls.start, 1);
        assert_eq!(calls.uploaded.len(), 2);
        assert_eq!(calls.complete, 1);
        assert_eq!(calls.info, 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let api = MockApi::new();
        let source = Bytes::from_static(b"0123456789");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut session =
            MultipartSession::new(&api, &source, request(10), config(), noop_sink(), cancel)
                .unwrap();

        let err = session.run().await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(api.calls.lock().unwrap().start, 0);
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_session_runs_once() {
        let api = MockApi::new();
        let source = Bytes::from_static(b"01234");
        let mut session = MultipartSession::new(
            &api,
            &source,
            request(5),
            config(),
            noop_sink(),
            CancellationToken::new(),
        )
        .unwrap();

        session.run().await.unwrap();
        assert!(matches!(session.run().await, Err(UploadError::Session(_))));
        assert_eq!(api.calls.lock().unwrap().start, 1);
    }

    #[test]
    fn test_declared_size_must_match_source() {
        let api = MockApi::new();
        let source = Bytes::from_static(b"01234");
        let result = MultipartSession::new(
            &api,
            &source,
            request(6),
            config(),
            noop_sink(),
            CancellationToken::new(),
        );
        assert!(matches!(result, Err(UploadError::InvalidInput(_))));
    }

    #[test]
    fn test_state_names() {
        assert_eq!(SessionState::PollingReadiness.to_string(), "polling_readiness");
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::ServerCompleted.is_terminal());
    }
}
