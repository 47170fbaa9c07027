/*!
 * Multipart upload pipeline
 *
 * A [`MultipartSession`] opens a session with the service, uploads every
 * chunk through [`upload_part_with_retry`] with bounded concurrency, closes
 * the session and waits for server-side processing to finish.
 */

pub mod part;
pub mod session;

pub use part::{upload_part_with_retry, PartContext};
pub use session::{MultipartSession, SessionConfig, SessionHandle, SessionState, StateTransition};

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory [`UploadApi`] for unit tests

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use upflow_core_resilience::CancellationToken;

    use crate::api::UploadApi;
    use crate::error::{Result, UploadError};
    use crate::progress::{ProgressInfo, ProgressSink};
    use crate::types::{FileInfo, MultipartStartRequest, MultipartStartResponse, PartAck};

    #[derive(Debug, Default)]
    pub struct Calls {
        pub start: usize,
        pub complete: usize,
        pub info: usize,
        pub part_attempts: HashMap<usize, u32>,
        pub uploaded: Vec<(usize, Bytes)>,
    }

    /// Scripted service: `part_count` targets, optional failing part,
    /// readiness after `ready_after_polls` info calls
    #[derive(Debug, Default)]
    pub struct MockApi {
        pub part_count: Option<usize>,
        pub failing_part: Option<(usize, u32)>,
        pub start_error: Option<UploadError>,
        pub complete_error: Option<UploadError>,
        pub ready_after_polls: usize,
        pub calls: Mutex<Calls>,
    }

    impl MockApi {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing(mut self, index: usize, failures: u32) -> Self {
            self.failing_part = Some((index, failures));
            self
        }

        /// Every start call fails with `err`
        pub fn failing_start(mut self, err: UploadError) -> Self {
            self.start_error = Some(err);
            self
        }

        /// Every complete call fails with `err`
        pub fn failing_complete(mut self, err: UploadError) -> Self {
            self.complete_error = Some(err);
            self
        }

        pub fn ready_after(mut self, polls: usize) -> Self {
            self.ready_after_polls = polls;
            self
        }

        pub fn with_part_count(mut self, count: usize) -> Self {
            self.part_count = Some(count);
            self
        }
    }

    #[async_trait]
    impl UploadApi for MockApi {
        async fn multipart_start(
            &self,
            request: &MultipartStartRequest,
            _cancel: &CancellationToken,
        ) -> Result<MultipartStartResponse> {
            self.calls.lock().unwrap().start += 1;
            if let Some(err) = &self.start_error {
                return Err(err.clone());
            }
            let count = self
                .part_count
                .unwrap_or_else(|| request.size.div_ceil(5) as usize);
            Ok(MultipartStartResponse {
                uuid: "session-1".to_string(),
                parts: (0..count).map(|i| format!("https://parts/{}", i)).collect(),
            })
        }

        async fn multipart_upload_part(
            &self,
            _url: &str,
            index: usize,
            data: Bytes,
            on_progress: ProgressSink,
            _cancel: &CancellationToken,
        ) -> Result<PartAck> {
            let attempt = {
                let mut calls = self.calls.lock().unwrap();
                let attempt = calls.part_attempts.entry(index).or_insert(0);
                *attempt += 1;
                *attempt
            };

            if let Some((failing, failures)) = self.failing_part {
                if failing == index && attempt <= failures {
                    return Err(UploadError::Network(format!(
                        "part {} attempt {}",
                        index, attempt
                    )));
                }
            }

            on_progress(ProgressInfo::Computable { value: 1.0 });
            self.calls.lock().unwrap().uploaded.push((index, data));
            Ok(PartAck {
                index,
                status: 200,
                etag: None,
            })
        }

        async fn multipart_complete(
            &self,
            uuid: &str,
            _cancel: &CancellationToken,
        ) -> Result<FileInfo> {
            self.calls.lock().unwrap().complete += 1;
            if let Some(err) = &self.complete_error {
                return Err(err.clone());
            }
            Ok(FileInfo::new(uuid, self.ready_after_polls == 0))
        }

        async fn info(&self, uuid: &str, _cancel: &CancellationToken) -> Result<FileInfo> {
            let mut calls = self.calls.lock().unwrap();
            calls.info += 1;
            Ok(FileInfo::new(uuid, calls.info >= self.ready_after_polls))
        }
    }
}
