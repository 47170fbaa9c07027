/*!
 * Upload client entry point
 *
 * [`UploadClient`] owns the settings and an [`UploadApi`] and turns a
 * source plus [`MultipartOptions`] into a ready [`UploadedFile`]. Options left
 * unset fall back to the client's settings.
 */

use std::fmt;
use std::sync::Arc;

use tracing::info;
use upflow_core_resilience::{CancellationToken, PollConfig};

use crate::api::{HttpUploadApi, UploadApi};
use crate::config::UploadSettings;
use crate::error::{Result, UploadError};
use crate::file::UploadedFile;
use crate::multipart::{MultipartSession, SessionConfig};
use crate::progress::{noop_sink, ProgressSink};
use crate::source::{ChunkSource, UploadSource};
use crate::types::{Metadata, MultipartStartRequest, StoreSetting};

/// Content type sent when the caller gives none
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// File name sent when neither the caller nor the source has one
pub const DEFAULT_FILE_NAME: &str = "original";

/// Per-upload options
#[derive(Clone, Default)]
pub struct MultipartOptions {
    pub content_type: Option<String>,
    pub file_name: Option<String>,
    /// Declared size; must equal the source length when set
    pub file_size: Option<u64>,
    pub chunk_size: Option<u64>,
    pub max_concurrent_requests: Option<usize>,
    pub max_attempts: Option<u32>,
    pub store: Option<StoreSetting>,
    pub metadata: Metadata,
    pub secure_signature: Option<String>,
    pub secure_expire: Option<String>,
    pub cancel: CancellationToken,
    pub on_progress: Option<ProgressSink>,
}

impl MultipartOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.on_progress = Some(sink);
        self
    }
}

impl fmt::Debug for MultipartOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultipartOptions")
            .field("content_type", &self.content_type)
            .field("file_name", &self.file_name)
            .field("file_size", &self.file_size)
            .field("chunk_size", &self.chunk_size)
            .field("max_concurrent_requests", &self.max_concurrent_requests)
            .field("max_attempts", &self.max_attempts)
            .field("store", &self.store)
            .field("metadata", &self.metadata)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("on_progress", &self.on_progress.is_some())
            .finish_non_exhaustive()
    }
}

/// Multipart upload client
#[derive(Clone)]
pub struct UploadClient {
    settings: UploadSettings,
    api: Arc<dyn UploadApi>,
}

impl UploadClient {
    /// Client talking HTTP to `settings.base_url`
    pub fn new(settings: UploadSettings) -> Result<Self> {
        settings.validate()?;
        let api = HttpUploadApi::new(&settings)?;
        Ok(Self {
            settings,
            api: Arc::new(api),
        })
    }

    /// Client using a caller-provided API implementation
    pub fn with_api(settings: UploadSettings, api: Arc<dyn UploadApi>) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings, api })
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    /// Whether `file_size` is large enough for the multipart path
    pub fn is_multipart(&self, file_size: u64) -> bool {
        self.settings.is_multipart(file_size)
    }

    /// Upload `source` in parts and wait until the service reports it ready
    pub async fn upload_multipart(
        &self,
        source: &UploadSource,
        options: MultipartOptions,
    ) -> Result<UploadedFile> {
        let size = source.len();
        if let Some(declared) = options.file_size {
            if declared != size {
                return Err(UploadError::InvalidInput(format!(
                    "declared size {} does not match source length {}",
                    declared, size
                )));
            }
        }

        let request = MultipartStartRequest {
            size,
            file_name: options
                .file_name
                .or_else(|| source.file_name())
                .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string()),
            content_type: options
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            store: options.store.unwrap_or(self.settings.store),
            secure_signature: options.secure_signature,
            secure_expire: options.secure_expire,
            metadata: options.metadata,
        };

        let config = self.session_config(
            options.chunk_size,
            options.max_concurrent_requests,
            options.max_attempts,
        )?;

        info!(
            file = %request.file_name,
            size,
            chunk_size = config.chunk_size,
            concurrency = config.max_concurrent_requests,
            "uploading file"
        );

        let mut session = MultipartSession::new(
            self.api.as_ref(),
            source,
            request,
            config,
            options.on_progress.unwrap_or_else(noop_sink),
            options.cancel,
        )?;
        let info = session.run().await?;

        Ok(UploadedFile::new(info, &self.settings.base_cdn))
    }

    fn session_config(
        &self,
        chunk_size: Option<u64>,
        max_concurrent_requests: Option<usize>,
        max_attempts: Option<u32>,
    ) -> Result<SessionConfig> {
        let config = SessionConfig {
            chunk_size: chunk_size.unwrap_or(self.settings.multipart_chunk_size),
            max_concurrent_requests: max_concurrent_requests
                .unwrap_or(self.settings.max_concurrent_requests),
            max_attempts: max_attempts.unwrap_or(self.settings.multipart_max_attempts),
            poll: PollConfig {
                interval: self.settings.poll_interval(),
                timeout: self.settings.poll_timeout(),
            },
        };

        if config.chunk_size == 0 {
            return Err(UploadError::Config("chunk size must be greater than zero".to_string()));
        }
        if config.max_concurrent_requests == 0 {
            return Err(UploadError::Config(
                "max concurrent requests must be at least 1".to_string(),
            ));
        }
        if config.max_attempts == 0 {
            return Err(UploadError::Config("max attempts must be at least 1".to_string()));
        }
        Ok(config)
    }
}

impl fmt::Debug for UploadClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadClient")
            .field("base_url", &self.settings.base_url)
            .field("public_key", &self.settings.public_key)
            .finish_non_exhaustive()
    }
}
