/*!
 * Configuration types for Upflow
 */

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, UploadError};
use crate::types::StoreSetting;

/// Default Upload API endpoint
pub const DEFAULT_BASE_URL: &str = "https://upload.uploadcare.com";

/// Default CDN used to build file URLs
pub const DEFAULT_BASE_CDN: &str = "https://ucarecdn.com";

/// Default multipart chunk size (5 MiB)
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Files at least this large should go through the multipart path (25 MiB)
pub const DEFAULT_MULTIPART_MIN_FILE_SIZE: u64 = 25 * 1024 * 1024;

/// Settings shared by every upload made through one client
///
/// Every optional per-call parameter falls back to a field here. The struct
/// is passed by value into the client; there is no process-wide default
/// object to mutate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    /// Project public key, required for every Upload API call
    pub public_key: String,

    /// Secret key; enables `Uploadcare.Simple` authorization headers
    pub secret_key: Option<String>,

    /// Upload API base URL
    pub base_url: String,

    /// CDN base used for derived file URLs
    pub base_cdn: String,

    /// Chunk size in bytes for multipart uploads
    pub multipart_chunk_size: u64,

    /// Minimum file size for which multipart upload is recommended
    pub multipart_min_file_size: u64,

    /// Maximum number of part uploads in flight
    pub max_concurrent_requests: usize,

    /// Attempts per part before the whole upload fails
    pub multipart_max_attempts: u32,

    /// How many times a 429 response is retried by the transport
    pub retry_throttled_max_times: u32,

    /// How many times a connection-level failure is retried by the transport
    pub retry_network_error_max_times: u32,

    /// Wait before retrying a throttled request without `Retry-After`
    pub throttle_backoff_ms: u64,

    /// Wait before retrying a connection-level failure
    pub network_backoff_ms: u64,

    /// Pause between readiness checks
    pub poll_interval_ms: u64,

    /// Give up waiting for readiness after this long (None = wait until cancelled)
    pub poll_timeout_ms: Option<u64>,

    /// Default storing behavior for uploaded files
    pub store: StoreSetting,

    /// Upload source tag sent with the start call
    pub source: String,

    /// Integration name appended to the user agent
    pub integration: Option<String>,

    /// Log level for diagnostic output
    pub log_level: LogLevel,

    /// Log file path (None = stdout)
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    pub verbose: bool,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            public_key: String::new(),
            secret_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            base_cdn: DEFAULT_BASE_CDN.to_string(),
            multipart_chunk_size: DEFAULT_CHUNK_SIZE,
            multipart_min_file_size: DEFAULT_MULTIPART_MIN_FILE_SIZE,
            max_concurrent_requests: 4,
            multipart_max_attempts: 3,
            retry_throttled_max_times: 1,
            retry_network_error_max_times: 3,
            throttle_backoff_ms: 1000,
            network_backoff_ms: 1000,
            poll_interval_ms: 500,
            poll_timeout_ms: None,
            store: StoreSetting::Auto,
            source: "local".to_string(),
            integration: None,
            log_level: LogLevel::Info,
            log_file: None,
            verbose: false,
        }
    }
}

impl UploadSettings {
    /// Settings for a project identified by `public_key`
    pub fn new(public_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            ..Default::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| UploadError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| UploadError::Config(format!("failed to serialize settings: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.public_key.trim().is_empty() {
            return Err(UploadError::Config("public key is required".to_string()));
        }
        if self.multipart_chunk_size == 0 {
            return Err(UploadError::Config(
                "multipart chunk size must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent_requests == 0 {
            return Err(UploadError::Config(
                "max concurrent requests must be at least 1".to_string(),
            ));
        }
        if self.multipart_max_attempts == 0 {
            return Err(UploadError::Config(
                "multipart max attempts must be at least 1".to_string(),
            ));
        }
        url::Url::parse(&self.base_url)?;
        Ok(())
    }

    /// Pause between readiness checks
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Readiness deadline, if any
    pub fn poll_timeout(&self) -> Option<Duration> {
        self.poll_timeout_ms.map(Duration::from_millis)
    }

    /// Fixed wait used when a 429 carries no `Retry-After`
    pub fn throttle_backoff(&self) -> Duration {
        Duration::from_millis(self.throttle_backoff_ms)
    }

    /// Fixed wait between connection-level retries
    pub fn network_backoff(&self) -> Duration {
        Duration::from_millis(self.network_backoff_ms)
    }

    /// Whether a file of `file_size` bytes should use the multipart path
    pub fn is_multipart(&self, file_size: u64) -> bool {
        file_size >= self.multipart_min_file_size
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Informational messages
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}
