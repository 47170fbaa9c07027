/*!
 * Upflow - chunked multipart uploads with bounded concurrency
 *
 * A client library that uploads large files to the Upload API:
 * - Lazy chunk planning over in-memory buffers or files on disk
 * - Part uploads with a capped per-part retry policy
 * - Bounded parallelism with index-aligned results
 * - One aggregated progress signal for the whole file
 * - Readiness polling after the session is completed
 * - Cancellation threaded through every network call
 */

pub mod api;
pub mod chunk;
pub mod client;
pub mod config;
pub mod error;
pub mod file;
pub mod logging;
pub mod multipart;
pub mod progress;
pub mod source;
pub mod transport;
pub mod types;

#[cfg(test)]
mod test_server;

// Re-export commonly used types
pub use api::{HttpUploadApi, UploadApi};
pub use chunk::{ChunkPlan, ChunkRange};
pub use client::{MultipartOptions, UploadClient};
pub use config::{LogLevel, UploadSettings};
pub use error::{Result, UploadError};
pub use file::UploadedFile;
pub use multipart::{MultipartSession, SessionConfig, SessionState};
pub use progress::{progress_sink, ProgressAggregator, ProgressInfo, ProgressSink};
pub use source::{ChunkSource, FileSource, UploadSource};
pub use types::{FileInfo, Metadata, MultipartStartRequest, MultipartStartResponse, PartAck, StoreSetting};
pub use upflow_core_resilience::{CancellationToken, PollConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
