//! Wire and domain types for the Upload API

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// User-defined key/value metadata attached to a file
pub type Metadata = BTreeMap<String, String>;

/// Whether the service should store the file permanently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreSetting {
    /// Follow the project's auto-store setting
    #[default]
    Auto,
    /// Store the file
    Store,
    /// Leave the file temporary
    DoNotStore,
}

impl StoreSetting {
    /// Value of the `UPLOADCARE_STORE` form field
    pub fn as_form_value(&self) -> &'static str {
        match self {
            StoreSetting::Auto => "auto",
            StoreSetting::Store => "1",
            StoreSetting::DoNotStore => "0",
        }
    }
}

impl From<Option<bool>> for StoreSetting {
    fn from(store: Option<bool>) -> Self {
        match store {
            None => StoreSetting::Auto,
            Some(true) => StoreSetting::Store,
            Some(false) => StoreSetting::DoNotStore,
        }
    }
}

/// Parameters of the *start* call
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartStartRequest {
    /// Total file size in bytes
    pub size: u64,
    /// Original file name
    pub file_name: String,
    /// MIME type of the whole file
    pub content_type: String,
    /// Storing behavior
    pub store: StoreSetting,
    /// Signed-upload signature
    pub secure_signature: Option<String>,
    /// Signed-upload expiry (Unix timestamp as string)
    pub secure_expire: Option<String>,
    /// Metadata to attach
    pub metadata: Metadata,
}

/// Response of the *start* call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipartStartResponse {
    /// Session identifier, later the file UUID
    pub uuid: String,
    /// Presigned upload target for each part, in chunk order
    pub parts: Vec<String>,
}

/// Acknowledgment of one uploaded part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartAck {
    /// Chunk index the acknowledgment belongs to
    pub index: usize,
    /// HTTP status returned by the part target
    pub status: u16,
    /// Entity tag, when the target returns one
    pub etag: Option<String>,
}

/// File descriptor returned by *complete* and *info*
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub uuid: String,
    #[serde(default)]
    pub file_id: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub done: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub filename: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub original_filename: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mime_type: String,
    #[serde(default)]
    pub is_image: bool,
    #[serde(default)]
    pub is_stored: bool,
    #[serde(default)]
    pub is_ready: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Metadata,
    /// Media-specific details, kept opaque
    #[serde(default)]
    pub content_info: Option<serde_json::Value>,
}

impl FileInfo {
    /// Minimal descriptor, used by tests and mocks
    pub fn new(uuid: impl Into<String>, is_ready: bool) -> Self {
        let uuid = uuid.into();
        Self {
            file_id: uuid.clone(),
            uuid,
            size: 0,
            total: 0,
            done: 0,
            filename: String::new(),
            original_filename: String::new(),
            mime_type: String::new(),
            is_image: false,
            is_stored: false,
            is_ready,
            metadata: Metadata::new(),
            content_info: None,
        }
    }
}

/// Treat an explicit JSON `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Error envelope returned with `jsonerrors=1`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    pub status_code: u16,
    pub content: String,
}

/// Fractional progress as reported by one source
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressInfo {
    /// Progress is known; `value` lies in `[0, 1]`
    Computable { value: f64 },
    /// Total size unknown, nothing meaningful to report
    Unknown,
}

impl ProgressInfo {
    /// Computable progress built from transferred and total byte counts
    pub fn from_bytes(loaded: u64, total: Option<u64>) -> Self {
        match total {
            Some(0) => ProgressInfo::Computable { value: 1.0 },
            Some(total) => ProgressInfo::Computable {
                value: (loaded as f64 / total as f64).clamp(0.0, 1.0),
            },
            None => ProgressInfo::Unknown,
        }
    }

    /// The fraction, when computable
    pub fn value(&self) -> Option<f64> {
        match self {
            ProgressInfo::Computable { value } => Some(*value),
            ProgressInfo::Unknown => None,
        }
    }
}

impl fmt::Display for ProgressInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressInfo::Computable { value } => write!(f, "{:.1}%", value * 100.0),
            ProgressInfo::Unknown => write!(f, "unknown"),
        }
    }
}
