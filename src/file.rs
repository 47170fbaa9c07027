//! Final file descriptor handed back to callers

use serde::Serialize;
use std::ops::Deref;

use crate::types::FileInfo;

/// A stored file, with fields derived for presentation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadedFile {
    /// Descriptor as reported by the service
    #[serde(flatten)]
    pub info: FileInfo,
    /// Public CDN address, `{base_cdn}/{uuid}/`
    pub cdn_url: String,
    /// Display name, the original file name when known
    pub name: String,
}

impl UploadedFile {
    pub fn new(info: FileInfo, base_cdn: &str) -> Self {
        let cdn_url = format!("{}/{}/", base_cdn.trim_end_matches('/'), info.uuid);
        let name = if info.original_filename.is_empty() {
            info.filename.clone()
        } else {
            info.original_filename.clone()
        };

        Self { info, cdn_url, name }
    }

    pub fn uuid(&self) -> &str {
        &self.info.uuid
    }

    pub fn into_info(self) -> FileInfo {
        self.info
    }
}

impl Deref for UploadedFile {
    type Target = FileInfo;

    fn deref(&self) -> &FileInfo {
        &self.info
    }
}
