//! Byte sources that chunks are read from
//!
//! Chunks are extracted lazily: a part is read from its source only when
//! its upload attempt starts, so at most `max_concurrent_requests` chunks
//! are resident at once.

use async_trait::async_trait;
use bytes::Bytes;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{Result, UploadError};

/// Random-access capability every upload source provides
#[async_trait]
pub trait ChunkSource: Send + Sync {
    /// Total size in bytes
    fn len(&self) -> u64;

    /// Whether the source holds no bytes
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read `len` bytes starting at `offset`.
    ///
    /// Idempotent and side-effect free on the source: reading the same range
    /// twice yields the same bytes.
    async fn read_range(&self, offset: u64, len: u64) -> Result<Bytes>;
}

fn check_bounds(offset: u64, len: u64, total: u64) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= total => Ok(()),
        _ => Err(UploadError::InvalidInput(format!(
            "range {}+{} exceeds source length {}",
            offset, len, total
        ))),
    }
}

#[async_trait]
impl ChunkSource for Bytes {
    fn len(&self) -> u64 {
        Bytes::len(self) as u64
    }

    async fn read_range(&self, offset: u64, len: u64) -> Result<Bytes> {
        check_bounds(offset, len, ChunkSource::len(self))?;
        let start = offset as usize;
        Ok(self.slice(start..start + len as usize))
    }
}

/// A file on disk, opened afresh for every read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSource {
    path: PathBuf,
    size: u64,
}

impl FileSource {
    /// Stat `path` and remember its size
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(UploadError::InvalidInput(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        Ok(Self {
            path,
            size: metadata.len(),
        })
    }

    /// Path this source reads from
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ChunkSource for FileSource {
    fn len(&self) -> u64 {
        self.size
    }

    async fn read_range(&self, offset: u64, len: u64) -> Result<Bytes> {
        check_bounds(offset, len, self.size)?;

        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut buffer = vec![0u8; len as usize];
        file.read_exact(&mut buffer).await?;
        Ok(Bytes::from(buffer))
    }
}

/// What the caller uploads: an in-memory buffer or a file handle
#[derive(Debug, Clone)]
pub enum UploadSource {
    /// Bytes already in memory
    Bytes(Bytes),
    /// A file read range by range
    File(FileSource),
}

impl UploadSource {
    /// Source backed by a buffer
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        UploadSource::Bytes(data.into())
    }

    /// Source backed by a file on disk
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Ok(UploadSource::File(FileSource::open(path).await?))
    }

    /// Name to report to the service when the caller gives none
    pub fn file_name(&self) -> Option<String> {
        match self {
            UploadSource::Bytes(_) => None,
            UploadSource::File(file) => file
                .path()
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
        }
    }
}

#[async_trait]
impl ChunkSource for UploadSource {
    fn len(&self) -> u64 {
        match self {
            UploadSource::Bytes(data) => ChunkSource::len(data),
            UploadSource::File(file) => file.len(),
        }
    }

    async fn read_range(&self, offset: u64, len: u64) -> Result<Bytes> {
        match self {
            UploadSource::Bytes(data) => data.read_range(offset, len).await,
            UploadSource::File(file) => file.read_range(offset, len).await,
        }
    }
}
