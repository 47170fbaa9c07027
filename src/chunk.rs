//! Chunk planning for multipart uploads
//!
//! A [`ChunkPlan`] is pure arithmetic over `(file_size, chunk_size)`: it
//! never touches the source. Bytes for chunk `i` are pulled on demand with
//! [`ChunkPlan::read_chunk`].

use bytes::Bytes;

use crate::error::{Result, UploadError};
use crate::source::ChunkSource;

/// Byte range of one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkRange {
    /// 0-based chunk index
    pub index: usize,
    /// First byte of the chunk
    pub offset: u64,
    /// Number of bytes in the chunk
    pub len: u64,
}

impl ChunkRange {
    /// One past the last byte
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Deterministic split of a file into fixed-size chunks
///
/// Every chunk has `chunk_size` bytes except the last, which holds the
/// remainder and is never empty. A zero-byte file has zero chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    file_size: u64,
    chunk_size: u64,
    count: usize,
}

impl ChunkPlan {
    /// Plan chunks for `file_size` bytes.
    ///
    /// # Errors
    ///
    /// [`UploadError::Config`] when `chunk_size == 0`.
    pub fn new(file_size: u64, chunk_size: u64) -> Result<Self> {
        if chunk_size == 0 {
            return Err(UploadError::Config(
                "chunk size must be greater than zero".to_string(),
            ));
        }

        let count = usize::try_from(file_size.div_ceil(chunk_size)).map_err(|_| {
            UploadError::InvalidInput(format!(
                "{} bytes in {}-byte chunks is too many parts",
                file_size, chunk_size
            ))
        })?;

        Ok(Self {
            file_size,
            chunk_size,
            count,
        })
    }

    /// Number of chunks
    pub fn count(&self) -> usize {
        self.count
    }

    /// Planned file size
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Nominal chunk size
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Range of chunk `index`, or `None` past the end
    pub fn range(&self, index: usize) -> Option<ChunkRange> {
        if index >= self.count {
            return None;
        }
        let offset = index as u64 * self.chunk_size;
        let len = self.chunk_size.min(self.file_size - offset);
        Some(ChunkRange { index, offset, len })
    }

    /// All ranges in index order
    pub fn ranges(&self) -> impl Iterator<Item = ChunkRange> + '_ {
        (0..self.count).filter_map(move |index| self.range(index))
    }

    /// Read the bytes of chunk `index` from `source`
    pub async fn read_chunk<S>(&self, source: &S, index: usize) -> Result<Bytes>
    where
        S: ChunkSource + ?Sized,
    {
        let range = self.range(index).ok_or_else(|| {
            UploadError::InvalidInput(format!(
                "chunk {} out of range ({} chunks)",
                index, self.count
            ))
        })?;
        source.read_range(range.offset, range.len).await
    }
}
