use std::io::Read;
use std::ops::Range;
use std::path::Path;

use crate::UploadError;

/// Chunk plan for one file: fixed chunk size, last chunk possibly
/// shorter.
///
/// The byte ranges are contiguous, non-overlapping, and cover the
/// file exactly once; concatenating all chunks in index order
/// reproduces the source bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    total_size: u64,
    chunk_size: u64,
    total_chunks: u32,
}

impl ChunkPlan {
    /// Computes the plan for a file of `total_size` bytes.
    ///
    /// Zero-byte files are rejected: a zero-chunk session is not a
    /// valid transfer.
    pub fn new(total_size: u64, chunk_size: u64) -> Result<Self, UploadError> {
        if total_size == 0 {
            return Err(UploadError::EmptyFile);
        }
        if chunk_size == 0 {
            return Err(UploadError::InvalidChunkSize(chunk_size));
        }
        let total_chunks = total_size.div_ceil(chunk_size);
        let total_chunks =
            u32::try_from(total_chunks).map_err(|_| UploadError::TooManyChunks(total_chunks))?;
        Ok(Self {
            total_size,
            chunk_size,
            total_chunks,
        })
    }

    /// Total byte length of the source file.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Configured maximum bytes per chunk.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Number of chunks: `ceil(total_size / chunk_size)`.
    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    /// Byte range of chunk `index` (0-based).
    ///
    /// # Panics
    ///
    /// Panics if `index >= total_chunks`.
    pub fn range(&self, index: u32) -> Range<u64> {
        assert!(index < self.total_chunks, "chunk index out of range");
        let start = index as u64 * self.chunk_size;
        let end = (start + self.chunk_size).min(self.total_size);
        start..end
    }

    /// Byte length of chunk `index`.
    pub fn len_of(&self, index: u32) -> u64 {
        let r = self.range(index);
        r.end - r.start
    }
}

/// One bounded-size slice of the source file.
#[derive(Debug, Clone)]
pub struct FileChunk {
    /// Zero-based position in the sequence.
    pub index: u32,
    /// Payload bytes for this chunk.
    pub data: Vec<u8>,
}

/// Reads a file in plan order, strictly increasing index.
pub struct ChunkReader {
    file: std::fs::File,
    plan: ChunkPlan,
    next_index: u32,
}

impl ChunkReader {
    /// Opens `path` for chunked reading against `plan`.
    ///
    /// Fails if the file's current size no longer matches the plan
    /// (the file changed between selection and upload).
    pub fn new(path: &Path, plan: ChunkPlan) -> Result<Self, UploadError> {
        let file = std::fs::File::open(path)?;
        let size = file.metadata()?.len();
        if size != plan.total_size() {
            return Err(UploadError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "file size changed: planned {} bytes, found {size}",
                    plan.total_size()
                ),
            )));
        }
        Ok(Self {
            file,
            plan,
            next_index: 0,
        })
    }

    /// Reads the next chunk. Returns `None` past the last chunk.
    pub fn next_chunk(&mut self) -> Result<Option<FileChunk>, UploadError> {
        if self.next_index >= self.plan.total_chunks() {
            return Ok(None);
        }
        let index = self.next_index;
        let mut data = vec![0u8; self.plan.len_of(index) as usize];
        self.file.read_exact(&mut data)?;
        self.next_index += 1;
        Ok(Some(FileChunk { index, data }))
    }

    /// The plan this reader follows.
    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }
}
