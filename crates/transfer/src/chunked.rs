use std::collections::{BTreeSet, HashMap};
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bulkup_protocol::ChunkPayload;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::TransferError;

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// SourceHandle
// ---------------------------------------------------------------------------

/// Where a file's bytes come from.
///
/// Cloning is cheap: a path or a shared immutable buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceHandle {
    /// A file on the local filesystem.
    Path(PathBuf),
    /// An in-memory blob (dropped files, generated content).
    Memory(Arc<[u8]>),
}

impl SourceHandle {
    /// Wraps an owned buffer.
    pub fn memory(data: impl Into<Vec<u8>>) -> Self {
        let data: Vec<u8> = data.into();
        Self::Memory(Arc::from(data))
    }

    /// Current size of the source in bytes.
    pub fn size(&self) -> Result<u64, TransferError> {
        match self {
            Self::Path(path) => Ok(std::fs::metadata(path)?.len()),
            Self::Memory(data) => Ok(data.len() as u64),
        }
    }

    /// Reads exactly the bytes in `range`.
    ///
    /// Blocking: callers on an async runtime run this on the blocking pool.
    /// A source that shrank below `range.end` yields an I/O error.
    pub fn read_range(&self, range: Range<u64>) -> Result<Vec<u8>, TransferError> {
        if range.end < range.start {
            return Err(TransferError::InvalidChunk(format!(
                "inverted range {}..{}",
                range.start, range.end
            )));
        }
        let len = (range.end - range.start) as usize;
        match self {
            Self::Path(path) => {
                let mut file = std::fs::File::open(path)?;
                file.seek(SeekFrom::Start(range.start))?;
                let mut buf = vec![0u8; len];
                file.read_exact(&mut buf)?;
                Ok(buf)
            }
            Self::Memory(data) => {
                let start = range.start as usize;
                let end = range.end as usize;
                data.get(start..end).map(<[u8]>::to_vec).ok_or_else(|| {
                    TransferError::InvalidChunk(format!(
                        "range {start}..{end} out of bounds for {} bytes",
                        data.len()
                    ))
                })
            }
        }
    }

    /// Human-readable description for logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Memory(data) => format!("<memory: {} bytes>", data.len()),
        }
    }
}

// ---------------------------------------------------------------------------
// ChunkAssembler
// ---------------------------------------------------------------------------

/// Receiver-side reassembly: writes chunks to disk at `index * chunk_size`.
///
/// Delivering the same chunk index twice rewrites the same byte range, so a
/// file re-uploaded from chunk 0 after a failure converges to the same bytes.
pub struct ChunkAssembler {
    base_path: PathBuf,
    received: HashMap<String, BTreeSet<u64>>,
}

impl ChunkAssembler {
    /// Creates an assembler rooted at `base_path`.
    pub fn new(base_path: &Path) -> Self {
        Self {
            base_path: base_path.to_path_buf(),
            received: HashMap::new(),
        }
    }

    /// Writes one chunk of `destination_path`.
    ///
    /// Returns `true` once every chunk index of the upload has been seen.
    pub fn write_chunk(
        &mut self,
        destination_path: &str,
        chunk: &ChunkPayload,
    ) -> Result<bool, TransferError> {
        crate::validate_destination_path(destination_path)?;

        if chunk.chunk_size == 0 || chunk.chunk_index >= chunk.total_chunks {
            return Err(TransferError::InvalidChunk(format!(
                "chunk {} of {} (size {}) for {destination_path}",
                chunk.chunk_index, chunk.total_chunks, chunk.chunk_size
            )));
        }
        if chunk.blob.len() as u64 > chunk.chunk_size {
            return Err(TransferError::InvalidChunk(format!(
                "chunk {} carries {} bytes, more than chunk size {}",
                chunk.chunk_index,
                chunk.blob.len(),
                chunk.chunk_size
            )));
        }

        if !chunk.checksum.is_empty() && checksum_bytes(&chunk.blob) != chunk.checksum {
            return Err(TransferError::ChecksumMismatch {
                path: destination_path.to_string(),
                chunk_index: chunk.chunk_index,
            });
        }

        let full_path = self.base_path.join(destination_path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let offset = chunk.chunk_index * chunk.chunk_size;
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&full_path)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&chunk.blob)?;

        // The last chunk fixes the final length, discarding stale tail bytes.
        if chunk.chunk_index + 1 == chunk.total_chunks {
            file.set_len(offset + chunk.blob.len() as u64)?;
        }

        let seen = self.received.entry(chunk.upload_id.clone()).or_default();
        seen.insert(chunk.chunk_index);
        let complete = seen.len() as u64 == chunk.total_chunks;
        if complete {
            self.received.remove(&chunk.upload_id);
        }

        debug!(
            path = %destination_path,
            chunk = chunk.chunk_index,
            total = chunk.total_chunks,
            complete,
            "chunk written"
        );
        Ok(complete)
    }

    /// Number of distinct chunk indices received for an upload id that is
    /// still incomplete. Finished uploads are forgotten.
    pub fn received_chunks(&self, upload_id: &str) -> usize {
        self.received.get(upload_id).map_or(0, BTreeSet::len)
    }

    /// Returns the base output path.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}
