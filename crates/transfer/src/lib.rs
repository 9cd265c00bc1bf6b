//! Chunked transfer primitives: source slicing, chunk planning,
//! per-file and per-batch bookkeeping, and receiver-side reassembly.

mod chunked;
mod planner;
mod progress;
mod types;
mod validation;

pub use chunked::{ChunkAssembler, SourceHandle, checksum_bytes};
pub use planner::ChunkPlanner;
pub use progress::ThroughputMeter;
pub use types::{FileUploadTask, UploadTransaction};
pub use validation::{join_destination, validate_destination_path};

pub use bulkup_protocol::CHUNK_SIZE;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch for chunk {chunk_index} of {path}")]
    ChecksumMismatch { path: String, chunk_index: u64 },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid chunk: {0}")]
    InvalidChunk(String),

    #[error("invalid state transition: {0}")]
    InvalidState(String),
}
