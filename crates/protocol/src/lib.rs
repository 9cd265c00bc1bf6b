//! Wire types shared by the bulkup client and any receiver.
//!
//! Everything here is plain data: the chunk upload RPC, the batch
//! completion RPC, and the status enums reported to progress sinks.

pub mod constants;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::{CHUNK_SIZE, DEFAULT_PAGE_SIZE};
pub use messages::{
    ChunkPayload, CompleteBatchRequest, CompleteBatchResponse, FileNode, UploadChunkRequest,
    UploadChunkResponse,
};
pub use types::{TaskState, TransactionProgress, TransactionStatus, UploadMode};
