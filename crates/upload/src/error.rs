//! Upload error types.

/// One chunk of one file could not be delivered.
///
/// Only the owning file is marked failed; the rest of the batch continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("chunk {chunk_index} of {destination_path} failed: {message}")]
pub struct ChunkTransferError {
    pub destination_path: String,
    pub chunk_index: u64,
    pub message: String,
}

/// The batch completion call was not acknowledged.
///
/// The transaction stays open; running the coordinator again retries only
/// the completion call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transaction {transaction_id} not completed: {reason}")]
pub struct TransactionIncompleteError {
    pub transaction_id: String,
    pub reason: String,
}

/// Errors produced by the upload flow.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    DirectoryRead(#[from] bulkup_file_ops::DirectoryReadError),

    #[error(transparent)]
    ChunkTransfer(#[from] ChunkTransferError),

    #[error(transparent)]
    TransactionIncomplete(#[from] TransactionIncompleteError),

    #[error("transaction {0} is closed")]
    TransactionClosed(String),

    #[error("worker pool closed")]
    WorkerPoolClosed,

    #[error("transfer error: {0}")]
    Transfer(#[from] bulkup_transfer::TransferError),
}
