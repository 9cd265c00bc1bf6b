use bulkup_protocol::FileNode;

/// Events emitted during an upload for UI updates.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// First `run()` of a transaction.
    TransactionStarted {
        transaction_id: String,
        total_files: usize,
        total_bytes: u64,
    },
    /// One chunk confirmed by the receiver.
    ChunkUploaded {
        transaction_id: String,
        destination_path: String,
        chunk_index: u64,
        total_chunks: u64,
        bytes: u64,
    },
    FileCompleted {
        transaction_id: String,
        destination_path: String,
        file_node: Option<FileNode>,
    },
    FileFailed {
        transaction_id: String,
        destination_path: String,
        error: String,
    },
    /// Dispatch halted; in-flight chunks may still land.
    Paused { transaction_id: String },
    /// The completion call was acknowledged.
    BatchCompleted {
        transaction_id: String,
        completed_files: usize,
        failed_files: usize,
    },
}

/// One file that did not make it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub destination_path: String,
    pub error: String,
}

/// Final tally of a closed transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub transaction_id: String,
    pub completed_files: usize,
    pub failed_files: usize,
    pub failures: Vec<FileFailure>,
    /// Receiver-indexed nodes for completed files that reported one.
    pub file_nodes: Vec<FileNode>,
}

impl BatchOutcome {
    pub fn has_failures(&self) -> bool {
        self.failed_files > 0
    }
}

/// What a call to `run()` ended with.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(BatchOutcome),
    Paused,
}
