use std::ops::Range;

use bulkup_protocol::{TaskState, TransactionStatus};
use chrono::{DateTime, Utc};

use crate::{SourceHandle, TransferError};

// ---------------------------------------------------------------------------
// FileUploadTask
// ---------------------------------------------------------------------------

/// Upload state of one file within a transaction.
///
/// The chunk geometry is fixed at construction; only the cursor and the
/// state move, and only forward.
#[derive(Debug, Clone)]
pub struct FileUploadTask {
    destination_path: String,
    source: SourceHandle,
    size_bytes: u64,
    chunk_size: u64,
    total_chunks: u64,
    next_chunk_index: u64,
    state: TaskState,
    transaction_id: String,
}

impl FileUploadTask {
    pub(crate) fn new(
        destination_path: String,
        source: SourceHandle,
        size_bytes: u64,
        chunk_size: u64,
        transaction_id: String,
    ) -> Self {
        Self {
            destination_path,
            source,
            size_bytes,
            chunk_size,
            total_chunks: size_bytes.div_ceil(chunk_size),
            next_chunk_index: 0,
            state: TaskState::Queued,
            transaction_id,
        }
    }

    pub fn destination_path(&self) -> &str {
        &self.destination_path
    }

    pub fn source(&self) -> &SourceHandle {
        &self.source
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn total_chunks(&self) -> u64 {
        self.total_chunks
    }

    pub fn next_chunk_index(&self) -> u64 {
        self.next_chunk_index
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    /// Last segment of the destination path.
    pub fn filename(&self) -> &str {
        self.destination_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.destination_path)
    }

    /// Byte range covered by chunk `index`, or `None` past the last chunk.
    pub fn chunk_range(&self, index: u64) -> Option<Range<u64>> {
        if index >= self.total_chunks {
            return None;
        }
        let start = index * self.chunk_size;
        let end = (start + self.chunk_size).min(self.size_bytes);
        Some(start..end)
    }

    /// Bytes confirmed by the receiver so far.
    pub fn bytes_transferred(&self) -> u64 {
        (self.next_chunk_index * self.chunk_size).min(self.size_bytes)
    }

    /// `Queued -> Uploading`. Calling it again while uploading is a no-op.
    pub fn start(&mut self) -> Result<(), TransferError> {
        match self.state {
            TaskState::Queued => {
                self.state = TaskState::Uploading;
                Ok(())
            }
            TaskState::Uploading => Ok(()),
            other => Err(TransferError::InvalidState(format!(
                "cannot start {} in state {other:?}",
                self.destination_path
            ))),
        }
    }

    /// Records one confirmed chunk.
    ///
    /// Returns `true` when this was the last chunk; the task is then `Done`.
    pub fn advance(&mut self) -> Result<bool, TransferError> {
        if self.state != TaskState::Uploading {
            return Err(TransferError::InvalidState(format!(
                "cannot advance {} in state {:?}",
                self.destination_path, self.state
            )));
        }
        if self.next_chunk_index >= self.total_chunks {
            return Err(TransferError::InvalidState(format!(
                "{} already received all {} chunks",
                self.destination_path, self.total_chunks
            )));
        }
        self.next_chunk_index += 1;
        if self.next_chunk_index == self.total_chunks {
            self.state = TaskState::Done;
            return Ok(true);
        }
        Ok(false)
    }

    /// Finishes a task that has nothing to transfer (zero-byte source).
    pub fn finish_empty(&mut self) -> Result<(), TransferError> {
        if self.total_chunks != 0 || self.state.is_terminal() {
            return Err(TransferError::InvalidState(format!(
                "{} is not an empty pending task",
                self.destination_path
            )));
        }
        self.state = TaskState::Done;
        Ok(())
    }

    /// Marks the task failed. Terminal states are left untouched.
    pub fn fail(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = TaskState::Failed;
        true
    }

    /// A fresh copy of this task for another transaction, back at chunk 0.
    ///
    /// Partial receiver state for a failed index is not trusted, so a retry
    /// always starts over.
    pub fn restarted(&self, transaction_id: &str) -> Self {
        Self {
            next_chunk_index: 0,
            state: TaskState::Queued,
            transaction_id: transaction_id.to_string(),
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// UploadTransaction
// ---------------------------------------------------------------------------

/// Server-tracked grouping of every file in one user-initiated batch.
#[derive(Debug, Clone)]
pub struct UploadTransaction {
    id: String,
    created_at: DateTime<Utc>,
    total_files: usize,
    completed_files: usize,
    failed_files: usize,
    status: TransactionStatus,
}

impl UploadTransaction {
    /// Creates a pending transaction for `total_files` files.
    pub fn new(id: String, total_files: usize) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            total_files,
            completed_files: 0,
            failed_files: 0,
            status: TransactionStatus::Pending,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn total_files(&self) -> usize {
        self.total_files
    }

    pub fn completed_files(&self) -> usize {
        self.completed_files
    }

    pub fn failed_files(&self) -> usize {
        self.failed_files
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn has_failures(&self) -> bool {
        self.failed_files > 0
    }

    /// Every file has either completed or failed.
    pub fn is_accounted_for(&self) -> bool {
        self.completed_files + self.failed_files == self.total_files
    }

    /// Registers one more file before any file has been accounted for.
    pub fn add_file(&mut self) -> Result<(), TransferError> {
        if self.status != TransactionStatus::Pending || self.completed_files + self.failed_files > 0 {
            return Err(self.closed_error("add a file to", self.status));
        }
        self.total_files += 1;
        Ok(())
    }

    /// `Pending -> InProgress` (first start or resume).
    pub fn start(&mut self) -> Result<(), TransferError> {
        match self.status {
            TransactionStatus::Pending | TransactionStatus::InProgress => {
                self.status = TransactionStatus::InProgress;
                Ok(())
            }
            other => Err(self.closed_error("start", other)),
        }
    }

    /// `InProgress -> Pending` while dispatch is halted.
    pub fn pause(&mut self) -> Result<(), TransferError> {
        match self.status {
            TransactionStatus::Pending | TransactionStatus::InProgress => {
                self.status = TransactionStatus::Pending;
                Ok(())
            }
            other => Err(self.closed_error("pause", other)),
        }
    }

    pub fn record_completed(&mut self) -> Result<(), TransferError> {
        self.ensure_room("complete")?;
        self.completed_files += 1;
        Ok(())
    }

    pub fn record_failed(&mut self) -> Result<(), TransferError> {
        self.ensure_room("fail")?;
        self.failed_files += 1;
        Ok(())
    }

    /// Closes the transaction after the completion signal was acknowledged.
    pub fn close(&mut self) -> Result<(), TransferError> {
        if !self.is_accounted_for() {
            return Err(TransferError::InvalidState(format!(
                "transaction {} has {} of {} files outstanding",
                self.id,
                self.total_files - self.completed_files - self.failed_files,
                self.total_files
            )));
        }
        if self.status.is_closed() {
            return Err(self.closed_error("close", self.status));
        }
        self.status = TransactionStatus::Completed;
        Ok(())
    }

    /// Gives up on the transaction; no completion signal will be sent.
    pub fn abandon(&mut self) -> Result<(), TransferError> {
        if self.status.is_closed() {
            return Err(self.closed_error("abandon", self.status));
        }
        self.status = TransactionStatus::Failed;
        Ok(())
    }

    fn ensure_room(&self, action: &str) -> Result<(), TransferError> {
        if self.status.is_closed() {
            return Err(self.closed_error(action, self.status));
        }
        if self.is_accounted_for() {
            return Err(TransferError::InvalidState(format!(
                "cannot {action} a file in transaction {}: all {} files accounted for",
                self.id, self.total_files
            )));
        }
        Ok(())
    }

    fn closed_error(&self, action: &str, status: TransactionStatus) -> TransferError {
        TransferError::InvalidState(format!(
            "cannot {action} transaction {} in state {status:?}",
            self.id
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(size: u64, chunk: u64) -> FileUploadTask {
        FileUploadTask::new(
            "dir/file.bin".into(),
            SourceHandle::memory(vec![0u8; size as usize]),
            size,
            chunk,
            "tx-1".into(),
        )
    }

    #[test]
    fn new_task_is_queued_at_chunk_zero() {
        let t = task(10, 4);
        assert_eq!(t.state(), TaskState::Queued);
        assert_eq!(t.next_chunk_index(), 0);
        assert_eq!(t.total_chunks(), 3);
        assert_eq!(t.filename(), "file.bin");
    }

    #[test]
    fn chunk_ranges_cover_file() {
        let t = task(10, 4);
        assert_eq!(t.chunk_range(0), Some(0..4));
        assert_eq!(t.chunk_range(1), Some(4..8));
        assert_eq!(t.chunk_range(2), Some(8..10));
        assert_eq!(t.chunk_range(3), None);
    }

    #[test]
    fn advance_to_done() {
        let mut t = task(10, 4);
        t.start().unwrap();
        assert!(!t.advance().unwrap());
        assert_eq!(t.bytes_transferred(), 4);
        assert!(!t.advance().unwrap());
        assert!(t.advance().unwrap());
        assert_eq!(t.state(), TaskState::Done);
        assert_eq!(t.bytes_transferred(), 10);
        assert!(t.advance().is_err());
        assert_eq!(t.next_chunk_index(), 3);
    }

    #[test]
    fn advance_requires_uploading() {
        let mut t = task(10, 4);
        assert!(t.advance().is_err());
        assert_eq!(t.next_chunk_index(), 0);
    }

    #[test]
    fn fail_is_terminal() {
        let mut t = task(10, 4);
        t.start().unwrap();
        assert!(t.fail());
        assert_eq!(t.state(), TaskState::Failed);
        assert!(!t.fail());
        assert!(t.start().is_err());
        assert!(t.advance().is_err());
    }

    #[test]
    fn empty_task_finishes_without_chunks() {
        let mut t = task(0, 4);
        assert_eq!(t.total_chunks(), 0);
        assert_eq!(t.chunk_range(0), None);
        t.finish_empty().unwrap();
        assert_eq!(t.state(), TaskState::Done);
        assert!(task(5, 4).finish_empty().is_err());
    }

    #[test]
    fn restarted_resets_cursor() {
        let mut t = task(10, 4);
        t.start().unwrap();
        t.advance().unwrap();
        t.fail();

        let fresh = t.restarted("tx-2");
        assert_eq!(fresh.state(), TaskState::Queued);
        assert_eq!(fresh.next_chunk_index(), 0);
        assert_eq!(fresh.transaction_id(), "tx-2");
        assert_eq!(fresh.chunk_size(), 4);
        assert_eq!(fresh.total_chunks(), 3);
    }

    #[test]
    fn transaction_lifecycle() {
        let mut tx = UploadTransaction::new("tx-1".into(), 2);
        assert_eq!(tx.status(), TransactionStatus::Pending);
        tx.start().unwrap();
        assert_eq!(tx.status(), TransactionStatus::InProgress);

        tx.record_completed().unwrap();
        assert!(!tx.is_accounted_for());
        assert!(tx.close().is_err());

        tx.record_failed().unwrap();
        assert!(tx.is_accounted_for());
        assert!(tx.has_failures());
        assert!(tx.record_completed().is_err());

        tx.close().unwrap();
        assert_eq!(tx.status(), TransactionStatus::Completed);
        assert!(tx.close().is_err());
        assert!(tx.start().is_err());
    }

    #[test]
    fn transaction_pause_returns_to_pending() {
        let mut tx = UploadTransaction::new("tx-1".into(), 1);
        tx.start().unwrap();
        tx.pause().unwrap();
        assert_eq!(tx.status(), TransactionStatus::Pending);
        tx.start().unwrap();
        assert_eq!(tx.status(), TransactionStatus::InProgress);
    }

    #[test]
    fn transaction_abandon() {
        let mut tx = UploadTransaction::new("tx-1".into(), 3);
        tx.start().unwrap();
        tx.abandon().unwrap();
        assert_eq!(tx.status(), TransactionStatus::Failed);
        assert!(tx.record_failed().is_err());
        assert!(tx.abandon().is_err());
    }

    #[test]
    fn empty_transaction_is_accounted_for() {
        let mut tx = UploadTransaction::new("tx-1".into(), 0);
        assert!(tx.is_accounted_for());
        tx.close().unwrap();
    }

    #[test]
    fn add_file_only_before_start() {
        let mut tx = UploadTransaction::new("tx-1".into(), 0);
        tx.add_file().unwrap();
        tx.add_file().unwrap();
        assert_eq!(tx.total_files(), 2);

        tx.start().unwrap();
        assert!(tx.add_file().is_err());
        assert_eq!(tx.total_files(), 2);
    }
}
