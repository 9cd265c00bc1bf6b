use std::ops::Range;

use tracing::trace;

use crate::{CHUNK_SIZE, FileUploadTask, SourceHandle, TransferError};

/// Turns accepted files into upload tasks with a fixed chunk geometry.
///
/// The chunk size is chosen once per planner and never changes, so every
/// task of a transaction agrees with the size its chunk count came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlanner {
    chunk_size: u64,
}

impl Default for ChunkPlanner {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
        }
    }
}

impl ChunkPlanner {
    /// Creates a planner with a custom chunk size.
    pub fn new(chunk_size: u64) -> Result<Self, TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::InvalidChunk("chunk size must be non-zero".into()));
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// `ceil(size_bytes / chunk_size)`.
    pub fn total_chunks(&self, size_bytes: u64) -> u64 {
        size_bytes.div_ceil(self.chunk_size)
    }

    /// Byte ranges of every chunk of a `size_bytes` file, in index order.
    pub fn chunk_ranges(&self, size_bytes: u64) -> impl Iterator<Item = Range<u64>> {
        let chunk_size = self.chunk_size;
        (0..self.total_chunks(size_bytes)).map(move |index| {
            let start = index * chunk_size;
            start..(start + chunk_size).min(size_bytes)
        })
    }

    /// Emits a queued task for one accepted file.
    pub fn plan(
        &self,
        destination_path: &str,
        source: SourceHandle,
        size_bytes: u64,
        transaction_id: &str,
    ) -> Result<FileUploadTask, TransferError> {
        crate::validate_destination_path(destination_path)?;
        let task = FileUploadTask::new(
            destination_path.to_string(),
            source,
            size_bytes,
            self.chunk_size,
            transaction_id.to_string(),
        );
        trace!(
            path = %destination_path,
            size = size_bytes,
            chunks = task.total_chunks(),
            "planned upload task"
        );
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulkup_protocol::TaskState;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn default_uses_global_chunk_size() {
        assert_eq!(ChunkPlanner::default().chunk_size(), CHUNK_SIZE);
    }

    #[test]
    fn zero_chunk_size_rejected() {
        assert!(ChunkPlanner::new(0).is_err());
    }

    #[test]
    fn total_chunks_is_ceiling() {
        let planner = ChunkPlanner::new(4).unwrap();
        assert_eq!(planner.total_chunks(0), 0);
        assert_eq!(planner.total_chunks(1), 1);
        assert_eq!(planner.total_chunks(4), 1);
        assert_eq!(planner.total_chunks(5), 2);
        assert_eq!(planner.total_chunks(8), 2);
        assert_eq!(planner.total_chunks(9), 3);
    }

    #[test]
    fn twenty_five_mib_file_has_five_chunks() {
        let planner = ChunkPlanner::new(5 * MIB).unwrap();
        let size = 25 * MIB;
        let task = planner
            .plan("big.bin", SourceHandle::memory(Vec::new()), size, "tx")
            .unwrap();
        assert_eq!(task.total_chunks(), 5);
        assert_eq!(task.chunk_range(4), Some(20 * MIB..25 * MIB));

        let ranges: Vec<_> = planner.chunk_ranges(size).collect();
        assert_eq!(ranges.len(), 5);
        assert_eq!(ranges[4], 20 * MIB..25 * MIB);
    }

    #[test]
    fn chunk_ranges_reconstruct_file() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let source = SourceHandle::memory(data.clone());
        for chunk_size in [1u64, 7, 64, 999, 1000, 4096] {
            let planner = ChunkPlanner::new(chunk_size).unwrap();
            let mut rebuilt = Vec::new();
            for range in planner.chunk_ranges(data.len() as u64) {
                rebuilt.extend(source.read_range(range).unwrap());
            }
            assert_eq!(rebuilt, data, "chunk size {chunk_size}");
            assert_eq!(
                planner.chunk_ranges(data.len() as u64).count() as u64,
                (data.len() as u64).div_ceil(chunk_size)
            );
        }
    }

    #[test]
    fn plan_emits_queued_task() {
        let planner = ChunkPlanner::new(10).unwrap();
        let task = planner
            .plan("a/b.txt", SourceHandle::memory(vec![1u8; 25]), 25, "tx-9")
            .unwrap();
        assert_eq!(task.state(), TaskState::Queued);
        assert_eq!(task.next_chunk_index(), 0);
        assert_eq!(task.total_chunks(), 3);
        assert_eq!(task.chunk_size(), 10);
        assert_eq!(task.transaction_id(), "tx-9");
        assert_eq!(task.destination_path(), "a/b.txt");
    }

    #[test]
    fn plan_rejects_escaping_destination() {
        let planner = ChunkPlanner::default();
        let result = planner.plan("../x", SourceHandle::memory(vec![1u8]), 1, "tx");
        assert!(matches!(result, Err(TransferError::InvalidPath(_))));
    }
}
