//! Chunk transfer workers.
//!
//! A [`WorkerPool`] runs a fixed number of tokio tasks that pull
//! [`WorkerRequest`]s off a shared bounded queue, upload the chunk through
//! an [`UploadRemote`], and answer with a [`WorkerReply`] tagged with the
//! request's chunk id. Workers hold no state between requests.

use std::sync::Arc;

use bulkup_protocol::{ChunkPayload, UploadChunkRequest, UploadChunkResponse};
use bulkup_transfer::{SourceHandle, checksum_bytes};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{ChunkTransferError, UploadError};
use crate::remote::{RoutingInfo, UploadRemote};

/// Which bytes to send and how the receiver should file them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    pub source: SourceHandle,
    pub chunk_index: u64,
    pub total_chunks: u64,
    pub chunk_size: u64,
    pub filename: String,
    pub upload_id: String,
    pub file_size_bytes: u64,
}

impl ChunkDescriptor {
    /// `[i*cs, min(size, (i+1)*cs))`, or `None` for an out-of-range index.
    fn byte_range(&self) -> Option<std::ops::Range<u64>> {
        if self.chunk_size == 0 || self.chunk_index >= self.total_chunks {
            return None;
        }
        let start = self.chunk_index * self.chunk_size;
        let end = start.saturating_add(self.chunk_size).min(self.file_size_bytes);
        (start < end).then_some(start..end)
    }
}

/// A chunk plus its routing; moves by value into the worker.
#[derive(Debug, Clone)]
pub struct ChunkJob {
    pub descriptor: ChunkDescriptor,
    pub destination_path: String,
    pub transaction_id: String,
    pub routing: RoutingInfo,
}

/// Inbound worker message.
#[derive(Debug, Clone)]
pub enum WorkerRequest {
    Chunk { chunk_id: u64, payload: ChunkJob },
}

/// Outbound worker message, correlated by `chunk_id`.
#[derive(Debug, Clone)]
pub struct WorkerReply {
    pub chunk_id: u64,
    pub outcome: Result<UploadChunkResponse, ChunkTransferError>,
}

/// Uploads single chunks. Cheap to clone.
#[derive(Clone)]
pub struct TransferWorker {
    remote: Arc<dyn UploadRemote>,
}

impl TransferWorker {
    pub fn new(remote: Arc<dyn UploadRemote>) -> Self {
        Self { remote }
    }

    /// Slices, checksums and uploads one chunk.
    pub async fn process(&self, job: ChunkJob) -> Result<UploadChunkResponse, ChunkTransferError> {
        let ChunkJob {
            descriptor,
            destination_path,
            transaction_id,
            routing,
        } = job;
        let chunk_index = descriptor.chunk_index;
        let fail = |message: String| ChunkTransferError {
            destination_path: destination_path.clone(),
            chunk_index,
            message,
        };

        let range = descriptor.byte_range().ok_or_else(|| {
            fail(format!(
                "chunk index {chunk_index} outside 0..{}",
                descriptor.total_chunks
            ))
        })?;

        let (blob, checksum) = tokio::task::spawn_blocking({
            let source = descriptor.source.clone();
            move || {
                let blob = source.read_range(range)?;
                let checksum = checksum_bytes(&blob);
                Ok::<_, bulkup_transfer::TransferError>((blob, checksum))
            }
        })
        .await
        .map_err(|e| fail(format!("task join error: {e}")))?
        .map_err(|e| fail(e.to_string()))?;

        let size = blob.len();
        let request = UploadChunkRequest {
            owner_id: routing.owner_id,
            repository_name: routing.repository_name,
            destination_path: destination_path.clone(),
            chunk: ChunkPayload {
                blob,
                file_size_kb: descriptor.file_size_bytes as f64 / 1024.0,
                chunk_size: descriptor.chunk_size,
                total_chunks: descriptor.total_chunks,
                chunk_index,
                filename: descriptor.filename,
                upload_id: descriptor.upload_id,
                checksum,
            },
            section: routing.section,
            transaction_id,
        };

        let response = self
            .remote
            .upload_chunk(&routing.credentials, request)
            .await
            .map_err(|e| fail(e.to_string()))?;

        if let Some(error) = response.error {
            return Err(fail(error));
        }

        trace!(path = %destination_path, chunk = chunk_index, bytes = size, "chunk accepted");
        Ok(response)
    }
}

/// Fixed-size pool of [`TransferWorker`] tasks over one request queue.
///
/// Both queues are bounded. The caller keeps at most `queue_capacity`
/// requests outstanding so neither side ever blocks on a full channel.
pub struct WorkerPool {
    requests: mpsc::Sender<WorkerRequest>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `workers` tasks (at least one). Must be called inside a runtime.
    pub fn spawn(
        remote: Arc<dyn UploadRemote>,
        workers: usize,
        queue_capacity: usize,
        replies: mpsc::Sender<WorkerReply>,
    ) -> Self {
        let (requests, rx) = mpsc::channel(queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let worker = TransferWorker::new(remote);

        let handles = (0..workers.max(1))
            .map(|id| {
                let rx = Arc::clone(&rx);
                let worker = worker.clone();
                let replies = replies.clone();
                tokio::spawn(async move {
                    loop {
                        let request = rx.lock().await.recv().await;
                        let Some(WorkerRequest::Chunk { chunk_id, payload }) = request else {
                            break;
                        };
                        let outcome = worker.process(payload).await;
                        if let Err(e) = &outcome {
                            warn!(worker = id, chunk_id, error = %e, "chunk upload failed");
                        }
                        if replies.send(WorkerReply { chunk_id, outcome }).await.is_err() {
                            break;
                        }
                    }
                    trace!(worker = id, "transfer worker stopped");
                })
            })
            .collect::<Vec<_>>();

        debug!(workers = handles.len(), "worker pool started");
        Self { requests, handles }
    }

    /// Queues one request for the next idle worker.
    pub async fn submit(&self, request: WorkerRequest) -> Result<(), UploadError> {
        self.requests
            .send(request)
            .await
            .map_err(|_| UploadError::WorkerPoolClosed)
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Closes the queue and waits for every worker to drain and exit.
    pub async fn shutdown(self) {
        drop(self.requests);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}
