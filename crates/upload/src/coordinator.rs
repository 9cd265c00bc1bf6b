//! Upload coordinator: owns one transaction and drives its files to the
//! receiver through a [`WorkerPool`].
//!
//! The coordinator is the only writer of task and transaction state. Within
//! a file, chunk `i + 1` is dispatched only after chunk `i` was confirmed;
//! across files, up to `max_in_flight` chunks travel at once. Once every
//! file has completed or failed, exactly one completion call closes the
//! transaction.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use bulkup_protocol::{
    CompleteBatchRequest, FileNode, TaskState, TransactionProgress,
};
use bulkup_transfer::{FileUploadTask, ThroughputMeter, UploadTransaction};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::{TransactionIncompleteError, UploadError};
use crate::remote::{RoutingInfo, UploadRemote};
use crate::types::{BatchOutcome, FileFailure, RunOutcome, UploadEvent};
use crate::worker::{ChunkDescriptor, ChunkJob, WorkerPool, WorkerReply, WorkerRequest};

/// Capacity of the progress event channel.
const EVENT_CAPACITY: usize = 256;

/// Event slots that chunk progress never takes, kept for lifecycle events.
const LIFECYCLE_RESERVE: usize = 64;

/// Concurrency knobs for one coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorOptions {
    /// Number of transfer worker tasks.
    pub workers: usize,
    /// Maximum chunks outstanding across all files.
    pub max_in_flight: usize,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            max_in_flight: 8,
        }
    }
}

struct TaskSlot {
    task: FileUploadTask,
    upload_id: String,
    file_node: Option<FileNode>,
    error: Option<String>,
}

enum Step {
    Pause,
    Reply(Option<WorkerReply>),
}

/// Drives one upload transaction from first chunk to completion call.
pub struct UploadCoordinator {
    transaction: UploadTransaction,
    slots: Vec<TaskSlot>,
    /// Slots whose next chunk can be dispatched.
    ready: VecDeque<usize>,
    /// chunk id -> slot index.
    in_flight: HashMap<u64, usize>,
    next_chunk_id: u64,
    routing: RoutingInfo,
    remote: Arc<dyn UploadRemote>,
    options: CoordinatorOptions,
    pool: Option<WorkerPool>,
    replies_tx: mpsc::Sender<WorkerReply>,
    replies_rx: mpsc::Receiver<WorkerReply>,
    pause: CancellationToken,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
    meter: ThroughputMeter,
    started: bool,
}

impl UploadCoordinator {
    /// Creates a coordinator with a fresh transaction id and no files.
    pub fn new(
        remote: Arc<dyn UploadRemote>,
        routing: RoutingInfo,
        options: CoordinatorOptions,
    ) -> Self {
        let options = CoordinatorOptions {
            workers: options.workers.max(1),
            max_in_flight: options.max_in_flight.max(1),
        };
        let transaction_id = uuid::Uuid::new_v4().to_string();
        let (replies_tx, replies_rx) = mpsc::channel(options.max_in_flight);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);

        debug!(transaction = %transaction_id, ?options, "created upload coordinator");

        Self {
            transaction: UploadTransaction::new(transaction_id, 0),
            slots: Vec::new(),
            ready: VecDeque::new(),
            in_flight: HashMap::new(),
            next_chunk_id: 0,
            routing,
            remote,
            options,
            pool: None,
            replies_tx,
            replies_rx,
            pause: CancellationToken::new(),
            events_tx,
            events_rx: Some(events_rx),
            meter: ThroughputMeter::default(),
            started: false,
        }
    }

    pub fn transaction_id(&self) -> &str {
        self.transaction.id()
    }

    pub fn transaction(&self) -> &UploadTransaction {
        &self.transaction
    }

    pub fn options(&self) -> CoordinatorOptions {
        self.options
    }

    pub fn tasks(&self) -> impl Iterator<Item = &FileUploadTask> {
        self.slots.iter().map(|slot| &slot.task)
    }

    /// Takes the event receiver. Can only be called once.
    ///
    /// Until it is taken, no events are produced.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    /// Token that halts dispatch when cancelled.
    ///
    /// [`resume`](Self::resume) installs a new token, so fetch it again
    /// after resuming.
    pub fn pause_token(&self) -> CancellationToken {
        self.pause.clone()
    }

    /// Adds a planned file. Only allowed before the first `run()`, and every
    /// file of a transaction must share one chunk size.
    pub fn enqueue(&mut self, task: FileUploadTask) -> Result<(), UploadError> {
        if self.started {
            return Err(UploadError::Transfer(
                bulkup_transfer::TransferError::InvalidState(format!(
                    "transaction {} already started",
                    self.transaction.id()
                )),
            ));
        }
        if let Some(first) = self.slots.first()
            && first.task.chunk_size() != task.chunk_size()
        {
            return Err(UploadError::Transfer(
                bulkup_transfer::TransferError::InvalidChunk(format!(
                    "{} uses chunk size {}, transaction {} uses {}",
                    task.destination_path(),
                    task.chunk_size(),
                    self.transaction.id(),
                    first.task.chunk_size()
                )),
            ));
        }
        if task.transaction_id() != self.transaction.id() || task.state() != TaskState::Queued {
            return Err(UploadError::Transfer(
                bulkup_transfer::TransferError::InvalidState(format!(
                    "{} is not a queued task of transaction {}",
                    task.destination_path(),
                    self.transaction.id()
                )),
            ));
        }

        self.transaction.add_file()?;
        self.ready.push_back(self.slots.len());
        self.slots.push(TaskSlot {
            task,
            upload_id: uuid::Uuid::new_v4().to_string(),
            file_node: None,
            error: None,
        });
        Ok(())
    }

    pub fn enqueue_all(
        &mut self,
        tasks: impl IntoIterator<Item = FileUploadTask>,
    ) -> Result<(), UploadError> {
        tasks.into_iter().try_for_each(|task| self.enqueue(task))
    }

    /// Uploads until every file is accounted for and the completion call is
    /// acknowledged, or until paused.
    ///
    /// After a [`TransactionIncompleteError`] the transaction is still open
    /// and calling `run()` again only retries the completion call.
    pub async fn run(&mut self) -> Result<RunOutcome, UploadError> {
        if self.transaction.status().is_closed() {
            return Err(UploadError::TransactionClosed(self.transaction.id().to_string()));
        }
        self.transaction.start()?;

        if !self.started {
            self.started = true;
            let total_bytes = self.total_bytes();
            info!(
                transaction = %self.transaction.id(),
                files = self.transaction.total_files(),
                total_bytes,
                "upload started"
            );
            self.emit(UploadEvent::TransactionStarted {
                transaction_id: self.transaction.id().to_string(),
                total_files: self.transaction.total_files(),
                total_bytes,
            })
            .await;
        }

        if self.pool.is_none() && !self.transaction.is_accounted_for() {
            self.pool = Some(WorkerPool::spawn(
                Arc::clone(&self.remote),
                self.options.workers,
                self.options.max_in_flight,
                self.replies_tx.clone(),
            ));
        }

        loop {
            self.fill_pipeline().await?;
            if self.transaction.is_accounted_for() {
                break;
            }

            let step = tokio::select! {
                biased;
                _ = self.pause.cancelled() => Step::Pause,
                reply = self.replies_rx.recv() => Step::Reply(reply),
            };

            match step {
                Step::Pause => {
                    self.transaction.pause()?;
                    info!(
                        transaction = %self.transaction.id(),
                        in_flight = self.in_flight.len(),
                        "upload paused"
                    );
                    self.emit(UploadEvent::Paused {
                        transaction_id: self.transaction.id().to_string(),
                    })
                    .await;
                    return Ok(RunOutcome::Paused);
                }
                Step::Reply(Some(reply)) => self.handle_reply(reply).await?,
                Step::Reply(None) => return Err(UploadError::WorkerPoolClosed),
            }
        }

        self.finish().await
    }

    /// Clears a pause so the next `run()` dispatches again.
    pub fn resume(&mut self) {
        if self.pause.is_cancelled() {
            self.pause = CancellationToken::new();
            debug!(transaction = %self.transaction.id(), "upload resumed");
        }
    }

    /// Gives up: every unfinished file fails and no completion call is sent.
    ///
    /// Chunks already handed to workers may still reach the receiver.
    pub async fn abandon(&mut self) -> Result<(), UploadError> {
        if self.transaction.status().is_closed() {
            return Err(UploadError::TransactionClosed(self.transaction.id().to_string()));
        }

        let mut failed = Vec::new();
        for slot in &mut self.slots {
            if slot.task.fail() {
                slot.error = Some("abandoned".into());
                failed.push(slot.task.destination_path().to_string());
            }
        }
        for _ in &failed {
            self.transaction.record_failed()?;
        }
        self.transaction.abandon()?;

        self.ready.clear();
        self.in_flight.clear();
        self.pool = None;

        warn!(
            transaction = %self.transaction.id(),
            abandoned_files = failed.len(),
            "upload abandoned"
        );
        for destination_path in failed {
            self.emit(UploadEvent::FileFailed {
                transaction_id: self.transaction.id().to_string(),
                destination_path,
                error: "abandoned".into(),
            })
            .await;
        }
        Ok(())
    }

    /// Fresh copies of every failed file, reset to chunk 0, for a new
    /// transaction.
    pub fn retry_tasks(&self, transaction_id: &str) -> Vec<FileUploadTask> {
        self.slots
            .iter()
            .filter(|slot| slot.task.state() == TaskState::Failed)
            .map(|slot| slot.task.restarted(transaction_id))
            .collect()
    }

    /// Point-in-time progress snapshot.
    pub fn progress(&self) -> TransactionProgress {
        let total_bytes = self.total_bytes();
        let transferred_bytes: u64 = self.slots.iter().map(|s| s.task.bytes_transferred()).sum();
        TransactionProgress {
            transaction_id: self.transaction.id().to_string(),
            status: self.transaction.status(),
            total_files: self.transaction.total_files(),
            completed_files: self.transaction.completed_files(),
            failed_files: self.transaction.failed_files(),
            total_bytes,
            transferred_bytes,
            bytes_per_second: self.meter.bytes_per_second(),
            eta_seconds: self
                .meter
                .eta(total_bytes.saturating_sub(transferred_bytes))
                .map(|d| d.as_secs_f64()),
        }
    }

    fn total_bytes(&self) -> u64 {
        self.slots.iter().map(|s| s.task.size_bytes()).sum()
    }

    /// Dispatches ready chunks until the in-flight limit or a pause.
    async fn fill_pipeline(&mut self) -> Result<(), UploadError> {
        while self.in_flight.len() < self.options.max_in_flight && !self.pause.is_cancelled() {
            let Some(idx) = self.ready.pop_front() else {
                break;
            };

            let slot = &mut self.slots[idx];
            if slot.task.state().is_terminal() {
                continue;
            }
            if slot.task.total_chunks() == 0 {
                slot.task.finish_empty()?;
                let destination_path = slot.task.destination_path().to_string();
                self.transaction.record_completed()?;
                debug!(path = %destination_path, "empty file completed without transfer");
                self.emit(UploadEvent::FileCompleted {
                    transaction_id: self.transaction.id().to_string(),
                    destination_path,
                    file_node: None,
                })
                .await;
                continue;
            }

            slot.task.start()?;
            self.dispatch(idx).await?;
        }
        Ok(())
    }

    async fn dispatch(&mut self, idx: usize) -> Result<(), UploadError> {
        let chunk_id = self.next_chunk_id;
        self.next_chunk_id += 1;

        let slot = &self.slots[idx];
        let task = &slot.task;
        let job = ChunkJob {
            descriptor: ChunkDescriptor {
                source: task.source().clone(),
                chunk_index: task.next_chunk_index(),
                total_chunks: task.total_chunks(),
                chunk_size: task.chunk_size(),
                filename: task.filename().to_string(),
                upload_id: slot.upload_id.clone(),
                file_size_bytes: task.size_bytes(),
            },
            destination_path: task.destination_path().to_string(),
            transaction_id: self.transaction.id().to_string(),
            routing: self.routing.clone(),
        };

        trace!(
            chunk_id,
            path = %job.destination_path,
            chunk = job.descriptor.chunk_index,
            total = job.descriptor.total_chunks,
            "dispatching chunk"
        );

        let pool = self.pool.as_ref().ok_or(UploadError::WorkerPoolClosed)?;
        self.in_flight.insert(chunk_id, idx);
        pool.submit(WorkerRequest::Chunk {
            chunk_id,
            payload: job,
        })
        .await
    }

    async fn handle_reply(&mut self, reply: WorkerReply) -> Result<(), UploadError> {
        let Some(idx) = self.in_flight.remove(&reply.chunk_id) else {
            warn!(chunk_id = reply.chunk_id, "reply for unknown chunk");
            return Ok(());
        };
        let slot = &mut self.slots[idx];

        match reply.outcome {
            Ok(response) => {
                if slot.task.state() != TaskState::Uploading {
                    return Ok(());
                }
                let chunk_index = slot.task.next_chunk_index();
                let bytes = slot
                    .task
                    .chunk_range(chunk_index)
                    .map_or(0, |range| range.end - range.start);
                let done = slot.task.advance()?;
                if response.file_node.is_some() {
                    slot.file_node = response.file_node;
                }
                let destination_path = slot.task.destination_path().to_string();
                let total_chunks = slot.task.total_chunks();
                let file_node = slot.file_node.clone();

                self.meter.record(bytes);
                debug!(
                    path = %destination_path,
                    chunk = chunk_index,
                    total = total_chunks,
                    bytes,
                    "chunk uploaded"
                );
                self.emit_progress(UploadEvent::ChunkUploaded {
                    transaction_id: self.transaction.id().to_string(),
                    destination_path: destination_path.clone(),
                    chunk_index,
                    total_chunks,
                    bytes,
                });

                if done {
                    self.transaction.record_completed()?;
                    self.emit(UploadEvent::FileCompleted {
                        transaction_id: self.transaction.id().to_string(),
                        destination_path,
                        file_node,
                    })
                    .await;
                } else {
                    // Finish started files before opening new ones.
                    self.ready.push_front(idx);
                }
            }
            Err(e) => {
                if !slot.task.fail() {
                    return Ok(());
                }
                slot.error = Some(e.message.clone());
                self.transaction.record_failed()?;
                warn!(
                    path = %e.destination_path,
                    chunk = e.chunk_index,
                    error = %e.message,
                    "file upload failed"
                );
                self.emit(UploadEvent::FileFailed {
                    transaction_id: self.transaction.id().to_string(),
                    destination_path: e.destination_path,
                    error: e.message,
                })
                .await;
            }
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<RunOutcome, UploadError> {
        let has_failures = self.transaction.has_failures();
        let request = CompleteBatchRequest {
            owner_id: self.routing.owner_id.clone(),
            repository_name: self.routing.repository_name.clone(),
            transaction_id: self.transaction.id().to_string(),
            success: !has_failures,
            has_failures,
        };

        let reason = match self
            .remote
            .complete_batch(&self.routing.credentials, request)
            .await
        {
            Ok(response) if response.success => None,
            Ok(_) => Some("receiver declined completion".to_string()),
            Err(e) => Some(e.to_string()),
        };
        if let Some(reason) = reason {
            warn!(transaction = %self.transaction.id(), %reason, "completion call failed");
            return Err(TransactionIncompleteError {
                transaction_id: self.transaction.id().to_string(),
                reason,
            }
            .into());
        }

        self.transaction.close()?;
        if let Some(pool) = self.pool.take() {
            pool.shutdown().await;
        }

        info!(
            transaction = %self.transaction.id(),
            completed = self.transaction.completed_files(),
            failed = self.transaction.failed_files(),
            "upload batch completed"
        );
        self.emit(UploadEvent::BatchCompleted {
            transaction_id: self.transaction.id().to_string(),
            completed_files: self.transaction.completed_files(),
            failed_files: self.transaction.failed_files(),
        })
        .await;

        Ok(RunOutcome::Completed(self.outcome()))
    }

    fn outcome(&self) -> BatchOutcome {
        BatchOutcome {
            transaction_id: self.transaction.id().to_string(),
            completed_files: self.transaction.completed_files(),
            failed_files: self.transaction.failed_files(),
            failures: self
                .slots
                .iter()
                .filter(|s| s.task.state() == TaskState::Failed)
                .map(|s| FileFailure {
                    destination_path: s.task.destination_path().to_string(),
                    error: s.error.clone().unwrap_or_default(),
                })
                .collect(),
            file_nodes: self
                .slots
                .iter()
                .filter(|s| s.task.state() == TaskState::Done)
                .filter_map(|s| s.file_node.clone())
                .collect(),
        }
    }

    /// Lifecycle events wait for room in the channel, so they are never lost
    /// while the receiver is alive.
    async fn emit(&self, event: UploadEvent) {
        if self.events_rx.is_some() {
            return;
        }
        if self.events_tx.send(event).await.is_err() {
            trace!("event receiver dropped");
        }
    }

    /// Chunk progress is dropped rather than waited on, and never fills the
    /// slots reserved for lifecycle events.
    fn emit_progress(&self, event: UploadEvent) {
        if self.events_rx.is_some() {
            return;
        }
        if self.events_tx.capacity() <= LIFECYCLE_RESERVE {
            trace!("event channel busy, skipped chunk progress");
            return;
        }
        if let Err(e) = self.events_tx.try_send(event) {
            trace!(error = %e, "dropped chunk progress");
        }
    }
}
