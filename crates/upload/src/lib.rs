//! Batch upload flow: scan, classify, chunk, transfer, complete.
//!
//! This crate implements the **sender side** of a bulkup transfer. It has
//! no transport of its own; callers provide an [`UploadRemote`] that
//! reaches the receiver.
//!
//! # Pipeline
//!
//! 1. **Prepare**: read the selected tree page by page and classify files
//! 2. **Plan**: split accepted files into fixed-size chunks
//! 3. **Upload**: stream chunks through a bounded worker pool
//! 4. **Complete**: close the transaction with a single completion call

pub mod config;
pub mod coordinator;
pub mod error;
pub mod pipeline;
pub mod remote;
pub mod types;
pub mod worker;

// Re-export primary types for convenience.
pub use config::UploaderConfig;
pub use coordinator::{CoordinatorOptions, UploadCoordinator};
pub use error::{ChunkTransferError, TransactionIncompleteError, UploadError};
pub use pipeline::{PreparedBatch, prepare_batch, prepare_items};
pub use remote::{Credentials, RoutingInfo, UploadRemote};
pub use types::{BatchOutcome, FileFailure, RunOutcome, UploadEvent};
pub use worker::{ChunkDescriptor, ChunkJob, TransferWorker, WorkerPool, WorkerReply, WorkerRequest};
