//! Batch preparation: scan, classify, and plan what will be uploaded.

use std::path::Path;

use bulkup_file_ops::{
    Classification, ClassifierRules, DirectoryReadError, DirectoryReader, DirectorySource,
    FileHandle, SizeClassifier, UploadItem,
};
use bulkup_protocol::UploadMode;
use bulkup_transfer::{ChunkPlanner, FileUploadTask, join_destination};
use tracing::{debug, info};

use crate::error::UploadError;

/// A classified selection waiting to be turned into upload tasks.
#[derive(Debug)]
pub struct PreparedBatch {
    pub classification: Classification,
    /// Subdirectories that could not be listed; their files are missing.
    pub scan_errors: Vec<DirectoryReadError>,
    pub destination_root: String,
    planner: ChunkPlanner,
}

impl PreparedBatch {
    /// Files that will be uploaded if the batch starts now.
    pub fn accepted(&self) -> &[FileHandle] {
        &self.classification.accepted
    }

    /// Files needing user confirmation (interactive mode only).
    pub fn needs_confirmation(&self) -> bool {
        !self.classification.size_warn.is_empty()
    }

    /// Accepts every size-warned file.
    pub fn confirm_warned(&mut self) -> usize {
        self.classification.confirm_warned()
    }

    pub fn planner(&self) -> ChunkPlanner {
        self.planner
    }

    /// Plans one queued task per accepted file, in traversal order.
    ///
    /// Each destination is `destination_root/relative_path`.
    pub fn plan(&self, transaction_id: &str) -> Result<Vec<FileUploadTask>, UploadError> {
        self.classification
            .accepted
            .iter()
            .map(|file| {
                let destination = join_destination(&self.destination_root, &file.relative_path);
                self.planner
                    .plan(&destination, file.source.clone(), file.size_bytes, transaction_id)
                    .map_err(UploadError::from)
            })
            .collect()
    }
}

/// Classifies an explicit selection of files, directories, or groups.
pub fn prepare_items(
    item: UploadItem,
    destination_root: &str,
    mode: UploadMode,
    rules: ClassifierRules,
    planner: ChunkPlanner,
) -> PreparedBatch {
    let classification = SizeClassifier::new(mode, rules).classify(item);
    PreparedBatch {
        classification,
        scan_errors: Vec::new(),
        destination_root: destination_root.to_string(),
        planner,
    }
}

/// Reads the tree under `root` and classifies everything in it.
///
/// A root that cannot be listed is an error; unreadable subdirectories are
/// skipped and reported in `scan_errors`.
pub async fn prepare_batch(
    source: &dyn DirectorySource,
    root: &Path,
    destination_root: &str,
    mode: UploadMode,
    rules: ClassifierRules,
    planner: ChunkPlanner,
) -> Result<PreparedBatch, UploadError> {
    let scan = DirectoryReader::new(source).read_tree(root).await?;
    debug!(
        root = %root.display(),
        directories = scan.directories_read,
        files = scan.root.file_count(),
        errors = scan.errors.len(),
        "directory scan complete"
    );

    let mut batch = prepare_items(scan.root.into(), destination_root, mode, rules, planner);
    batch.scan_errors = scan.errors;

    let c = &batch.classification;
    info!(
        root = %root.display(),
        accepted = c.accepted.len(),
        warn = c.size_warn.len(),
        reject = c.size_reject.len(),
        hard_reject = c.hard_reject.len(),
        accepted_bytes = c.accepted_bytes(),
        "batch prepared"
    );
    Ok(batch)
}
