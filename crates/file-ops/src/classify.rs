//! Size and extension gating for upload candidates.

use std::collections::BTreeSet;

use bulkup_protocol::UploadMode;
use bulkup_protocol::constants::{
    DEFAULT_EXCLUDED_EXTENSIONS, INTERACTIVE_REJECT_BYTES, INTERACTIVE_WARN_BYTES,
    UNATTENDED_HARD_REJECT_BYTES,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{DirectoryHandle, FileHandle, UploadItem};

/// Outcome of classifying a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Accepted,
    /// Interactive only: large enough to ask the user first.
    SizeWarn,
    /// Interactive only: too large to upload.
    SizeReject,
    /// Excluded extension, or above the unattended hard limit. Never uploaded.
    HardReject,
}

/// Byte thresholds; a file is over a threshold when strictly larger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SizeThresholds {
    pub warn_bytes: u64,
    pub reject_bytes: u64,
    pub hard_reject_bytes: u64,
}

impl Default for SizeThresholds {
    fn default() -> Self {
        Self {
            warn_bytes: INTERACTIVE_WARN_BYTES,
            reject_bytes: INTERACTIVE_REJECT_BYTES,
            hard_reject_bytes: UNATTENDED_HARD_REJECT_BYTES,
        }
    }
}

/// Extension exclusions plus thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClassifierRules {
    /// Case-sensitive, without the leading dot.
    pub excluded_extensions: BTreeSet<String>,
    pub thresholds: SizeThresholds,
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self {
            excluded_extensions: DEFAULT_EXCLUDED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            thresholds: SizeThresholds::default(),
        }
    }
}

/// The substring after the last `.` of a file name.
///
/// `None` when the name has no dot or ends with one.
pub fn extension_of(name: &str) -> Option<&str> {
    match name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => Some(ext),
        _ => None,
    }
}

/// Files sorted into disjoint buckets, plus the directories seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub accepted: Vec<FileHandle>,
    pub size_warn: Vec<FileHandle>,
    pub size_reject: Vec<FileHandle>,
    pub hard_reject: Vec<FileHandle>,
    pub directories: Vec<DirectoryHandle>,
}

impl Classification {
    /// Moves every size-warned file into `accepted` after user confirmation.
    pub fn confirm_warned(&mut self) -> usize {
        let n = self.size_warn.len();
        self.accepted.append(&mut self.size_warn);
        n
    }

    /// Total files across all four buckets.
    pub fn file_count(&self) -> usize {
        self.accepted.len() + self.size_warn.len() + self.size_reject.len() + self.hard_reject.len()
    }

    pub fn accepted_bytes(&self) -> u64 {
        self.accepted.iter().map(|f| f.size_bytes).sum()
    }

    fn push(&mut self, bucket: Bucket, file: FileHandle) {
        match bucket {
            Bucket::Accepted => self.accepted.push(file),
            Bucket::SizeWarn => self.size_warn.push(file),
            Bucket::SizeReject => self.size_reject.push(file),
            Bucket::HardReject => self.hard_reject.push(file),
        }
    }
}

/// Recursive-descent classifier over [`UploadItem`] trees.
#[derive(Debug, Clone)]
pub struct SizeClassifier {
    mode: UploadMode,
    rules: ClassifierRules,
}

impl SizeClassifier {
    pub fn new(mode: UploadMode, rules: ClassifierRules) -> Self {
        Self { mode, rules }
    }

    pub fn mode(&self) -> UploadMode {
        self.mode
    }

    /// Extension first, then size. Pure: same file and mode, same bucket.
    pub fn classify_file(&self, file: &FileHandle) -> Bucket {
        if let Some(ext) = extension_of(&file.name)
            && self.rules.excluded_extensions.contains(ext)
        {
            return Bucket::HardReject;
        }

        let t = &self.rules.thresholds;
        match self.mode {
            UploadMode::Interactive if file.size_bytes > t.reject_bytes => Bucket::SizeReject,
            UploadMode::Interactive if file.size_bytes > t.warn_bytes => Bucket::SizeWarn,
            UploadMode::Unattended if file.size_bytes > t.hard_reject_bytes => Bucket::HardReject,
            _ => Bucket::Accepted,
        }
    }

    /// Flattens `item` and buckets every file in it, in traversal order.
    pub fn classify(&self, item: UploadItem) -> Classification {
        let mut out = Classification::default();
        self.visit(item, &mut out);
        debug!(
            mode = ?self.mode,
            accepted = out.accepted.len(),
            warn = out.size_warn.len(),
            reject = out.size_reject.len(),
            hard_reject = out.hard_reject.len(),
            directories = out.directories.len(),
            "classified upload candidates"
        );
        out
    }

    fn visit(&self, item: UploadItem, out: &mut Classification) {
        match item {
            UploadItem::File(file) => {
                let bucket = self.classify_file(&file);
                out.push(bucket, file);
            }
            UploadItem::Directory(dir) => out.directories.push(dir),
            UploadItem::Group(items) => {
                for child in items {
                    self.visit(child, out);
                }
            }
        }
    }
}
