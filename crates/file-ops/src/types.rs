//! Handles and the recursive item shape fed to the classifier.

use std::path::PathBuf;

use bulkup_transfer::SourceHandle;

/// A regular file that may be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    pub source: SourceHandle,
    /// Path relative to the scan root, `/`-separated.
    pub relative_path: String,
    /// Final path segment.
    pub name: String,
    pub size_bytes: u64,
}

impl FileHandle {
    pub fn new(source: SourceHandle, relative_path: impl Into<String>, size_bytes: u64) -> Self {
        let relative_path = relative_path.into();
        let name = last_segment(&relative_path).to_string();
        Self {
            source,
            relative_path,
            name,
            size_bytes,
        }
    }
}

/// A directory encountered during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryHandle {
    pub path: PathBuf,
    /// Path relative to the scan root (empty for the root itself).
    pub relative_path: String,
    pub name: String,
}

impl DirectoryHandle {
    pub fn new(path: PathBuf, relative_path: impl Into<String>) -> Self {
        let relative_path = relative_path.into();
        let name = match last_segment(&relative_path) {
            "" => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            segment => segment.to_string(),
        };
        Self {
            path,
            relative_path,
            name,
        }
    }
}

/// Classifier input: a file, a directory marker, or a nested group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadItem {
    File(FileHandle),
    Directory(DirectoryHandle),
    Group(Vec<UploadItem>),
}

/// A scanned directory and its children, discarded after flattening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryGroup {
    pub source: DirectoryHandle,
    pub children: Vec<UploadItem>,
}

impl DirectoryGroup {
    /// Number of files anywhere below this directory.
    pub fn file_count(&self) -> usize {
        fn count(item: &UploadItem) -> usize {
            match item {
                UploadItem::File(_) => 1,
                UploadItem::Directory(_) => 0,
                UploadItem::Group(items) => items.iter().map(count).sum(),
            }
        }
        self.children.iter().map(count).sum()
    }
}

impl From<DirectoryGroup> for UploadItem {
    fn from(group: DirectoryGroup) -> Self {
        let mut items = Vec::with_capacity(group.children.len() + 1);
        items.push(UploadItem::Directory(group.source));
        items.extend(group.children);
        UploadItem::Group(items)
    }
}

fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
