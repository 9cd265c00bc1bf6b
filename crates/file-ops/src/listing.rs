//! Paged directory listing.
//!
//! A listing hands out at most `page_size` entries per call and signals
//! exhaustion with an empty page. Listings are stateful, so pages of one
//! handle are fetched strictly one after another.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tracing::trace;

/// One child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Full path of the entry.
    pub path: PathBuf,
    /// Whether this entry is a directory.
    pub is_dir: bool,
    /// File size in bytes (0 for directories).
    #[serde(default)]
    pub size_bytes: u64,
    /// The entry is a symbolic link; `is_dir` and `size_bytes` describe its target.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_symlink: bool,
}

/// A stateful, page-at-a-time reader over one directory.
pub trait PagedListing: Send {
    /// Returns the next page; an empty page means the directory is exhausted.
    fn read_page(&mut self) -> Pin<Box<dyn Future<Output = io::Result<Vec<DirEntry>>> + Send + '_>>;
}

/// Opens paged listings for directory handles.
///
/// The filesystem implementation is [`FsDirectorySource`]; tests and
/// remote-backed pickers provide their own.
pub trait DirectorySource: Send + Sync {
    fn open(
        &self,
        path: &Path,
    ) -> Pin<Box<dyn Future<Output = io::Result<Box<dyn PagedListing>>> + Send + '_>>;
}

/// Lists local directories through `tokio::fs`.
#[derive(Debug, Clone)]
pub struct FsDirectorySource {
    page_size: usize,
}

impl Default for FsDirectorySource {
    fn default() -> Self {
        Self::new(bulkup_protocol::DEFAULT_PAGE_SIZE)
    }
}

impl FsDirectorySource {
    /// A page size of 0 is bumped to 1.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}

impl DirectorySource for FsDirectorySource {
    fn open(
        &self,
        path: &Path,
    ) -> Pin<Box<dyn Future<Output = io::Result<Box<dyn PagedListing>>> + Send + '_>> {
        let path = path.to_path_buf();
        Box::pin(async move {
            let inner = tokio::fs::read_dir(&path).await?;
            Ok(Box::new(FsListing {
                inner,
                page_size: self.page_size,
            }) as Box<dyn PagedListing>)
        })
    }
}

struct FsListing {
    inner: tokio::fs::ReadDir,
    page_size: usize,
}

impl PagedListing for FsListing {
    fn read_page(&mut self) -> Pin<Box<dyn Future<Output = io::Result<Vec<DirEntry>>> + Send + '_>> {
        Box::pin(async move {
            let mut page = Vec::with_capacity(self.page_size);
            // Keep pulling until the page is full or the directory ends, so a
            // run of skipped entries never produces a premature empty page.
            while page.len() < self.page_size {
                let Some(entry) = self.inner.next_entry().await? else {
                    break;
                };
                match describe_entry(&entry).await {
                    Ok(Some(dir_entry)) => page.push(dir_entry),
                    Ok(None) => {
                        trace!(path = %entry.path().display(), "skipping non-regular entry");
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        trace!(path = %entry.path().display(), "entry vanished or dangling link");
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(page)
        })
    }
}

/// Builds a [`DirEntry`], following symlinks to their target.
///
/// `None` for anything that is neither a regular file nor a directory.
async fn describe_entry(entry: &tokio::fs::DirEntry) -> io::Result<Option<DirEntry>> {
    let path = entry.path();
    let is_symlink = entry.file_type().await?.is_symlink();
    let metadata = if is_symlink {
        tokio::fs::metadata(&path).await?
    } else {
        entry.metadata().await?
    };

    let (is_dir, size_bytes) = if metadata.is_dir() {
        (true, 0)
    } else if metadata.is_file() {
        (false, metadata.len())
    } else {
        return Ok(None);
    };

    Ok(Some(DirEntry {
        name: entry.file_name().to_string_lossy().into_owned(),
        path,
        is_dir,
        size_bytes,
        is_symlink,
    }))
}
