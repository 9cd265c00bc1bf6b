//! Everything that happens before a byte is uploaded: enumerating
//! directories page by page, and sorting the files found into what will
//! be uploaded, what needs confirmation, and what is dropped.

mod classify;
mod listing;
mod reader;
mod types;

pub use classify::{Bucket, Classification, ClassifierRules, SizeClassifier, SizeThresholds, extension_of};
pub use listing::{DirEntry, DirectorySource, FsDirectorySource, PagedListing};
pub use reader::{DirectoryReadError, DirectoryReader, TreeScan, is_exhausted};
pub use types::{DirectoryGroup, DirectoryHandle, FileHandle, UploadItem};
