//! Complete directory enumeration on top of paged listings.

use std::path::{Path, PathBuf};

use bulkup_transfer::SourceHandle;
use tracing::{debug, warn};

use crate::listing::{DirEntry, DirectorySource};
use crate::types::{DirectoryGroup, DirectoryHandle, FileHandle, UploadItem};

/// A directory listing call was rejected.
#[derive(Debug, thiserror::Error)]
#[error("failed to read directory {}: {source}", path.display())]
pub struct DirectoryReadError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Termination predicate for paged reads: an empty page ends the listing.
pub fn is_exhausted(page: &[DirEntry]) -> bool {
    page.is_empty()
}

/// Result of walking a directory tree.
#[derive(Debug)]
pub struct TreeScan {
    pub root: DirectoryGroup,
    /// Subdirectories whose listing failed; their subtrees are absent.
    pub errors: Vec<DirectoryReadError>,
    /// Directories listed successfully, root included.
    pub directories_read: usize,
}

/// Reads directories to exhaustion through a [`DirectorySource`].
pub struct DirectoryReader<'a> {
    source: &'a dyn DirectorySource,
}

enum Slot {
    File(FileHandle),
    Dir(usize),
    /// Linked directory, recorded but not descended into.
    Link(DirectoryHandle),
}

struct PendingDir {
    handle: DirectoryHandle,
    slots: Vec<Slot>,
}

impl<'a> DirectoryReader<'a> {
    pub fn new(source: &'a dyn DirectorySource) -> Self {
        Self { source }
    }

    /// Returns every direct child of `path`, in page order.
    ///
    /// Pages are requested until an empty one arrives; a short page is not
    /// treated as the end. No retry on failure.
    pub async fn read_all(&self, path: &Path) -> Result<Vec<DirEntry>, DirectoryReadError> {
        let err = |source| DirectoryReadError {
            path: path.to_path_buf(),
            source,
        };

        let mut listing = self.source.open(path).await.map_err(err)?;
        let mut entries = Vec::new();
        let mut pages = 0usize;
        loop {
            let page = listing.read_page().await.map_err(err)?;
            pages += 1;
            if is_exhausted(&page) {
                break;
            }
            entries.extend(page);
        }

        debug!(
            path = %path.display(),
            entries = entries.len(),
            pages,
            "directory read"
        );
        Ok(entries)
    }

    /// Walks the tree below `root` with an explicit stack of pending
    /// directories.
    ///
    /// A failing subdirectory is skipped and reported in
    /// [`TreeScan::errors`]; a failing root is returned as `Err`. Children
    /// of each directory are ordered by name. Linked files are included;
    /// linked directories appear as markers only, so link cycles cannot
    /// recurse.
    pub async fn read_tree(&self, root: &Path) -> Result<TreeScan, DirectoryReadError> {
        let mut nodes = vec![PendingDir {
            handle: DirectoryHandle::new(root.to_path_buf(), ""),
            slots: Vec::new(),
        }];
        let mut stack = vec![0usize];
        let mut errors = Vec::new();
        let mut directories_read = 0usize;

        while let Some(idx) = stack.pop() {
            let dir_path = nodes[idx].handle.path.clone();
            let mut entries = match self.read_all(&dir_path).await {
                Ok(entries) => entries,
                Err(e) if idx == 0 => return Err(e),
                Err(e) => {
                    warn!(path = %dir_path.display(), error = %e.source, "skipping unreadable subtree");
                    errors.push(e);
                    continue;
                }
            };
            directories_read += 1;
            entries.sort_by(|a, b| a.name.cmp(&b.name));

            let prefix = nodes[idx].handle.relative_path.clone();
            for entry in entries {
                let relative = if prefix.is_empty() {
                    entry.name.clone()
                } else {
                    format!("{prefix}/{}", entry.name)
                };
                if entry.is_dir && entry.is_symlink {
                    debug!(path = %entry.path.display(), "not following directory link");
                    nodes[idx]
                        .slots
                        .push(Slot::Link(DirectoryHandle::new(entry.path, relative)));
                } else if entry.is_dir {
                    let child = nodes.len();
                    nodes.push(PendingDir {
                        handle: DirectoryHandle::new(entry.path, relative),
                        slots: Vec::new(),
                    });
                    nodes[idx].slots.push(Slot::Dir(child));
                    stack.push(child);
                } else {
                    nodes[idx].slots.push(Slot::File(FileHandle::new(
                        SourceHandle::Path(entry.path),
                        relative,
                        entry.size_bytes,
                    )));
                }
            }
        }

        // Children always have larger indices than their parent, so building
        // from the back sees every child group before its parent needs it.
        let mut built: Vec<Option<DirectoryGroup>> = Vec::with_capacity(nodes.len());
        built.resize_with(nodes.len(), || None);
        for (idx, node) in nodes.into_iter().enumerate().rev() {
            let children = node
                .slots
                .into_iter()
                .filter_map(|slot| match slot {
                    Slot::File(file) => Some(UploadItem::File(file)),
                    Slot::Dir(child) => built[child].take().map(UploadItem::from),
                    Slot::Link(handle) => Some(UploadItem::Directory(handle)),
                })
                .collect();
            built[idx] = Some(DirectoryGroup {
                source: node.handle,
                children,
            });
        }

        let root_group = built
            .into_iter()
            .next()
            .flatten()
            .ok_or_else(|| DirectoryReadError {
                path: root.to_path_buf(),
                source: std::io::Error::other("scan produced no root"),
            })?;

        Ok(TreeScan {
            root: root_group,
            errors,
            directories_read,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::{FsDirectorySource, PagedListing};
    use std::collections::HashMap;
    use std::future::Future;
    use std::io;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};

    /// In-memory source serving fixed entry lists in pages, recording page sizes.
    struct MockSource {
        dirs: HashMap<PathBuf, Vec<DirEntry>>,
        failing: Vec<PathBuf>,
        page_size: usize,
        pages: Arc<Mutex<Vec<usize>>>,
    }

    struct MockListing {
        remaining: Vec<DirEntry>,
        page_size: usize,
        pages: Arc<Mutex<Vec<usize>>>,
    }

    impl PagedListing for MockListing {
        fn read_page(
            &mut self,
        ) -> Pin<Box<dyn Future<Output = io::Result<Vec<DirEntry>>> + Send + '_>> {
            let n = self.page_size.min(self.remaining.len());
            let page: Vec<DirEntry> = self.remaining.drain(..n).collect();
            self.pages.lock().unwrap().push(page.len());
            Box::pin(async move { Ok(page) })
        }
    }

    impl DirectorySource for MockSource {
        fn open(
            &self,
            path: &Path,
        ) -> Pin<Box<dyn Future<Output = io::Result<Box<dyn PagedListing>>> + Send + '_>> {
            let result = if self.failing.iter().any(|p| p == path) {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
            } else {
                match self.dirs.get(path) {
                    Some(entries) => Ok(Box::new(MockListing {
                        remaining: entries.clone(),
                        page_size: self.page_size,
                        pages: Arc::clone(&self.pages),
                    }) as Box<dyn PagedListing>),
                    None => Err(io::Error::new(io::ErrorKind::NotFound, "missing")),
                }
            };
            Box::pin(async move { result })
        }
    }

    fn file(dir: &str, name: &str, size: u64) -> DirEntry {
        DirEntry {
            name: name.into(),
            path: PathBuf::from(format!("{dir}/{name}")),
            is_dir: false,
            size_bytes: size,
            is_symlink: false,
        }
    }

    fn subdir(dir: &str, name: &str) -> DirEntry {
        DirEntry {
            name: name.into(),
            path: PathBuf::from(format!("{dir}/{name}")),
            is_dir: true,
            size_bytes: 0,
            is_symlink: false,
        }
    }

    fn mock(dirs: Vec<(&str, Vec<DirEntry>)>, page_size: usize) -> MockSource {
        MockSource {
            dirs: dirs
                .into_iter()
                .map(|(p, e)| (PathBuf::from(p), e))
                .collect(),
            failing: Vec::new(),
            page_size,
            pages: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[test]
    fn empty_page_is_exhaustion() {
        assert!(is_exhausted(&[]));
        assert!(!is_exhausted(&[file("/r", "a", 1)]));
    }

    #[tokio::test]
    async fn reads_250_entries_in_pages_of_100() {
        let entries: Vec<DirEntry> = (0..250).map(|i| file("/big", &format!("f{i:03}"), 1)).collect();
        let source = mock(vec![("/big", entries)], 100);
        let reader = DirectoryReader::new(&source);

        let all = reader.read_all(Path::new("/big")).await.unwrap();
        assert_eq!(all.len(), 250);
        assert_eq!(all[0].name, "f000");
        assert_eq!(all[249].name, "f249");
        assert_eq!(*source.pages.lock().unwrap(), vec![100, 100, 50, 0]);
    }

    #[tokio::test]
    async fn exact_multiple_of_page_size_needs_trailing_empty_page() {
        let entries: Vec<DirEntry> = (0..200).map(|i| file("/d", &format!("f{i}"), 1)).collect();
        let source = mock(vec![("/d", entries)], 100);
        let reader = DirectoryReader::new(&source);

        assert_eq!(reader.read_all(Path::new("/d")).await.unwrap().len(), 200);
        assert_eq!(*source.pages.lock().unwrap(), vec![100, 100, 0]);
    }

    #[tokio::test]
    async fn read_all_failure_carries_path() {
        let source = mock(vec![], 10);
        let reader = DirectoryReader::new(&source);
        let err = reader.read_all(Path::new("/nope")).await.unwrap_err();
        assert_eq!(err.path, PathBuf::from("/nope"));
        assert!(err.to_string().contains("/nope"));
    }

    #[tokio::test]
    async fn read_tree_builds_nested_groups() {
        let source = mock(
            vec![
                ("/r", vec![file("/r", "b.txt", 2), subdir("/r", "sub"), file("/r", "a.txt", 1)]),
                ("/r/sub", vec![file("/r/sub", "c.txt", 3), subdir("/r/sub", "deep")]),
                ("/r/sub/deep", vec![file("/r/sub/deep", "d.txt", 4)]),
            ],
            2,
        );
        let reader = DirectoryReader::new(&source);
        let scan = reader.read_tree(Path::new("/r")).await.unwrap();

        assert!(scan.errors.is_empty());
        assert_eq!(scan.directories_read, 3);
        assert_eq!(scan.root.file_count(), 4);

        let names: Vec<&str> = scan
            .root
            .children
            .iter()
            .map(|item| match item {
                UploadItem::File(f) => f.relative_path.as_str(),
                UploadItem::Group(items) => match &items[0] {
                    UploadItem::Directory(d) => d.relative_path.as_str(),
                    _ => "?",
                },
                UploadItem::Directory(_) => "?",
            })
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);

        let UploadItem::Group(sub) = &scan.root.children[2] else {
            panic!("expected sub group");
        };
        let UploadItem::File(c) = &sub[1] else {
            panic!("expected file");
        };
        assert_eq!(c.relative_path, "sub/c.txt");
        assert_eq!(c.size_bytes, 3);
    }

    #[tokio::test]
    async fn read_tree_skips_failing_subtree() {
        let mut source = mock(
            vec![
                ("/r", vec![file("/r", "a.txt", 1), subdir("/r", "locked"), subdir("/r", "ok")]),
                ("/r/ok", vec![file("/r/ok", "b.txt", 1)]),
            ],
            10,
        );
        source.failing.push(PathBuf::from("/r/locked"));
        let reader = DirectoryReader::new(&source);

        let scan = reader.read_tree(Path::new("/r")).await.unwrap();
        assert_eq!(scan.errors.len(), 1);
        assert_eq!(scan.errors[0].path, PathBuf::from("/r/locked"));
        assert_eq!(scan.root.file_count(), 2);
    }

    #[tokio::test]
    async fn read_tree_does_not_descend_linked_dirs() {
        let mut looped = subdir("/r", "loop");
        looped.is_symlink = true;
        let source = mock(
            vec![("/r", vec![file("/r", "a.txt", 1), looped])],
            10,
        );
        let reader = DirectoryReader::new(&source);

        let scan = reader.read_tree(Path::new("/r")).await.unwrap();
        assert_eq!(scan.directories_read, 1);
        assert!(scan.errors.is_empty());
        assert!(matches!(
            &scan.root.children[1],
            UploadItem::Directory(d) if d.relative_path == "loop"
        ));
    }

    #[tokio::test]
    async fn read_tree_root_failure_is_error() {
        let mut source = mock(vec![], 10);
        source.failing.push(PathBuf::from("/r"));
        let reader = DirectoryReader::new(&source);
        assert!(reader.read_tree(Path::new("/r")).await.is_err());
    }

    #[tokio::test]
    async fn read_tree_on_filesystem() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::write(root.join("top.bin"), b"12345").unwrap();
        std::fs::create_dir_all(root.join("data").join("levels")).unwrap();
        std::fs::write(root.join("data").join("cfg.ini"), b"CFG").unwrap();
        std::fs::write(root.join("data").join("levels").join("l1.dat"), b"L1").unwrap();

        let source = FsDirectorySource::new(1);
        let reader = DirectoryReader::new(&source);
        let scan = reader.read_tree(root).await.unwrap();

        assert_eq!(scan.root.file_count(), 3);
        assert_eq!(scan.directories_read, 3);
        assert!(scan.errors.is_empty());
    }
}
