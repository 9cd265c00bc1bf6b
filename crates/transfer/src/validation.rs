use std::path::{Component, Path};

use crate::TransferError;

/// Validates that a destination path stays inside the repository root.
///
/// Rejects:
/// - Empty paths
/// - Absolute paths (Unix `/` or Windows `C:\`)
/// - Parent directory traversal (`..`)
/// - Windows prefix components (`C:`, `\\server`)
pub fn validate_destination_path(destination: &str) -> Result<(), TransferError> {
    if destination.is_empty() {
        return Err(TransferError::InvalidPath("empty path".into()));
    }

    let path = Path::new(destination);
    if path.is_absolute() {
        return Err(TransferError::InvalidPath(format!(
            "absolute path not allowed: {destination}"
        )));
    }

    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(TransferError::InvalidPath(format!(
                    "parent directory traversal not allowed: {destination}"
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(TransferError::InvalidPath(format!(
                    "absolute path not allowed: {destination}"
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    Ok(())
}

/// Joins a destination prefix and a relative source path with `/`.
///
/// Backslashes are normalized and redundant slashes dropped, so
/// `("docs/", "a\\b.txt")` becomes `docs/a/b.txt`.
pub fn join_destination(prefix: &str, relative: &str) -> String {
    prefix
        .split(['/', '\\'])
        .chain(relative.split(['/', '\\']))
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}
