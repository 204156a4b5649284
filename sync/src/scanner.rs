//! Directory tree scanning using walkdir and tokio::fs

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::fs;
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::error::{Result, SyncError};
use crate::snapshot::{FileEntry, FolderEntry, Snapshot};

/// Builds a [`Snapshot`] of a directory tree.
///
/// Symbolic links to directories are not followed, so a walk always
/// terminates without cycle detection. In a source tree, links that resolve
/// to regular files are captured as files.
#[derive(Debug, Clone, Default)]
pub struct TreeScanner;

impl TreeScanner {
    pub fn new() -> Self {
        Self
    }

    /// Scan a source tree and return its snapshot.
    ///
    /// Any directory or entry that cannot be read fails the whole scan: a
    /// partial snapshot would make the diff delete replica entries that still
    /// exist in the source. Dangling links and non-regular entries are
    /// skipped.
    pub async fn scan<P: AsRef<Path>>(&self, root_path: P) -> Result<Snapshot> {
        self.walk(root_path.as_ref(), false).await
    }

    /// Scan a replica tree.
    ///
    /// Unlike [`TreeScanner::scan`], every symlink and non-regular entry is
    /// kept as a `special` file entry so the diff can unlink it. Nothing is
    /// ever written through a link inside the replica.
    pub async fn scan_replica<P: AsRef<Path>>(&self, root_path: P) -> Result<Snapshot> {
        self.walk(root_path.as_ref(), true).await
    }

    async fn walk(&self, root_path: &Path, keep_special: bool) -> Result<Snapshot> {
        let root_metadata = fs::metadata(root_path).await.map_err(|e| {
            SyncError::tree_access_error(root_path, format!("Failed to read metadata: {}", e))
        })?;

        if !root_metadata.is_dir() {
            return Err(SyncError::tree_access_error(
                root_path,
                "Path is not a directory",
            ));
        }

        let mut snapshot = Snapshot::new(root_path);

        for entry in WalkDir::new(root_path).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root_path).to_path_buf();
                SyncError::tree_access_error(path, format!("Walk error: {}", e))
            })?;

            let path = entry.path();
            let relative_path = relative_to(path, root_path)?;
            let file_type = entry.file_type();

            if file_type.is_dir() {
                let metadata = entry.metadata().map_err(|e| {
                    SyncError::tree_access_error(path, format!("Failed to read metadata: {}", e))
                })?;
                trace!("Scanned folder '{}'", relative_path.display());
                snapshot.insert(FolderEntry::new(
                    relative_path,
                    path.to_path_buf(),
                    modified_time(path, &metadata),
                ));
                continue;
            }

            let (metadata, special) = if file_type.is_symlink() && keep_special {
                // the link itself, never its target
                let metadata = entry.metadata().map_err(|e| {
                    SyncError::tree_access_error(path, format!("Failed to read metadata: {}", e))
                })?;
                (metadata, true)
            } else if file_type.is_symlink() {
                match fs::metadata(path).await {
                    Ok(metadata) if metadata.is_file() => (metadata, false),
                    Ok(_) => {
                        debug!("Skipping symlink to non-regular entry '{}'", path.display());
                        continue;
                    }
                    Err(e) => {
                        debug!("Skipping dangling symlink '{}': {}", path.display(), e);
                        continue;
                    }
                }
            } else {
                let metadata = entry.metadata().map_err(|e| {
                    SyncError::tree_access_error(path, format!("Failed to read metadata: {}", e))
                })?;
                match (metadata.is_file(), keep_special) {
                    (true, _) => (metadata, false),
                    (false, true) => (metadata, true),
                    (false, false) => {
                        debug!("Skipping non-regular entry '{}'", path.display());
                        continue;
                    }
                }
            };

            if special {
                debug!("Recorded special entry '{}' for removal", path.display());
            }

            let parent = relative_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();

            let folder = snapshot.get_mut(&parent).ok_or_else(|| {
                SyncError::tree_access_error(path, "Parent folder missing from snapshot")
            })?;

            folder.files.push(FileEntry {
                relative_path,
                path: path.to_path_buf(),
                size: metadata.len(),
                modified: modified_time(path, &metadata),
                special,
            });
        }

        debug!(
            "Scanned '{}': {} folders, {} files, {} bytes",
            root_path.display(),
            snapshot.folder_count(),
            snapshot.file_count(),
            snapshot.total_bytes()
        );

        Ok(snapshot)
    }
}

/// Strip the tree root from an absolute path
pub(crate) fn relative_to(path: &Path, root: &Path) -> Result<PathBuf> {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .map_err(|e| {
            SyncError::tree_access_error(path, format!("Failed to create relative path: {}", e))
        })
}

fn modified_time(path: &Path, metadata: &std::fs::Metadata) -> SystemTime {
    metadata.modified().unwrap_or_else(|e| {
        debug!(
            "No modification time for '{}', using the epoch: {}",
            path.display(),
            e
        );
        SystemTime::UNIX_EPOCH
    })
}
