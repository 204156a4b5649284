//! Point-in-time model of one directory tree, keyed by root-relative path

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// A file captured during a scan.
///
/// Replica scans also record entries that cannot be mirrored into as
/// `special`: symlinks and other non-regular entries. Those are always
/// unlinked and never compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the tree root, the cross-tree identity
    pub relative_path: PathBuf,
    /// Absolute path inside the scanned tree
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified time
    pub modified: SystemTime,
    /// Symlink, device, FIFO or socket found in a replica tree
    #[serde(default)]
    pub special: bool,
}

/// A directory captured during a scan, owning the files directly inside it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderEntry {
    /// Path relative to the tree root; empty for the root itself
    pub relative_path: PathBuf,
    /// Absolute path inside the scanned tree
    pub path: PathBuf,
    /// Last modified time
    pub modified: SystemTime,
    /// Files directly inside this folder, in scan order
    pub files: Vec<FileEntry>,
}

impl FolderEntry {
    pub fn new(relative_path: PathBuf, path: PathBuf, modified: SystemTime) -> Self {
        Self {
            relative_path,
            path,
            modified,
            files: Vec::new(),
        }
    }

    /// Look up a direct child file by its relative path
    pub fn file(&self, relative_path: &Path) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.relative_path == relative_path)
    }

    /// Whether this folder is the tree root
    pub fn is_root(&self) -> bool {
        self.relative_path.as_os_str().is_empty()
    }
}

/// Every folder of one tree, keyed by relative path.
///
/// Folders are kept in a `BTreeMap` so iteration order is stable across runs
/// and a parent always sorts before its descendants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    root: PathBuf,
    folders: BTreeMap<PathBuf, FolderEntry>,
}

impl Snapshot {
    /// Create an empty snapshot for the tree rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            folders: BTreeMap::new(),
        }
    }

    /// Absolute root of the scanned tree
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Insert a folder, replacing any previous entry with the same relative path
    pub fn insert(&mut self, folder: FolderEntry) {
        self.folders.insert(folder.relative_path.clone(), folder);
    }

    pub fn get(&self, relative_path: &Path) -> Option<&FolderEntry> {
        self.folders.get(relative_path)
    }

    pub(crate) fn get_mut(&mut self, relative_path: &Path) -> Option<&mut FolderEntry> {
        self.folders.get_mut(relative_path)
    }

    pub fn contains(&self, relative_path: &Path) -> bool {
        self.folders.contains_key(relative_path)
    }

    /// Folders in relative-path order
    pub fn folders(&self) -> impl Iterator<Item = &FolderEntry> {
        self.folders.values()
    }

    /// Number of folders, including the root
    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }

    /// Number of files across all folders
    pub fn file_count(&self) -> usize {
        self.folders.values().map(|f| f.files.len()).sum()
    }

    /// Total bytes across all files
    pub fn total_bytes(&self) -> u64 {
        self.folders
            .values()
            .flat_map(|f| f.files.iter())
            .map(|f| f.size)
            .sum()
    }
}

fn format_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

impl fmt::Display for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "File Path: {} | Last Modification: {} | Size: {} bytes",
            self.relative_path.display(),
            format_time(self.modified),
            self.size
        )
    }
}

impl fmt::Display for FolderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Folder Path: {} | Last Modification: {} | Files:",
            self.relative_path.display(),
            format_time(self.modified)
        )?;
        for file in &self.files {
            write!(f, "\n{}", file)?;
        }
        Ok(())
    }
}
