//! Diff algorithm turning two snapshots into an ordered operation queue

use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::comparator::ContentComparator;
use crate::error::{Result, SyncError};
use crate::snapshot::{FileEntry, FolderEntry, Snapshot};

/// What an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetKind {
    File,
    Folder,
}

/// What an operation does to its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Bring a missing entry into the replica
    Create,
    /// Overwrite a replica file whose content differs
    Copy,
    /// Delete an entry the source no longer has
    Remove,
}

/// One queued unit of work against the replica tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOperation {
    /// Absolute path inside the replica tree
    pub target: PathBuf,
    /// `target` with the replica root stripped
    pub relative_path: PathBuf,
    pub target_kind: TargetKind,
    pub kind: OperationKind,
}

impl SyncOperation {
    pub fn new(
        replica_root: &Path,
        relative_path: impl Into<PathBuf>,
        target_kind: TargetKind,
        kind: OperationKind,
    ) -> Self {
        let relative_path = relative_path.into();
        let target = if relative_path.as_os_str().is_empty() {
            replica_root.to_path_buf()
        } else {
            replica_root.join(&relative_path)
        };

        Self {
            target,
            relative_path,
            target_kind,
            kind,
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Path: {} | Type: {:?} | Operation: {:?}",
            self.target.display(),
            self.target_kind,
            self.kind
        )
    }
}

/// Summary of a sync plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub total_operations: usize,
    pub folder_creates: usize,
    pub file_creates: usize,
    pub copies: usize,
    pub file_removes: usize,
    pub folder_removes: usize,
    /// Identical files whose replica timestamp was aligned while diffing
    pub timestamps_aligned: usize,
    pub total_bytes_to_transfer: u64,
}

/// FIFO queue of operations produced by one diff
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncPlan {
    pub operations: VecDeque<SyncOperation>,
    pub summary: PlanSummary,
}

impl SyncPlan {
    fn push(&mut self, operation: SyncOperation, bytes: u64) {
        let summary = &mut self.summary;
        match (operation.kind, operation.target_kind) {
            (OperationKind::Create, TargetKind::Folder) => summary.folder_creates += 1,
            (OperationKind::Create, TargetKind::File) => summary.file_creates += 1,
            (OperationKind::Copy, _) => summary.copies += 1,
            (OperationKind::Remove, TargetKind::File) => summary.file_removes += 1,
            (OperationKind::Remove, TargetKind::Folder) => summary.folder_removes += 1,
        }
        summary.total_operations += 1;
        summary.total_bytes_to_transfer += bytes;
        self.operations.push_back(operation);
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// How relative paths are matched across trees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseSensitivity {
    Sensitive,
    Insensitive,
}

impl CaseSensitivity {
    /// The host filesystem's usual behaviour
    pub fn native() -> Self {
        if cfg!(any(windows, target_os = "macos")) {
            Self::Insensitive
        } else {
            Self::Sensitive
        }
    }

    pub(crate) fn key(self, path: &Path) -> OsString {
        match (self, path.to_str()) {
            (Self::Insensitive, Some(s)) => s.to_lowercase().into(),
            _ => path.as_os_str().to_os_string(),
        }
    }
}

impl Default for CaseSensitivity {
    fn default() -> Self {
        Self::native()
    }
}

/// Options for diff generation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffOptions {
    #[serde(default)]
    pub case_sensitivity: CaseSensitivity,
}

/// Diff engine for generating sync plans
#[derive(Debug, Clone, Default)]
pub struct DiffEngine {
    comparator: ContentComparator,
    options: DiffOptions,
}

impl DiffEngine {
    pub fn new(comparator: ContentComparator, options: DiffOptions) -> Self {
        Self {
            comparator,
            options,
        }
    }

    /// Compare two snapshots and queue the operations that turn the replica
    /// into a mirror of the source.
    ///
    /// Removals are queued first, then creates and copies. Identical files
    /// produce no operation; instead their replica timestamp is set to the
    /// source timestamp right here.
    pub async fn diff(&self, source: &Snapshot, replica: &Snapshot) -> Result<SyncPlan> {
        let mut plan = SyncPlan::default();

        self.prune(source, replica, &mut plan);
        self.reconcile(source, replica, &mut plan).await?;

        debug!(
            "Diff produced {} operations ({} timestamps aligned)",
            plan.summary.total_operations, plan.summary.timestamps_aligned
        );

        Ok(plan)
    }

    fn index<'a>(&self, snapshot: &'a Snapshot) -> HashMap<OsString, &'a FolderEntry> {
        let cs = self.options.case_sensitivity;
        snapshot
            .folders()
            .map(|folder| (cs.key(&folder.relative_path), folder))
            .collect()
    }

    /// Pass 1: queue removal of replica entries the source does not have,
    /// and of every special replica entry
    fn prune(&self, source: &Snapshot, replica: &Snapshot, plan: &mut SyncPlan) {
        let cs = self.options.case_sensitivity;
        let source_index = self.index(source);
        let mut removed_folders: Vec<&Path> = Vec::new();

        for replica_folder in replica.folders() {
            let relative = replica_folder.relative_path.as_path();

            // already covered by a recursive removal of an ancestor
            if removed_folders.iter().any(|removed| relative.starts_with(removed)) {
                continue;
            }

            match source_index.get(&cs.key(relative)) {
                Some(source_folder) => {
                    let source_files: HashSet<OsString> = source_folder
                        .files
                        .iter()
                        .map(|f| cs.key(&f.relative_path))
                        .collect();

                    for replica_file in &replica_folder.files {
                        if replica_file.special
                            || !source_files.contains(&cs.key(&replica_file.relative_path))
                        {
                            plan.push(
                                SyncOperation::new(
                                    replica.root(),
                                    replica_file.relative_path.clone(),
                                    TargetKind::File,
                                    OperationKind::Remove,
                                ),
                                0,
                            );
                        }
                    }
                }
                None => {
                    plan.push(
                        SyncOperation::new(
                            replica.root(),
                            relative.to_path_buf(),
                            TargetKind::Folder,
                            OperationKind::Remove,
                        ),
                        0,
                    );
                    removed_folders.push(relative);
                }
            }
        }
    }

    /// Pass 2: queue creates and copies, aligning timestamps of identical files
    async fn reconcile(
        &self,
        source: &Snapshot,
        replica: &Snapshot,
        plan: &mut SyncPlan,
    ) -> Result<()> {
        let cs = self.options.case_sensitivity;
        let replica_index = self.index(replica);

        for source_folder in source.folders() {
            let Some(replica_folder) = replica_index.get(&cs.key(&source_folder.relative_path))
            else {
                plan.push(
                    SyncOperation::new(
                        replica.root(),
                        source_folder.relative_path.clone(),
                        TargetKind::Folder,
                        OperationKind::Create,
                    ),
                    0,
                );
                for source_file in &source_folder.files {
                    plan.push(
                        SyncOperation::new(
                            replica.root(),
                            source_file.relative_path.clone(),
                            TargetKind::File,
                            OperationKind::Create,
                        ),
                        source_file.size,
                    );
                }
                continue;
            };

            // special entries were queued for removal in pass 1
            let replica_files: HashMap<OsString, &FileEntry> = replica_folder
                .files
                .iter()
                .filter(|f| !f.special)
                .map(|f| (cs.key(&f.relative_path), f))
                .collect();

            for source_file in &source_folder.files {
                match replica_files.get(&cs.key(&source_file.relative_path)) {
                    None => plan.push(
                        SyncOperation::new(
                            replica.root(),
                            source_file.relative_path.clone(),
                            TargetKind::File,
                            OperationKind::Create,
                        ),
                        source_file.size,
                    ),
                    Some(replica_file) => {
                        if self.files_identical(source_file, replica_file).await? {
                            if self.align_timestamp(source_file, replica_file)? {
                                plan.summary.timestamps_aligned += 1;
                            }
                        } else {
                            plan.push(
                                SyncOperation::new(
                                    replica.root(),
                                    source_file.relative_path.clone(),
                                    TargetKind::File,
                                    OperationKind::Copy,
                                ),
                                source_file.size,
                            );
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn files_identical(&self, source: &FileEntry, replica: &FileEntry) -> Result<bool> {
        if source.size != replica.size {
            return Ok(false);
        }

        match self.comparator.equal(&source.path, &replica.path).await {
            Ok(identical) => Ok(identical),
            // a file removed since the scan is treated as differing; the
            // executor then reports the vanished source
            Err(e) if !source.path.exists() || !replica.path.exists() => {
                warn!(
                    "File vanished while comparing '{}' and '{}': {}",
                    source.path.display(),
                    replica.path.display(),
                    e
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Returns whether the replica timestamp had to change
    fn align_timestamp(&self, source: &FileEntry, replica: &FileEntry) -> Result<bool> {
        if source.modified == replica.modified {
            return Ok(false);
        }

        match filetime::set_file_mtime(&replica.path, FileTime::from_system_time(source.modified)) {
            Ok(()) => {
                debug!(
                    "Aligned timestamp of '{}' with '{}'",
                    replica.path.display(),
                    source.path.display()
                );
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Replica file '{}' vanished before timestamp update", replica.path.display());
                Ok(false)
            }
            Err(e) => Err(SyncError::io_error(&replica.path, e)),
        }
    }
}
