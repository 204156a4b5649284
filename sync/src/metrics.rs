//! Counters describing what one synchronization cycle did

use std::fmt;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::diff::{OperationKind, PlanSummary, SyncOperation, TargetKind};

/// Result of applying a single operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationOutcome {
    /// The operation changed the replica; carries bytes copied
    Applied { bytes: u64 },
    /// Remove target was already gone
    AlreadyAbsent,
    /// Source file disappeared before it could be copied
    SourceVanished,
}

/// Execution statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationStats {
    pub folders_created: usize,
    pub files_created: usize,
    pub files_copied: usize,
    pub files_removed: usize,
    pub folders_removed: usize,
    /// Remove operations whose target no longer existed
    pub already_absent: usize,
    /// Create/copy operations whose source vanished
    pub failed: usize,
    pub bytes_copied: u64,
}

impl OperationStats {
    pub fn record(&mut self, operation: &SyncOperation, outcome: OperationOutcome) {
        match outcome {
            OperationOutcome::AlreadyAbsent => self.already_absent += 1,
            OperationOutcome::SourceVanished => self.failed += 1,
            OperationOutcome::Applied { bytes } => {
                self.bytes_copied += bytes;
                match (operation.kind, operation.target_kind) {
                    (OperationKind::Create, TargetKind::Folder) => self.folders_created += 1,
                    (OperationKind::Create, TargetKind::File) => self.files_created += 1,
                    (OperationKind::Copy, _) => self.files_copied += 1,
                    (OperationKind::Remove, TargetKind::File) => self.files_removed += 1,
                    (OperationKind::Remove, TargetKind::Folder) => self.folders_removed += 1,
                }
            }
        }
    }

    /// Number of operations processed
    pub fn processed(&self) -> usize {
        self.folders_created
            + self.files_created
            + self.files_copied
            + self.files_removed
            + self.folders_removed
            + self.already_absent
            + self.failed
    }
}

/// Everything worth knowing about one finished cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub started_at: SystemTime,
    pub duration: Duration,
    pub source_files: usize,
    pub replica_files: usize,
    pub plan: PlanSummary,
    pub operations: OperationStats,
}

impl CycleReport {
    /// True when the replica already mirrored the source
    pub fn is_noop(&self) -> bool {
        self.plan.total_operations == 0
    }

    pub fn is_successful(&self) -> bool {
        self.operations.failed == 0
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ops = &self.operations;
        write!(
            f,
            "{} operations in {:.2?}: {} folders created, {} files created, {} files copied, \
             {} files removed, {} folders removed, {} already absent, {} failed, \
             {} timestamps aligned, {} bytes copied",
            self.plan.total_operations,
            self.duration,
            ops.folders_created,
            ops.files_created,
            ops.files_copied,
            ops.files_removed,
            ops.folders_removed,
            ops.already_absent,
            ops.failed,
            self.plan.timestamps_aligned,
            ops.bytes_copied
        )
    }
}
