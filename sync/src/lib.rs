//! One-way directory mirroring engine
//!
//! Each cycle scans the source and replica trees into snapshots, diffs them
//! into a FIFO queue of create/copy/remove operations and applies that queue
//! to the replica:
//! - Snapshot model and tree scanning
//! - Content comparison by size and streamed digest
//! - Two-pass diff (prune, then reconcile)
//! - Operation execution tolerant of sources vanishing mid-run
//! - Interval scheduling and pluggable log sinks

pub mod snapshot;
pub mod scanner;
pub mod comparator;
pub mod diff;
pub mod executor;
pub mod sync_engine;
pub mod scheduler;
pub mod log_sink;
pub mod metrics;
pub mod config;
pub mod error;

// Re-export main types and functions
pub use snapshot::{FileEntry, FolderEntry, Snapshot};
pub use scanner::TreeScanner;
pub use comparator::{ContentComparator, HashAlgorithm};
pub use diff::{
    CaseSensitivity, DiffEngine, DiffOptions, OperationKind, PlanSummary, SyncOperation,
    SyncPlan, TargetKind,
};
pub use executor::OperationExecutor;
pub use sync_engine::{SyncOptions, Synchronizer};
pub use scheduler::IntervalScheduler;
pub use log_sink::{FileSink, LogLevel, LogSink, MemorySink, NullSink, TracingSink};
pub use metrics::{CycleReport, OperationOutcome, OperationStats};
pub use config::{parse_interval, Settings};
pub use error::{Result, SyncError};

use std::sync::Arc;

/// Run a single mirroring cycle from `source` onto `replica`
pub async fn sync_directories(
    source: impl AsRef<std::path::Path>,
    replica: impl AsRef<std::path::Path>,
    options: SyncOptions,
    sink: Arc<dyn LogSink>,
) -> Result<CycleReport> {
    let synchronizer = Synchronizer::new(source.as_ref(), replica.as_ref(), options, sink);
    synchronizer.run_once().await
}

/// Scan a directory tree into a snapshot
pub async fn scan_directory(path: impl AsRef<std::path::Path>) -> Result<Snapshot> {
    TreeScanner::new().scan(path).await
}

/// Compare two files by content
pub async fn files_equal(
    a: impl AsRef<std::path::Path>,
    b: impl AsRef<std::path::Path>,
) -> Result<bool> {
    ContentComparator::default().equal(a, b).await
}

#[cfg(test)]
mod cycle_tests;
