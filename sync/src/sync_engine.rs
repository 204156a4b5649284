//! Main sync engine that orchestrates one scan-diff-execute cycle

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::comparator::{ContentComparator, HashAlgorithm};
use crate::config::Settings;
use crate::diff::{DiffEngine, DiffOptions};
use crate::error::{Result, SyncError};
use crate::executor::OperationExecutor;
use crate::log_sink::{LogLevel, LogSink};
use crate::metrics::CycleReport;
use crate::scanner::TreeScanner;

/// Options for sync operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Digest used to compare file content
    pub hash_algorithm: HashAlgorithm,
    /// Path matching rules for the diff
    pub diff_options: DiffOptions,
    /// Buffer size for hashing
    pub buffer_size: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::default(),
            diff_options: DiffOptions::default(),
            buffer_size: 64 * 1024, // 64KB
        }
    }
}

/// Mirrors one source tree onto one replica tree.
///
/// Holds no state between cycles: each [`Synchronizer::run_once`] rescans
/// both trees from scratch.
pub struct Synchronizer {
    source_root: PathBuf,
    replica_root: PathBuf,
    scanner: TreeScanner,
    diff_engine: DiffEngine,
    sink: Arc<dyn LogSink>,
    cancel: Option<CancellationToken>,
}

impl Synchronizer {
    pub fn new(
        source_root: impl Into<PathBuf>,
        replica_root: impl Into<PathBuf>,
        options: SyncOptions,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        let comparator =
            ContentComparator::new(options.hash_algorithm).with_buffer_size(options.buffer_size);

        Self {
            source_root: source_root.into(),
            replica_root: replica_root.into(),
            scanner: TreeScanner::new(),
            diff_engine: DiffEngine::new(comparator, options.diff_options),
            sink,
            cancel: None,
        }
    }

    pub fn from_settings(settings: &Settings, sink: Arc<dyn LogSink>) -> Self {
        Self::new(
            &settings.source,
            &settings.replica,
            settings.sync_options(),
            sink,
        )
    }

    /// Stop between operations once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn replica_root(&self) -> &Path {
        &self.replica_root
    }

    /// Run one full cycle and report what it did.
    ///
    /// A tree-access or filesystem error aborts this cycle only; the caller
    /// decides whether to schedule another.
    pub async fn run_once(&self) -> Result<CycleReport> {
        self.sink.write_line(LogLevel::Info, "Synchronization started");

        match self.cycle().await {
            Ok(report) => {
                info!("Cycle finished: {}", report);
                self.sink.write_line(LogLevel::Info, "Synchronization completed");
                Ok(report)
            }
            Err(e) => {
                self.sink
                    .write_line(LogLevel::Error, &format!("Synchronization failed: {}", e));
                Err(e)
            }
        }
    }

    async fn cycle(&self) -> Result<CycleReport> {
        let started_at = SystemTime::now();
        let start = Instant::now();

        fs::create_dir_all(&self.replica_root).await.map_err(|e| {
            SyncError::tree_access_error(
                &self.replica_root,
                format!("Failed to create replica directory: {}", e),
            )
        })?;

        let source = self.scanner.scan(&self.source_root).await?;
        let replica = self.scanner.scan_replica(&self.replica_root).await?;
        debug!(
            "Scanned {} source files and {} replica files",
            source.file_count(),
            replica.file_count()
        );

        let plan = self.diff_engine.diff(&source, &replica).await?;
        let summary = plan.summary.clone();

        let mut executor = OperationExecutor::new(&self.source_root, self.sink.clone());
        if let Some(token) = &self.cancel {
            executor = executor.with_cancellation(token.clone());
        }
        let operations = executor.execute(plan.operations).await?;

        Ok(CycleReport {
            started_at,
            duration: start.elapsed(),
            source_files: source.file_count(),
            replica_files: replica.file_count(),
            plan: summary,
            operations,
        })
    }
}
