//! Applies a queued sync plan against the replica tree

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use filetime::FileTime;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::diff::{OperationKind, SyncOperation, TargetKind};
use crate::error::{Result, SyncError};
use crate::log_sink::{LogLevel, LogSink};
use crate::metrics::{OperationOutcome, OperationStats};

/// Consumes operations strictly in FIFO order.
///
/// A source file that disappears before it is copied is a per-operation
/// failure: it is logged and the remaining operations still run. Any other
/// filesystem error aborts the run.
pub struct OperationExecutor {
    source_root: PathBuf,
    sink: Arc<dyn LogSink>,
    cancel: Option<CancellationToken>,
}

impl OperationExecutor {
    pub fn new(source_root: impl Into<PathBuf>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            source_root: source_root.into(),
            sink,
            cancel: None,
        }
    }

    /// Check `token` before every operation
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub async fn execute(&self, operations: VecDeque<SyncOperation>) -> Result<OperationStats> {
        let mut stats = OperationStats::default();

        for operation in operations {
            if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                return Err(SyncError::Cancelled);
            }

            debug!("Executing {}", operation);
            let outcome = self.apply(&operation).await?;
            stats.record(&operation, outcome);
        }

        Ok(stats)
    }

    async fn apply(&self, operation: &SyncOperation) -> Result<OperationOutcome> {
        let target = operation.target.as_path();

        match (operation.kind, operation.target_kind) {
            (OperationKind::Create | OperationKind::Copy, TargetKind::File) => {
                let source = self.source_path(operation);
                self.transfer_file(operation.kind, &source, target).await
            }

            (OperationKind::Create | OperationKind::Copy, TargetKind::Folder) => {
                fs::create_dir_all(target)
                    .await
                    .map_err(|e| SyncError::io_error(target, e))?;
                self.log(LogLevel::Info, format!("Created directory: {}", target.display()));
                Ok(OperationOutcome::Applied { bytes: 0 })
            }

            (OperationKind::Remove, TargetKind::File) => match unlink(target).await {
                Ok(()) => {
                    self.log(LogLevel::Info, format!("Deleted file: {}", target.display()));
                    Ok(OperationOutcome::Applied { bytes: 0 })
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    self.log(LogLevel::Info, format!("File already absent: {}", target.display()));
                    Ok(OperationOutcome::AlreadyAbsent)
                }
                Err(e) => Err(SyncError::io_error(target, e)),
            },

            (OperationKind::Remove, TargetKind::Folder) => match fs::remove_dir_all(target).await {
                Ok(()) => {
                    self.log(LogLevel::Info, format!("Deleted directory: {}", target.display()));
                    Ok(OperationOutcome::Applied { bytes: 0 })
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    self.log(
                        LogLevel::Info,
                        format!("Directory already absent: {}", target.display()),
                    );
                    Ok(OperationOutcome::AlreadyAbsent)
                }
                Err(e) => Err(SyncError::io_error(target, e)),
            },
        }
    }

    /// Copy `source` over `target` and stamp it with the source timestamp
    async fn transfer_file(
        &self,
        kind: OperationKind,
        source: &Path,
        target: &Path,
    ) -> Result<OperationOutcome> {
        let metadata = match fs::metadata(source).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return self.source_vanished(kind, source, target).await,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return self.source_vanished(kind, source, target).await
            }
            Err(e) => return Err(SyncError::io_error(source, e)),
        };

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::io_error(parent, e))?;
        }

        let bytes = match fs::copy(source, target).await {
            Ok(bytes) => bytes,
            // the source can still disappear between the stat and the copy
            Err(e) if e.kind() == ErrorKind::NotFound && !source.exists() => {
                return self.source_vanished(kind, source, target).await
            }
            Err(e) => return Err(SyncError::io_error(target, e)),
        };

        if let Ok(modified) = metadata.modified() {
            filetime::set_file_mtime(target, FileTime::from_system_time(modified))
                .map_err(|e| SyncError::io_error(target, e))?;
        }

        let verb = match kind {
            OperationKind::Copy => "Copied",
            _ => "Created",
        };
        self.log(
            LogLevel::Info,
            format!("{} file: {} to {}", verb, source.display(), target.display()),
        );

        Ok(OperationOutcome::Applied { bytes })
    }

    async fn source_vanished(
        &self,
        kind: OperationKind,
        source: &Path,
        target: &Path,
    ) -> Result<OperationOutcome> {
        match fs::remove_file(target).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(SyncError::io_error(target, e)),
        }

        let action = match kind {
            OperationKind::Copy => "copying",
            _ => "creating",
        };
        self.log(
            LogLevel::Error,
            format!(
                "Error {} the file, source file was deleted during synchronization: {} (target {})",
                action,
                source.display(),
                target.display()
            ),
        );

        Ok(OperationOutcome::SourceVanished)
    }

    fn source_path(&self, operation: &SyncOperation) -> PathBuf {
        self.source_root.join(&operation.relative_path)
    }

    fn log(&self, level: LogLevel, line: String) {
        self.sink.write_line(level, &line);
    }
}

/// Remove a file or link without following it
async fn unlink(target: &Path) -> std::io::Result<()> {
    match fs::remove_file(target).await {
        // directory symlinks on Windows need `remove_dir`
        Err(e) if e.kind() != ErrorKind::NotFound => match fs::symlink_metadata(target).await {
            Ok(metadata) if metadata.file_type().is_symlink() => fs::remove_dir(target).await,
            _ => Err(e),
        },
        result => result,
    }
}
