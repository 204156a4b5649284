//! Line-oriented log sinks the engine reports operation outcomes to

use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;

use crate::error::{Result, SyncError};

/// Severity attached to a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// Anything that accepts a line of text.
///
/// Sinks must not fail the caller: a sink that cannot write reports the
/// problem through `tracing` and drops the line.
pub trait LogSink: Send + Sync {
    fn write_line(&self, level: LogLevel, line: &str);
}

/// Discards every line
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn write_line(&self, _level: LogLevel, _line: &str) {}
}

/// Forwards lines to the `tracing` subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write_line(&self, level: LogLevel, line: &str) {
        match level {
            LogLevel::Info => tracing::info!(target: "replica_sync::sync", "{}", line),
            LogLevel::Warn => tracing::warn!(target: "replica_sync::sync", "{}", line),
            LogLevel::Error => tracing::error!(target: "replica_sync::sync", "{}", line),
        }
    }
}

/// Appends timestamped lines to a file, optionally echoing them to stdout
pub struct FileSink {
    path: PathBuf,
    writer: Mutex<LineWriter<File>>,
    echo: bool,
}

impl FileSink {
    /// Open (or create) the log file in append mode
    pub fn open(path: impl AsRef<Path>, echo: bool) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SyncError::io_error(parent, e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| SyncError::io_error(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(LineWriter::new(file)),
            echo,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileSink {
    fn write_line(&self, level: LogLevel, line: &str) {
        let entry = format!(
            "{} [{}] {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            level.as_str(),
            line
        );

        if self.echo {
            println!("{}", entry);
        }

        let mut writer = self.writer.lock();
        if let Err(e) = writeln!(writer, "{}", entry) {
            tracing::warn!("Failed to write to log file '{}': {}", self.path.display(), e);
        }
    }
}

impl std::fmt::Debug for FileSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSink")
            .field("path", &self.path)
            .field("echo", &self.echo)
            .finish()
    }
}

/// Keeps every line in memory; handy for inspecting a run after the fact
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines.lock().clone()
    }

    /// Lines logged at error level
    pub fn errors(&self) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|(level, _)| *level == LogLevel::Error)
            .map(|(_, line)| line.clone())
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|(_, line)| line.contains(needle))
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl LogSink for MemorySink {
    fn write_line(&self, level: LogLevel, line: &str) {
        self.lines.lock().push((level, line.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_sink_appends_timestamped_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("logs").join("sync.log");

        {
            let sink = FileSink::open(&path, false).unwrap();
            sink.write_line(LogLevel::Info, "Synchronization started");
            sink.write_line(LogLevel::Error, "source file was deleted");
        }
        {
            let sink = FileSink::open(&path, false).unwrap();
            sink.write_line(LogLevel::Info, "Synchronization completed");
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("[INFO] Synchronization started"));
        assert!(lines[1].contains("[ERROR] source file was deleted"));
        assert!(lines[2].ends_with("Synchronization completed"));
    }

    #[test]
    fn test_memory_sink_filters_errors() {
        let sink = MemorySink::new();
        sink.write_line(LogLevel::Info, "ok");
        sink.write_line(LogLevel::Error, "bad");

        assert_eq!(sink.lines().len(), 2);
        assert_eq!(sink.errors(), vec!["bad".to_string()]);
        assert!(sink.contains("ok"));

        sink.clear();
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn test_null_and_tracing_sinks_accept_lines() {
        NullSink.write_line(LogLevel::Error, "dropped");
        TracingSink.write_line(LogLevel::Warn, "forwarded");
    }
}
