//! End-to-end tests running full synchronization cycles on temporary trees

use super::*;
use filetime::FileTime;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio::fs;
use walkdir::WalkDir;

struct Fixture {
    _temp: TempDir,
    source: PathBuf,
    replica: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        let replica = temp.path().join("replica");
        std::fs::create_dir_all(&source).unwrap();
        Self {
            _temp: temp,
            source,
            replica,
        }
    }

    fn synchronizer(&self, sink: Arc<dyn LogSink>) -> Synchronizer {
        let options = SyncOptions {
            diff_options: DiffOptions {
                case_sensitivity: CaseSensitivity::Sensitive,
            },
            ..SyncOptions::default()
        };
        Synchronizer::new(&self.source, &self.replica, options, sink)
    }
}

fn write(root: &Path, relative: &str, content: &[u8]) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

#[derive(Debug, PartialEq, Eq)]
enum Node {
    Folder,
    File(Vec<u8>, SystemTime),
}

/// Every entry below `root`, keyed by relative path
fn tree(root: &Path) -> BTreeMap<PathBuf, Node> {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|entry| {
            let entry = entry.unwrap();
            let relative = entry.path().strip_prefix(root).unwrap().to_path_buf();
            let node = if entry.file_type().is_dir() {
                Node::Folder
            } else {
                let metadata = entry.metadata().unwrap();
                Node::File(
                    std::fs::read(entry.path()).unwrap(),
                    metadata.modified().unwrap(),
                )
            };
            (relative, node)
        })
        .collect()
}

fn assert_mirrored(fixture: &Fixture) {
    assert_eq!(tree(&fixture.source), tree(&fixture.replica));
}

mod scenario_tests {
    use super::*;

    #[tokio::test]
    async fn test_single_file_into_empty_replica() {
        let fixture = Fixture::new();
        write(&fixture.source, "a.txt", b"X");

        let sink = Arc::new(MemorySink::new());
        let report = fixture.synchronizer(sink.clone()).run_once().await.unwrap();

        assert_eq!(report.plan.total_operations, 1);
        assert_eq!(report.operations.files_created, 1);
        assert_eq!(std::fs::read(fixture.replica.join("a.txt")).unwrap(), b"X");
        assert_mirrored(&fixture);
    }

    #[tokio::test]
    async fn test_changed_file_is_replaced() {
        let fixture = Fixture::new();
        write(&fixture.source, "sub/b.txt", b"Y");
        write(&fixture.replica, "sub/b.txt", b"Z");

        let report = fixture
            .synchronizer(Arc::new(NullSink))
            .run_once()
            .await
            .unwrap();

        assert_eq!(report.plan.total_operations, 1);
        assert_eq!(report.operations.files_copied, 1);
        assert_eq!(std::fs::read(fixture.replica.join("sub").join("b.txt")).unwrap(), b"Y");
        assert_mirrored(&fixture);
    }

    #[tokio::test]
    async fn test_orphan_folder_removed() {
        let fixture = Fixture::new();
        write(&fixture.replica, "old/a.txt", b"a");
        write(&fixture.replica, "old/deep/er/b.txt", b"b");

        let sink = Arc::new(MemorySink::new());
        let report = fixture.synchronizer(sink.clone()).run_once().await.unwrap();

        assert_eq!(report.plan.total_operations, 1);
        assert_eq!(report.operations.folders_removed, 1);
        assert!(!fixture.replica.join("old").exists());
        assert!(sink.contains("Deleted directory:"));
    }

    #[tokio::test]
    async fn test_identical_content_only_aligns_timestamp() {
        let fixture = Fixture::new();
        let source_file = write(&fixture.source, "same.txt", b"same");
        let replica_file = write(&fixture.replica, "same.txt", b"same");
        let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_234_567_890);
        filetime::set_file_mtime(&source_file, FileTime::from_system_time(stamp)).unwrap();

        let report = fixture
            .synchronizer(Arc::new(NullSink))
            .run_once()
            .await
            .unwrap();

        assert!(report.is_noop());
        assert_eq!(report.plan.copies, 0);
        assert_eq!(report.plan.timestamps_aligned, 1);
        assert_eq!(std::fs::metadata(&replica_file).unwrap().modified().unwrap(), stamp);
    }
}

/// Deletes a source file as soon as the executor reports its first removal,
/// i.e. after the diff but before the queued create runs
struct VanishingSink {
    inner: MemorySink,
    victim: PathBuf,
}

impl LogSink for VanishingSink {
    fn write_line(&self, level: LogLevel, line: &str) {
        if line.starts_with("Deleted file:") {
            let _ = std::fs::remove_file(&self.victim);
        }
        self.inner.write_line(level, line);
    }
}

#[tokio::test]
async fn test_source_vanishing_mid_cycle() {
    let fixture = Fixture::new();
    let victim = write(&fixture.source, "a.txt", b"short-lived");
    write(&fixture.source, "b.txt", b"stays");
    write(&fixture.replica, "stale.txt", b"old");

    let sink = Arc::new(VanishingSink {
        inner: MemorySink::new(),
        victim,
    });
    let report = fixture.synchronizer(sink.clone()).run_once().await.unwrap();

    assert_eq!(report.plan.total_operations, 3);
    assert_eq!(report.operations.files_removed, 1);
    assert_eq!(report.operations.failed, 1);
    assert_eq!(report.operations.files_created, 1);
    assert!(!report.is_successful());

    assert!(!fixture.replica.join("a.txt").exists());
    assert!(fixture.replica.join("b.txt").exists());

    let errors = sink.inner.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("source file was deleted during synchronization"));
    assert!(sink.inner.contains("Synchronization completed"));

    // next cycle sees a consistent pair of trees
    let report = fixture.synchronizer(Arc::new(NullSink)).run_once().await.unwrap();
    assert!(report.is_noop());
    assert_mirrored(&fixture);
}

#[test_log::test(tokio::test)]
async fn test_second_cycle_is_empty() {
    let fixture = Fixture::new();
    write(&fixture.source, "root.txt", b"root");
    write(&fixture.source, "docs/guide.md", b"# guide");
    write(&fixture.source, "docs/img/logo.png", &[0u8, 1, 2, 3]);
    std::fs::create_dir_all(fixture.source.join("empty")).unwrap();
    write(&fixture.replica, "docs/guide.md", b"# draft");
    write(&fixture.replica, "trash/junk.bin", b"junk");

    let synchronizer = fixture.synchronizer(Arc::new(TracingSink));

    let first = synchronizer.run_once().await.unwrap();
    assert!(!first.is_noop());
    assert_mirrored(&fixture);

    let second = synchronizer.run_once().await.unwrap();
    assert!(second.is_noop(), "second cycle planned {:?}", second.plan);
    assert_eq!(second.plan.timestamps_aligned, 0);
    assert_mirrored(&fixture);
}

#[tokio::test]
async fn test_sync_directories_helper() {
    let fixture = Fixture::new();
    write(&fixture.source, "x/y/z.txt", b"z");

    let report = sync_directories(
        &fixture.source,
        &fixture.replica,
        SyncOptions::default(),
        Arc::new(NullSink),
    )
    .await
    .unwrap();

    assert_eq!(report.operations.folders_created, 2);
    assert_eq!(report.operations.files_created, 1);
    assert!(files_equal(fixture.source.join("x/y/z.txt"), fixture.replica.join("x/y/z.txt"))
        .await
        .unwrap());
    assert_eq!(scan_directory(&fixture.replica).await.unwrap().file_count(), 1);
}

fn arb_relative_file() -> impl Strategy<Value = String> {
    (
        prop::collection::vec(prop::sample::select(vec!["d1", "d2", "d3"]), 0..3),
        prop::sample::select(vec!["x.f", "y.f", "z.f"]),
    )
        .prop_map(|(dirs, file)| {
            let mut parts: Vec<&str> = dirs;
            parts.push(file);
            parts.join("/")
        })
}

fn arb_tree() -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
    prop::collection::btree_map(
        arb_relative_file(),
        prop::collection::vec(prop::sample::select(vec![b'a', b'b']), 0..4),
        0..8,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_one_cycle_mirrors_and_second_is_empty(
        source_tree in arb_tree(),
        replica_tree in arb_tree(),
    ) {
        let fixture = Fixture::new();
        for (relative, content) in &source_tree {
            write(&fixture.source, relative, content);
        }
        for (relative, content) in &replica_tree {
            write(&fixture.replica, relative, content);
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let (first, second) = runtime.block_on(async {
            let synchronizer = fixture.synchronizer(Arc::new(NullSink));
            let first = synchronizer.run_once().await.unwrap();
            let second = synchronizer.run_once().await.unwrap();
            (first, second)
        });

        prop_assert_eq!(tree(&fixture.source), tree(&fixture.replica));
        prop_assert_eq!(first.operations.failed, 0);
        prop_assert!(second.is_noop());
    }
}

#[tokio::test]
async fn test_file_sink_records_cycle() {
    let fixture = Fixture::new();
    write(&fixture.source, "a.txt", b"a");
    let log_path = fixture.replica.parent().unwrap().join("logs").join("sync.log");

    let sink = Arc::new(FileSink::open(&log_path, false).unwrap());
    fixture.synchronizer(sink).run_once().await.unwrap();

    let log = fs::read_to_string(&log_path).await.unwrap();
    let lines: Vec<_> = log.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].ends_with("Synchronization started"));
    assert!(lines[1].contains("Created file:"));
    assert!(lines[1].contains(&fixture.replica.join("a.txt").display().to_string()));
    assert!(lines[2].ends_with("Synchronization completed"));
}

#[cfg(unix)]
mod replica_link_tests {
    use super::*;
    use std::os::unix::fs::symlink;

    #[tokio::test]
    async fn test_directory_link_in_replica_is_replaced_not_followed() {
        let fixture = Fixture::new();
        let outside = fixture.replica.parent().unwrap().join("outside");
        std::fs::create_dir_all(&outside).unwrap();
        std::fs::create_dir_all(&fixture.replica).unwrap();
        symlink(&outside, fixture.replica.join("docs")).unwrap();
        write(&fixture.source, "docs/secret.txt", b"secret");

        let report = fixture
            .synchronizer(Arc::new(NullSink))
            .run_once()
            .await
            .unwrap();

        assert_eq!(report.operations.files_removed, 1);
        assert_eq!(report.operations.folders_created, 1);
        assert!(!outside.join("secret.txt").exists());
        assert!(std::fs::read_dir(&outside).unwrap().next().is_none());

        let docs = std::fs::symlink_metadata(fixture.replica.join("docs")).unwrap();
        assert!(docs.is_dir());
        assert!(!docs.file_type().is_symlink());
        assert_mirrored(&fixture);
    }

    #[tokio::test]
    async fn test_file_link_in_replica_is_not_written_through() {
        let fixture = Fixture::new();
        let outside = fixture.replica.parent().unwrap().join("outside.txt");
        std::fs::write(&outside, b"untouched").unwrap();
        std::fs::create_dir_all(&fixture.replica).unwrap();
        symlink(&outside, fixture.replica.join("a.txt")).unwrap();
        write(&fixture.source, "a.txt", b"fresh");

        fixture
            .synchronizer(Arc::new(NullSink))
            .run_once()
            .await
            .unwrap();

        assert_eq!(std::fs::read(&outside).unwrap(), b"untouched");
        let replica_file = fixture.replica.join("a.txt");
        assert!(!std::fs::symlink_metadata(&replica_file).unwrap().file_type().is_symlink());
        assert_mirrored(&fixture);
    }

    #[tokio::test]
    async fn test_dangling_link_in_replica_is_removed() {
        let fixture = Fixture::new();
        std::fs::create_dir_all(fixture.replica.join("sub")).unwrap();
        symlink(fixture.replica.join("nowhere"), fixture.replica.join("ghost")).unwrap();
        std::fs::create_dir_all(fixture.source.join("sub")).unwrap();

        let sink = Arc::new(MemorySink::new());
        let report = fixture.synchronizer(sink.clone()).run_once().await.unwrap();

        assert_eq!(report.plan.file_removes, 1);
        assert!(std::fs::symlink_metadata(fixture.replica.join("ghost")).is_err());
        assert!(sink.contains("Deleted file:"));
        assert_mirrored(&fixture);

        let second = fixture.synchronizer(Arc::new(NullSink)).run_once().await.unwrap();
        assert!(second.is_noop());
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_unreadable_source_folder_leaves_replica_untouched() {
    use std::os::unix::fs::PermissionsExt;

    let fixture = Fixture::new();
    write(&fixture.source, "kept.txt", b"kept");
    let locked = fixture.source.join("locked");
    write(&fixture.source, "locked/inner.txt", b"inner");
    write(&fixture.replica, "kept.txt", b"kept");
    write(&fixture.replica, "locked/inner.txt", b"inner");
    write(&fixture.replica, "extra.txt", b"extra");

    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
    let readable = std::fs::read_dir(&locked).is_ok();

    let sink = Arc::new(MemorySink::new());
    let result = fixture.synchronizer(sink.clone()).run_once().await;
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

    if readable {
        return;
    }
    assert!(matches!(result, Err(SyncError::TreeAccess { .. })));
    assert!(!sink.contains("Deleted"));
    assert!(fixture.replica.join("locked").join("inner.txt").exists());
    assert!(fixture.replica.join("extra.txt").exists());
    assert!(sink.errors()[0].starts_with("Synchronization failed:"));
}
