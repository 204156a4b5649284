//! Mirror a small generated tree twice and show what each cycle did

use std::error::Error;
use std::sync::Arc;

use replica_sync::{MemorySink, SyncOptions, Synchronizer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    println!("Basic Mirroring Example");
    println!("=======================");

    let temp_dir = tempfile::TempDir::new()?;
    let source_dir = temp_dir.path().join("source");
    let replica_dir = temp_dir.path().join("replica");

    tokio::fs::create_dir_all(source_dir.join("subdir")).await?;
    tokio::fs::write(source_dir.join("file1.txt"), b"This is file 1 content").await?;
    tokio::fs::write(source_dir.join("subdir").join("file2.txt"), b"This is file 2 content").await?;

    // something the source does not have
    tokio::fs::create_dir_all(replica_dir.join("stale")).await?;
    tokio::fs::write(replica_dir.join("stale").join("old.txt"), b"outdated").await?;

    println!("Source directory: {}", source_dir.display());
    println!("Replica directory: {}", replica_dir.display());
    println!();

    let sink = Arc::new(MemorySink::new());
    let synchronizer = Synchronizer::new(&source_dir, &replica_dir, SyncOptions::default(), sink.clone());

    for cycle in 1..=2 {
        let report = synchronizer.run_once().await?;
        println!("Cycle {}: {}", cycle, report);
    }

    println!();
    println!("Log:");
    for (level, line) in sink.lines() {
        println!("  [{}] {}", level.as_str(), line);
    }

    Ok(())
}
