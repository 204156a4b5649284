use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use replica_sync::{
    CaseSensitivity, FileSink, HashAlgorithm, IntervalScheduler, LogSink, Settings, Synchronizer,
    TracingSink,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "replica-sync")]
#[command(about = "Periodically mirror a source folder onto a replica folder")]
#[command(version)]
struct Cli {
    /// Folder to mirror
    source: Option<PathBuf>,

    /// Folder that becomes an exact copy of the source
    replica: Option<PathBuf>,

    /// File that receives one line per synchronization step
    log_file: Option<PathBuf>,

    /// Seconds between synchronization runs
    interval: Option<String>,

    /// Load settings from a TOML file instead of positional arguments
    #[arg(short, long, conflicts_with_all = ["source", "replica", "log_file", "interval"])]
    config: Option<PathBuf>,

    /// Run a single synchronization and exit
    #[arg(long)]
    once: bool,

    /// Digest used to compare file content (blake3 or sha256)
    #[arg(long)]
    hash: Option<HashAlgorithm>,

    /// Path matching rule (sensitive or insensitive); defaults to the host filesystem's
    #[arg(long)]
    case_sensitivity: Option<CaseSensitivity>,

    /// Log level for diagnostic output
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::load(path)?,
            None => {
                let (Some(source), Some(replica), Some(log_file), Some(interval)) =
                    (&self.source, &self.replica, &self.log_file, &self.interval)
                else {
                    bail!(
                        "Usage: replica-sync <SOURCE> <REPLICA> <LOG_FILE> <INTERVAL_SECONDS> \
                         (or replica-sync --config <FILE>)"
                    );
                };
                Settings::from_args(source, replica, Some(log_file.clone()), interval)?
            }
        };

        if let Some(hash) = self.hash {
            settings.hash_algorithm = hash;
        }
        if let Some(case_sensitivity) = self.case_sensitivity {
            settings.case_sensitivity = Some(case_sensitivity);
        }

        Ok(settings)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    let settings = cli.settings()?;

    let sink: Arc<dyn LogSink> = match &settings.log_file {
        Some(path) => Arc::new(
            FileSink::open(path, true)
                .with_context(|| format!("Failed to open log file {}", path.display()))?,
        ),
        None => Arc::new(TracingSink),
    };

    let token = CancellationToken::new();
    let synchronizer = Synchronizer::from_settings(&settings, sink).with_cancellation(token.clone());

    if cli.once {
        let report = synchronizer.run_once().await?;
        info!("{}", report);
        return Ok(());
    }

    let shutdown = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current operation");
            shutdown.cancel();
        }
    });

    IntervalScheduler::new(settings.interval(), token)
        .run(&synchronizer)
        .await?;

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Invalid log level")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    Ok(())
}
