//! Fixed-interval loop around [`Synchronizer::run_once`]

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{Result, SyncError};
use crate::sync_engine::Synchronizer;

/// Runs a cycle, sleeps for the interval, and repeats.
///
/// The next cycle starts only after the previous one finished; there is no
/// catch-up when a cycle overruns the interval.
#[derive(Debug, Clone)]
pub struct IntervalScheduler {
    interval: Duration,
    cancel: CancellationToken,
    max_cycles: Option<usize>,
}

impl IntervalScheduler {
    pub fn new(interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            interval,
            cancel,
            max_cycles: None,
        }
    }

    /// Stop after `cycles` runs instead of looping until cancelled
    pub fn with_max_cycles(mut self, cycles: usize) -> Self {
        self.max_cycles = Some(cycles);
        self
    }

    /// Loop until cancelled, returning the number of cycles started.
    ///
    /// A failed cycle is logged and the schedule continues; only fatal errors
    /// end the loop early.
    pub async fn run(&self, synchronizer: &Synchronizer) -> Result<usize> {
        info!(
            "Mirroring '{}' to '{}' every {:?}",
            synchronizer.source_root().display(),
            synchronizer.replica_root().display(),
            self.interval
        );

        let mut cycles = 0;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            cycles += 1;
            match synchronizer.run_once().await {
                Ok(report) => debug!("Cycle {} done: {}", cycles, report),
                Err(SyncError::Cancelled) => break,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => error!("Cycle {} failed: {}", cycles, e),
            }

            if self.max_cycles.is_some_and(|max| cycles >= max) {
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Scheduler stopped after {} cycles", cycles);
        Ok(cycles)
    }
}
