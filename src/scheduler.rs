//! Compaction Scheduler
//!
//! Periodically compacts the rotated segments of a commit log, using the
//! consumers' committed offsets to decide what is safe to rewrite.
//!
//! ## Safe Offset
//! The lowest newest-committed offset across all consumers, capped by the
//! log's newest offset. A consumer that has committed nothing pins the safe
//! offset to 0, so nothing is compacted until every consumer has progressed.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError, Sender};

use crate::commitlog::{CommitLog, CompactionReport, Compactor, NamespaceCompactor};
use crate::error::Result;
use crate::offset::OffsetManager;

/// Oldest offset not yet guaranteed delivered to every consumer
pub fn safe_offset(log: &CommitLog, consumers: &[Arc<dyn OffsetManager>]) -> u64 {
    consumers
        .iter()
        .map(|consumer| consumer.newest_offset().unwrap_or(0))
        .fold(log.newest_offset(), u64::min)
}

/// Run one compaction pass over every non-active segment
pub fn compact_once(log: &CommitLog, consumers: &[Arc<dyn OffsetManager>]) -> CompactionReport {
    let safe_offset = safe_offset(log, consumers);
    let segments = log.segments();
    let rotated = &segments[..segments.len() - 1];
    NamespaceCompactor::new(log).compact(safe_offset, rotated)
}

/// Background thread running `compact_once` every interval
///
/// Stops on `shutdown()` or drop. Shutdown waits for a pass in progress.
pub struct CompactionScheduler {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CompactionScheduler {
    pub fn start(
        log: Arc<CommitLog>,
        consumers: Vec<Arc<dyn OffsetManager>>,
        interval: Duration,
    ) -> Result<Self> {
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("xlog-compaction".to_string())
            .spawn(move || {
                tracing::info!(interval_ms = interval.as_millis() as u64, "starting compaction routine");
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let report = compact_once(&log, &consumers);
                    tracing::info!(
                        compacted = report.compacted.len(),
                        skipped = report.skipped.len(),
                        failed = report.failed.len(),
                        bytes_saved = report.bytes_saved(),
                        "compaction pass finished"
                    );
                }
                tracing::info!("stopping compaction routine");
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop the background thread and wait for it to exit
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // Dropping the sender wakes the thread with `Disconnected`
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("compaction thread panicked");
            }
        }
    }
}

impl Drop for CompactionScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
