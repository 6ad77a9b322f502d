//! Progress reporting for a running job.
//!
//! Two channels feed the caller:
//!
//! - **Events**: workers call the [`OrchestrationProgressCallback`] as each
//!   unit starts, succeeds or fails.
//! - **Snapshots**: a [`ProgressReporter`] task wakes on a fixed interval,
//!   reads the [`WorkBoard`] under its read lock, logs the counts at `info`
//!   and forwards a [`ProgressSnapshot`] to the callback. It never mutates
//!   units.
//!
//! # Example
//!
//! ```rust
//! use notebooklm_gen::{JobConfig, OrchestrationProgressCallback, ProgressSnapshot};
//! use std::sync::Arc;
//!
//! struct PrintSnapshots;
//!
//! impl OrchestrationProgressCallback for PrintSnapshots {
//!     fn on_snapshot(&self, s: &ProgressSnapshot) {
//!         eprintln!("{}/{} units finished", s.counts.terminal(), s.total);
//!     }
//! }
//!
//! let config = JobConfig::builder("notes.md")
//!     .progress_callback(Arc::new(PrintSnapshots))
//!     .build()
//!     .unwrap();
//! ```

use crate::board::{StatusCounts, WorkBoard, WorkUnit};
use crate::report::RunReport;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Called by the orchestrator while a job runs.
///
/// Unit events may arrive concurrently from several workers; protect shared
/// state accordingly. Every method defaults to a no-op.
pub trait OrchestrationProgressCallback: Send + Sync {
    /// The plan is fixed: `total` units, `skipped` of them skipped up front.
    fn on_plan_built(&self, total: usize, skipped: usize) {
        let _ = (total, skipped);
    }

    /// `unit` just moved to Running.
    fn on_unit_start(&self, unit: &WorkUnit) {
        let _ = unit;
    }

    /// `unit` succeeded and its primary file is at `artifact`.
    fn on_unit_complete(&self, unit: &WorkUnit, artifact: &Path) {
        let _ = (unit, artifact);
    }

    /// `unit` failed for good.
    fn on_unit_error(&self, unit: &WorkUnit, error: &str) {
        let _ = (unit, error);
    }

    /// Periodic counts from the reporter.
    fn on_snapshot(&self, snapshot: &ProgressSnapshot) {
        let _ = snapshot;
    }

    /// The run is over; `report` is final.
    fn on_run_complete(&self, report: &RunReport) {
        let _ = report;
    }
}

/// Used when no callback is configured.
pub struct NoopProgressCallback;

impl OrchestrationProgressCallback for NoopProgressCallback {}

pub type ProgressCallback = Arc<dyn OrchestrationProgressCallback>;

/// Counts derived from the board at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub counts: StatusCounts,
    pub total: usize,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    pub async fn capture(board: &WorkBoard, started: Instant) -> Self {
        let counts = board.counts().await;
        Self {
            counts,
            total: counts.total(),
            elapsed: started.elapsed(),
        }
    }

    /// Finished units as a fraction of the plan (1.0 for an empty plan).
    pub fn fraction_done(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.counts.terminal() as f64 / self.total as f64
        }
    }
}

/// Background task emitting a [`ProgressSnapshot`] every `interval`.
pub struct ProgressReporter {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ProgressReporter {
    /// Start ticking. The first snapshot is emitted after one full interval.
    /// A zero interval is treated as one second.
    pub fn spawn(board: Arc<WorkBoard>, interval: Duration, callback: ProgressCallback) -> Self {
        let interval = if interval.is_zero() {
            Duration::from_secs(1)
        } else {
            interval
        };
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let started = Instant::now();

        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let s = ProgressSnapshot::capture(&board, started).await;
                        info!(
                            "Progress: {}/{} done ({} running, {} pending, {} failed, {} skipped) after {:.0}s",
                            s.counts.terminal(),
                            s.total,
                            s.counts.running,
                            s.counts.pending,
                            s.counts.failed,
                            s.counts.skipped,
                            s.elapsed.as_secs_f64()
                        );
                        callback.on_snapshot(&s);
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        Self { stop_tx, handle }
    }

    /// Signal the task and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.handle.await {
            warn!("Progress reporter ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::GeneratorKind;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        snapshots: Mutex<Vec<ProgressSnapshot>>,
    }

    impl OrchestrationProgressCallback for Recorder {
        fn on_snapshot(&self, snapshot: &ProgressSnapshot) {
            self.snapshots.lock().unwrap().push(snapshot.clone());
        }
    }

    #[test]
    fn noop_callback_accepts_every_event() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        let unit = WorkUnit::new(0, "topic-01", 1, "Cells", GeneratorKind::Quiz, true);
        cb.on_plan_built(3, 1);
        cb.on_unit_start(&unit);
        cb.on_unit_complete(&unit, Path::new("q.md"));
        cb.on_unit_error(&unit, "boom");
        cb.on_run_complete(&RunReport::from_units(vec![unit]));
    }

    #[test]
    fn fraction_done_handles_empty_plan() {
        let s = ProgressSnapshot {
            counts: StatusCounts::default(),
            total: 0,
            elapsed: Duration::ZERO,
        };
        assert_eq!(s.fraction_done(), 1.0);
    }

    #[tokio::test]
    async fn snapshots_are_monotonic_while_units_finish() {
        let board = Arc::new(WorkBoard::new(None));
        board
            .add_units(
                (0..6)
                    .map(|i| WorkUnit::new(i, "topic-01", 1, "Cells", GeneratorKind::Handout, true))
                    .collect(),
            )
            .await;
        let recorder = Arc::new(Recorder::default());
        let reporter = ProgressReporter::spawn(
            Arc::clone(&board),
            Duration::from_millis(10),
            recorder.clone(),
        );

        for id in 0..6 {
            board.start(id).await;
            tokio::time::sleep(Duration::from_millis(15)).await;
            board.succeed(id, 1, PathBuf::from(format!("{id}.md"))).await;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        reporter.stop().await;

        let snapshots = recorder.snapshots.lock().unwrap().clone();
        assert!(snapshots.len() >= 2, "got {} snapshots", snapshots.len());
        assert!(snapshots
            .windows(2)
            .all(|w| w[0].counts.terminal() <= w[1].counts.terminal()));
        assert!(snapshots.iter().all(|s| s.total == 6));
        assert_eq!(snapshots.last().unwrap().counts.succeeded, 6);
    }

    #[tokio::test]
    async fn zero_interval_does_not_kill_the_reporter() {
        let board = Arc::new(WorkBoard::new(None));
        let reporter =
            ProgressReporter::spawn(board, Duration::ZERO, Arc::new(NoopProgressCallback));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!reporter.handle.is_finished());
        reporter.stop().await;
    }

    #[tokio::test]
    async fn stop_does_not_wait_for_next_tick() {
        let board = Arc::new(WorkBoard::new(None));
        let recorder = Arc::new(Recorder::default());
        let reporter = ProgressReporter::spawn(board, Duration::from_secs(3600), recorder.clone());
        tokio::time::timeout(Duration::from_secs(1), reporter.stop())
            .await
            .expect("reporter stops promptly");
        assert!(recorder.snapshots.lock().unwrap().is_empty());
    }
}
