use crate::orchestrator::RunReport;
use crate::pipeline::MatchOutcome;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Receives progress from the worker pool. Called concurrently from every
/// worker thread.
pub trait RunObserver: Send + Sync {
    fn run_started(&self, _total: usize) {}
    fn match_finished(&self, _match_id: u64, _outcome: &MatchOutcome) {}
    fn run_finished(&self, _report: &RunReport) {}
}

/// Discards everything.
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub completed: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

struct ProgressInner {
    snapshot: ProgressSnapshot,
    started: Instant,
}

/// Shared counters behind a cloneable handle.
pub struct ProgressTracker {
    inner: Arc<Mutex<ProgressInner>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ProgressInner {
                snapshot: ProgressSnapshot::default(),
                started: Instant::now(),
            })),
        }
    }

    pub fn clone_handle(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn start(&self, total: usize) {
        let mut inner = self.lock();
        inner.snapshot = ProgressSnapshot { total, ..ProgressSnapshot::default() };
        inner.started = Instant::now();
    }

    pub fn record(&self, outcome: &MatchOutcome) -> ProgressSnapshot {
        let mut inner = self.lock();
        let snapshot = &mut inner.snapshot;
        snapshot.completed += 1;
        match outcome {
            MatchOutcome::Skipped => snapshot.skipped += 1,
            MatchOutcome::Done(_) | MatchOutcome::AlreadyParsed(_) => snapshot.succeeded += 1,
            MatchOutcome::Failed(_) => snapshot.failed += 1,
        }
        snapshot.clone()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.lock().snapshot.clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.lock().started.elapsed()
    }

    // A poisoned lock only means another worker panicked mid-update; the
    // counters are still usable.
    fn lock(&self) -> std::sync::MutexGuard<'_, ProgressInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Logs a `completed/total` line per match and a closing summary.
pub struct TracingObserver {
    progress: ProgressTracker,
}

impl TracingObserver {
    pub fn new() -> Self {
        Self { progress: ProgressTracker::new() }
    }

    pub fn progress(&self) -> ProgressTracker {
        self.progress.clone_handle()
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl RunObserver for TracingObserver {
    fn run_started(&self, total: usize) {
        self.progress.start(total);
        tracing::info!(total, "Sampled number of replays in manifest");
    }

    fn match_finished(&self, match_id: u64, outcome: &MatchOutcome) {
        let snap = self.progress.record(outcome);
        let status = match outcome {
            MatchOutcome::Skipped => "skipped",
            MatchOutcome::AlreadyParsed(_) => "already parsed",
            MatchOutcome::Done(_) => "done",
            MatchOutcome::Failed(_) => "failed",
        };
        tracing::info!(
            match_id,
            status,
            failed = snap.failed,
            "[{}/{}]",
            snap.completed,
            snap.total
        );
    }

    fn run_finished(&self, report: &RunReport) {
        tracing::info!(
            processed = report.processed(),
            succeeded = report.succeeded,
            skipped = report.skipped,
            elapsed_secs = self.progress.elapsed().as_secs(),
            "Done!"
        );
        tracing::info!("Failed to parse {} matches.", report.failures.len());
    }
}
