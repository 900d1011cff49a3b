use crate::model::{FailureRecord, MatchDescriptor};
use crate::pipeline::{MatchOutcome, MatchPipeline};
use crate::progress::{NoopObserver, RunObserver};
use crate::HarvestError;
use crossbeam_channel::{bounded, Receiver};
use std::sync::Arc;
use std::thread;

/// Summary of one pass over a match manifest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub total: usize,
    pub skipped: usize,
    pub succeeded: usize,
    pub already_parsed: usize,
    /// In manifest order.
    pub failures: Vec<FailureRecord>,
}

impl RunReport {
    /// Matches that passed the duration filter.
    pub fn processed(&self) -> usize {
        self.total - self.skipped
    }

    pub fn failed_ids(&self) -> Vec<u64> {
        self.failures.iter().map(|f| f.match_id).collect()
    }
}

struct Task {
    index: usize,
    descriptor: MatchDescriptor,
}

struct TaskResult {
    index: usize,
    outcome: MatchOutcome,
}

/// Fans a manifest out over a fixed set of worker threads.
///
/// Tasks go through a bounded channel; each worker keeps its own result
/// list, and the lists are merged only after every worker has been joined.
pub struct Orchestrator {
    pipeline: Arc<MatchPipeline>,
    workers: usize,
    observer: Arc<dyn RunObserver>,
}

impl Orchestrator {
    pub fn new(pipeline: Arc<MatchPipeline>, workers: usize) -> Self {
        Self {
            pipeline,
            workers: workers.max(1),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn run(&self, manifest: &[MatchDescriptor]) -> Result<RunReport, HarvestError> {
        self.observer.run_started(manifest.len());

        let (task_tx, task_rx) = bounded::<Task>(self.workers * 2);
        let mut handles = Vec::with_capacity(self.workers);
        for worker_id in 0..self.workers {
            let rx = task_rx.clone();
            let pipeline = Arc::clone(&self.pipeline);
            let observer = Arc::clone(&self.observer);
            let handle = thread::Builder::new()
                .name(format!("replay-worker-{}", worker_id))
                .spawn(move || worker_loop(rx, pipeline, observer))?;
            handles.push(handle);
        }
        drop(task_rx);

        for (index, descriptor) in manifest.iter().enumerate() {
            let task = Task { index, descriptor: descriptor.clone() };
            if task_tx.send(task).is_err() {
                // Every receiver is gone; the join below reports why.
                break;
            }
        }
        drop(task_tx);

        let mut results = Vec::with_capacity(manifest.len());
        let mut lost_workers = 0;
        for handle in handles {
            match handle.join() {
                Ok(mut local) => results.append(&mut local),
                Err(_) => lost_workers += 1,
            }
        }
        if lost_workers > 0 {
            return Err(HarvestError::Worker(format!("{} worker thread(s) died", lost_workers)));
        }
        if results.len() != manifest.len() {
            return Err(HarvestError::Worker(format!(
                "{} of {} matches produced no result",
                manifest.len() - results.len(),
                manifest.len()
            )));
        }

        results.sort_by_key(|r| r.index);
        let report = merge(results);
        self.observer.run_finished(&report);
        Ok(report)
    }
}

fn worker_loop(
    rx: Receiver<Task>,
    pipeline: Arc<MatchPipeline>,
    observer: Arc<dyn RunObserver>,
) -> Vec<TaskResult> {
    let mut local = Vec::new();
    while let Ok(task) = rx.recv() {
        let match_id = task.descriptor.match_id;
        let outcome = pipeline.process(&task.descriptor);
        observer.match_finished(match_id, &outcome);
        local.push(TaskResult { index: task.index, outcome });
    }
    local
}

fn merge(results: Vec<TaskResult>) -> RunReport {
    let mut report = RunReport { total: results.len(), ..RunReport::default() };
    for result in results {
        match result.outcome {
            MatchOutcome::Skipped => report.skipped += 1,
            MatchOutcome::Done(_) => report.succeeded += 1,
            MatchOutcome::AlreadyParsed(_) => {
                report.succeeded += 1;
                report.already_parsed += 1;
            }
            MatchOutcome::Failed(record) => report.failures.push(record),
        }
    }
    report
}
