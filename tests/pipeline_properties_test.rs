use replay_harvest::decompressor::Decompressor;
use replay_harvest::fetcher::ReplayFetcher;
use replay_harvest::harvest::{self, Selection};
use replay_harvest::layout::DataLayout;
use replay_harvest::manifest::ManifestStore;
use replay_harvest::orchestrator::Orchestrator;
use replay_harvest::parser_adapter::ReplayParser;
use replay_harvest::pipeline::MatchPipeline;
use replay_harvest::progress::NoopObserver;
use replay_harvest::{MatchDescriptor, StageError};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Writes a blob and counts calls.
#[derive(Default)]
struct StubFetcher {
    calls: AtomicUsize,
    fetched: Mutex<Vec<u64>>,
}

impl ReplayFetcher for StubFetcher {
    fn fetch(&self, _cluster: u32, match_id: u64, salt: &str, dest: &Path) -> Result<PathBuf, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.fetched.lock().unwrap().push(match_id);
        let path = dest.join(format!("{}_{}.dem.bz2", match_id, salt));
        fs::write(&path, b"blob")?;
        Ok(path)
    }
}

struct StubDecompressor;

impl Decompressor for StubDecompressor {
    fn decompress(&self, compressed: &Path) -> Result<PathBuf, StageError> {
        let out = compressed.with_extension("");
        fs::rename(compressed, &out)?;
        Ok(out)
    }
}

/// Exits "nonzero" for the listed match ids.
struct StubParser {
    fail_for: HashSet<u64>,
}

impl StubParser {
    fn failing(ids: &[u64]) -> Self {
        Self { fail_for: ids.iter().copied().collect() }
    }
}

impl ReplayParser for StubParser {
    fn parse(&self, replay: &Path, output: &Path) -> Result<PathBuf, StageError> {
        let name = replay.file_name().unwrap().to_string_lossy().to_string();
        let match_id: u64 = name.split('_').next().unwrap().parse().unwrap();
        if self.fail_for.contains(&match_id) {
            return Err(StageError::Parse("parser exited with exit status: 1".to_string()));
        }
        fs::write(output, format!("{{\"match_id\":{}}}", match_id))?;
        Ok(output.to_path_buf())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    store: ManifestStore,
    fetcher: Arc<StubFetcher>,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path().join("data"));
        layout.initialize().unwrap();
        Self {
            _dir: dir,
            store: ManifestStore::new(layout),
            fetcher: Arc::new(StubFetcher::default()),
        }
    }

    fn layout(&self) -> &DataLayout {
        self.store.layout()
    }

    /// Same shape as the binary: manifest in, failure manifest out.
    fn run(&self, parser: StubParser, skip_existing: bool) -> Vec<u64> {
        let pipeline = MatchPipeline::new(
            self.fetcher.clone(),
            Arc::new(StubDecompressor),
            Arc::new(parser),
            self.layout().clone(),
        )
        .with_skip_existing(skip_existing);
        let manifest = self.store.load_matches().unwrap();
        let report = Orchestrator::new(Arc::new(pipeline), 6).run(&manifest).unwrap();
        self.store.save_failures(&report.failures).unwrap();
        self.store.load_failed_ids().unwrap()
    }

    /// Goes through the same entry point as `process` / `retry-failed`.
    fn run_selection(&self, parser: StubParser, selection: Selection) -> Vec<u64> {
        let pipeline = MatchPipeline::new(
            self.fetcher.clone(),
            Arc::new(StubDecompressor),
            Arc::new(parser),
            self.layout().clone(),
        );
        harvest::process(&self.store, pipeline, 6, selection, Arc::new(NoopObserver)).unwrap();
        self.store.load_failed_ids().unwrap()
    }

    fn take_fetched(&self) -> Vec<u64> {
        let mut fetched = std::mem::take(&mut *self.fetcher.fetched.lock().unwrap());
        fetched.sort_unstable();
        fetched
    }

    fn parsed_ids(&self) -> HashSet<u64> {
        fs::read_dir(self.layout().parsed_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                e.path()
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| s.parse::<u64>().ok())
            })
            .collect()
    }
}

fn mixed_manifest() -> Vec<MatchDescriptor> {
    // Durations cycle through below, inside and above the window.
    (1..=30)
        .map(|id| {
            let duration = match id % 3 {
                0 => 900,
                1 => 2400,
                _ => 4000,
            };
            MatchDescriptor::new(id, 111, format!("salt{}", id), duration)
        })
        .collect()
}

#[test]
fn test_concrete_three_match_scenario() {
    let h = Harness::new();
    h.store
        .save_matches(&[
            MatchDescriptor::new(1, 5, "abc", 1800),
            MatchDescriptor::new(2, 5, "def", 600),
            MatchDescriptor::new(3, 5, "xyz", 1800),
        ])
        .unwrap();

    let failed = h.run(StubParser::failing(&[3]), false);

    assert_eq!(failed, vec![3]);
    assert_eq!(h.parsed_ids(), HashSet::from([1]));
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 2, "match 2 must never be fetched");
    assert!(fs::read_dir(h.layout().replays_dir()).unwrap().next().is_none());
}

#[test]
fn test_filtered_matches_never_appear_anywhere() {
    let h = Harness::new();
    let manifest = mixed_manifest();
    h.store.save_matches(&manifest).unwrap();

    // Fail a few in-window and out-of-window ids alike.
    let failed: HashSet<u64> = h.run(StubParser::failing(&[1, 3, 7, 9]), false).into_iter().collect();
    let parsed = h.parsed_ids();

    for m in manifest.iter().filter(|m| m.duration < 1200 || m.duration > 3600) {
        assert!(!failed.contains(&m.match_id), "filtered match {} in failures", m.match_id);
        assert!(!parsed.contains(&m.match_id), "filtered match {} was parsed", m.match_id);
    }
}

#[test]
fn test_every_kept_match_is_parsed_xor_failed() {
    let h = Harness::new();
    let manifest = mixed_manifest();
    h.store.save_matches(&manifest).unwrap();

    let failed: HashSet<u64> = h.run(StubParser::failing(&[1, 4, 10, 25]), false).into_iter().collect();
    let parsed = h.parsed_ids();

    for m in manifest.iter().filter(|m| (1200..=3600).contains(&m.duration)) {
        let in_failed = failed.contains(&m.match_id);
        let in_parsed = parsed.contains(&m.match_id);
        assert!(in_failed ^ in_parsed, "match {} parsed={} failed={}", m.match_id, in_parsed, in_failed);
    }
    assert_eq!(failed, HashSet::from([1, 4, 10, 25]));
}

#[test]
fn test_rerun_of_successful_manifest_stays_clean() {
    let h = Harness::new();
    h.store.save_matches(&mixed_manifest()).unwrap();

    assert!(h.run(StubParser::failing(&[]), false).is_empty());
    let first = h.parsed_ids();
    assert!(h.run(StubParser::failing(&[]), false).is_empty());
    assert_eq!(h.parsed_ids(), first);
    assert_eq!(fs::read_to_string(h.layout().failure_manifest()).unwrap(), "[]");
}

#[test]
fn test_one_bad_match_does_not_affect_the_rest() {
    let h = Harness::new();
    let manifest: Vec<_> = (100..140).map(|id| MatchDescriptor::new(id, 9, "s", 2000)).collect();
    h.store.save_matches(&manifest).unwrap();

    let failed = h.run(StubParser::failing(&[117]), false);

    assert_eq!(failed, vec![117]);
    let expected: HashSet<u64> = (100..140).filter(|id| *id != 117).collect();
    assert_eq!(h.parsed_ids(), expected);
}

#[test]
fn test_resume_skips_already_parsed_matches() {
    let h = Harness::new();
    let manifest: Vec<_> = (1..=10).map(|id| MatchDescriptor::new(id, 9, "s", 2000)).collect();
    h.store.save_matches(&manifest).unwrap();

    let failed = h.run(StubParser::failing(&[4, 8]), false);
    assert_eq!(failed, vec![4, 8]);
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 10);

    // Second pass only touches what failed before.
    let failed = h.run(StubParser::failing(&[]), true);
    assert!(failed.is_empty());
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 12);
    assert_eq!(h.parsed_ids().len(), 10);
}

#[test]
fn test_retry_failed_reruns_only_failed_ids() {
    let h = Harness::new();
    let manifest: Vec<_> = (1..=10).map(|id| MatchDescriptor::new(id, 9, "s", 2000)).collect();
    h.store.save_matches(&manifest).unwrap();

    assert_eq!(h.run_selection(StubParser::failing(&[4, 8]), Selection::Manifest), vec![4, 8]);
    assert_eq!(h.take_fetched(), (1..=10).collect::<Vec<_>>());

    let failed = h.run_selection(StubParser::failing(&[]), Selection::FailedOnly);
    assert!(failed.is_empty());
    assert_eq!(h.take_fetched(), vec![4, 8]);
    assert_eq!(fs::read_to_string(h.layout().failure_manifest()).unwrap(), "[]");
    assert_eq!(h.parsed_ids().len(), 10);
}

#[test]
fn test_retry_failed_records_matches_that_fail_again() {
    let h = Harness::new();
    let manifest: Vec<_> = (1..=6).map(|id| MatchDescriptor::new(id, 9, "s", 2000)).collect();
    h.store.save_matches(&manifest).unwrap();

    assert_eq!(h.run_selection(StubParser::failing(&[2, 5]), Selection::Manifest), vec![2, 5]);
    h.take_fetched();

    assert_eq!(h.run_selection(StubParser::failing(&[5]), Selection::FailedOnly), vec![5]);
    assert_eq!(h.take_fetched(), vec![2, 5]);
}

#[test]
fn test_retry_with_nothing_failed_fetches_nothing() {
    let h = Harness::new();
    h.store.save_matches(&[MatchDescriptor::new(1, 9, "s", 2000)]).unwrap();

    assert!(h.run_selection(StubParser::failing(&[]), Selection::FailedOnly).is_empty());
    assert!(h.take_fetched().is_empty());
    assert!(!h.layout().failure_manifest().exists());
}
