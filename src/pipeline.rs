use crate::config::{DEFAULT_MAX_DURATION, DEFAULT_MIN_DURATION};
use crate::decompressor::Decompressor;
use crate::error::StageError;
use crate::fetcher::ReplayFetcher;
use crate::layout::DataLayout;
use crate::model::{FailureRecord, MatchDescriptor};
use crate::parser_adapter::ReplayParser;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Inclusive bounds on match duration in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationFilter {
    pub min_secs: u32,
    pub max_secs: u32,
}

impl DurationFilter {
    pub fn new(min_secs: u32, max_secs: u32) -> Self {
        Self { min_secs, max_secs }
    }

    pub fn accepts(&self, duration: u32) -> bool {
        duration >= self.min_secs && duration <= self.max_secs
    }
}

impl Default for DurationFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DURATION, DEFAULT_MAX_DURATION)
    }
}

/// Terminal state of one match.
///
/// `PENDING -> SKIPPED` when the duration filter rejects it, otherwise
/// `FETCHING -> DECOMPRESSING -> PARSING -> DONE`, with any stage error
/// collapsing to `FAILED`. `AlreadyParsed` only appears when resuming.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Skipped,
    AlreadyParsed(PathBuf),
    Done(PathBuf),
    Failed(FailureRecord),
}

impl MatchOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, MatchOutcome::Failed(_))
    }
}

/// Fetch -> decompress -> parse for a single match.
pub struct MatchPipeline {
    fetcher: Arc<dyn ReplayFetcher>,
    decompressor: Arc<dyn Decompressor>,
    parser: Arc<dyn ReplayParser>,
    layout: DataLayout,
    filter: DurationFilter,
    skip_existing: bool,
}

impl MatchPipeline {
    pub fn new(
        fetcher: Arc<dyn ReplayFetcher>,
        decompressor: Arc<dyn Decompressor>,
        parser: Arc<dyn ReplayParser>,
        layout: DataLayout,
    ) -> Self {
        Self {
            fetcher,
            decompressor,
            parser,
            layout,
            filter: DurationFilter::default(),
            skip_existing: false,
        }
    }

    pub fn with_filter(mut self, filter: DurationFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Treat an existing feature file as done and skip the network.
    pub fn with_skip_existing(mut self, skip_existing: bool) -> Self {
        self.skip_existing = skip_existing;
        self
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// Run one match to a terminal state. Never panics and never returns
    /// an error: every failure becomes `MatchOutcome::Failed`.
    pub fn process(&self, descriptor: &MatchDescriptor) -> MatchOutcome {
        let match_id = descriptor.match_id;
        if !self.filter.accepts(descriptor.duration) {
            tracing::debug!(match_id, duration = descriptor.duration, "Skipping match outside duration window");
            return MatchOutcome::Skipped;
        }

        let output = self.layout.parsed_output(match_id);
        if self.skip_existing && output.is_file() {
            tracing::debug!(match_id, "Feature file already present");
            return MatchOutcome::AlreadyParsed(output);
        }

        tracing::info!(match_id, "Processing match");
        let partial = self.layout.parsed_partial(match_id);
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.run_stages(descriptor, &partial, &output)))
            .unwrap_or_else(|payload| Err(StageError::Panic(panic_message(payload.as_ref()))));

        match result {
            Ok(path) => MatchOutcome::Done(path),
            Err(e) => {
                remove_if_present(&partial);
                remove_if_present(&output);
                tracing::warn!(match_id, kind = %e.kind(), error = %e, "Match failed");
                MatchOutcome::Failed(FailureRecord {
                    match_id,
                    kind: e.kind(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// The parser writes to `partial`; only a complete file is renamed to
    /// `output`, so an existing output always means a finished parse.
    fn run_stages(&self, descriptor: &MatchDescriptor, partial: &Path, output: &Path) -> Result<PathBuf, StageError> {
        let replays_dir = self.layout.replays_dir();
        let blob = self.fetcher.fetch(
            descriptor.cluster,
            descriptor.match_id,
            &descriptor.replay_salt,
            &replays_dir,
        )?;
        let _blob = TransientFile(blob.clone());
        if !blob.is_file() {
            return Err(StageError::Download(format!("no replay at {}", blob.display())));
        }

        let replay = self.decompressor.decompress(&blob)?;
        // Gone whatever the parser does, panics included.
        let _replay = TransientFile(replay.clone());

        let parsed = self.parser.parse(&replay, partial)?;
        if !parsed.is_file() {
            return Err(StageError::Parse(format!(
                "parser reported success but {} is missing",
                parsed.display()
            )));
        }
        fs::rename(&parsed, output)?;
        Ok(output.to_path_buf())
    }
}

/// Removes its file on drop, including while unwinding.
struct TransientFile(PathBuf);

impl Drop for TransientFile {
    fn drop(&mut self) {
        remove_if_present(&self.0);
    }
}

fn remove_if_present(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Could not remove file");
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
