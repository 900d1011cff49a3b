use crate::HarvestError;
use std::fs;
use std::path::{Path, PathBuf};

pub const MATCH_MANIFEST_FILE: &str = "match_data.json";
pub const FAILURE_MANIFEST_FILE: &str = "failed_matches.json";
pub const FAILURE_DETAILS_FILE: &str = "failure_details.json";

/// Where a run keeps its state on disk
#[derive(Debug, Clone)]
pub struct DataLayout {
    pub base_dir: PathBuf,
}

impl DataLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    pub fn match_manifest(&self) -> PathBuf {
        self.base_dir.join(MATCH_MANIFEST_FILE)
    }

    pub fn failure_manifest(&self) -> PathBuf {
        self.base_dir.join(FAILURE_MANIFEST_FILE)
    }

    pub fn failure_details(&self) -> PathBuf {
        self.base_dir.join(FAILURE_DETAILS_FILE)
    }

    /// Compressed blobs and decompressed replays live here only while a
    /// match is in flight.
    pub fn replays_dir(&self) -> PathBuf {
        self.base_dir.join("replays")
    }

    pub fn parsed_dir(&self) -> PathBuf {
        self.base_dir.join("parsed_replays")
    }

    pub fn parsed_output(&self, match_id: u64) -> PathBuf {
        self.parsed_dir().join(format!("{}.json", match_id))
    }

    /// The parser writes here; the file is renamed to `parsed_output` only
    /// once it is known to be complete.
    pub fn parsed_partial(&self, match_id: u64) -> PathBuf {
        self.parsed_dir().join(format!("{}.json.part", match_id))
    }

    /// Create the directory tree and sweep transient replay files and
    /// half-written feature files left by an interrupted run. Returns the
    /// number of files removed.
    pub fn initialize(&self) -> Result<usize, HarvestError> {
        fs::create_dir_all(&self.base_dir)?;
        fs::create_dir_all(self.replays_dir())?;
        fs::create_dir_all(self.parsed_dir())?;
        let removed = sweep_files(&self.replays_dir(), &[".part", ".bz2", ".dem"])?
            + sweep_files(&self.parsed_dir(), &[".part"])?;
        if removed > 0 {
            tracing::info!(removed, "Removed leftover replay files from an interrupted run");
        }
        Ok(removed)
    }

    /// Number of parsed feature files currently on disk.
    pub fn count_parsed(&self) -> Result<usize, HarvestError> {
        let dir = self.parsed_dir();
        if !dir.exists() {
            return Ok(0);
        }
        let mut count = 0;
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().map_or(false, |ext| ext == "json") {
                count += 1;
            }
        }
        Ok(count)
    }
}

impl Default for DataLayout {
    fn default() -> Self {
        Self::new("./data")
    }
}

fn sweep_files(dir: &Path, suffixes: &[&str]) -> Result<usize, HarvestError> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if suffixes.iter().any(|suffix| name.ends_with(suffix)) {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}
