use crate::layout::DataLayout;
use crate::model::{FailureRecord, MatchDescriptor};
use crate::HarvestError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Reads and writes the JSON state shared between pipeline runs.
pub struct ManifestStore {
    layout: DataLayout,
}

impl ManifestStore {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    pub fn save_matches(&self, matches: &[MatchDescriptor]) -> Result<(), HarvestError> {
        write_json_atomic(&self.layout.match_manifest(), &matches)?;
        tracing::info!(count = matches.len(), path = %self.layout.match_manifest().display(), "Match manifest saved");
        Ok(())
    }

    pub fn load_matches(&self) -> Result<Vec<MatchDescriptor>, HarvestError> {
        read_json(&self.layout.match_manifest())
    }

    /// Overwrites both the id-only failure manifest and the detailed
    /// variant. Earlier runs are not merged in.
    pub fn save_failures(&self, failures: &[FailureRecord]) -> Result<(), HarvestError> {
        let ids: Vec<u64> = failures.iter().map(|f| f.match_id).collect();
        write_json_atomic(&self.layout.failure_manifest(), &ids)?;
        write_json_atomic(&self.layout.failure_details(), &failures)?;
        Ok(())
    }

    /// Missing manifest means nothing has failed yet.
    pub fn load_failed_ids(&self) -> Result<Vec<u64>, HarvestError> {
        let path = self.layout.failure_manifest();
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_json(&path)
    }

    pub fn load_failure_details(&self) -> Result<Vec<FailureRecord>, HarvestError> {
        let path = self.layout.failure_details();
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_json(&path)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, HarvestError> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Write to a sibling temp file and rename it over the target so readers
/// never observe a half-written manifest.
fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), HarvestError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| HarvestError::Other(format!("invalid manifest path {}", path.display())))?;
    let temp_path = path.with_file_name(format!("{}.tmp", file_name));

    {
        let mut writer = BufWriter::new(File::create(&temp_path)?);
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}
