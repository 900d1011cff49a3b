use serde::{Deserialize, Serialize};
use std::fmt;

/// Process-level errors: configuration, persistence and upstream plumbing.
#[derive(Debug)]
pub enum HarvestError {
    Config(String),
    Io(std::io::Error),
    Json(serde_json::Error),
    Http(reqwest::Error),
    UpstreamQuery(String),
    Worker(String),
    Other(String),
}

impl fmt::Display for HarvestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HarvestError::Config(e) => write!(f, "Configuration error: {}", e),
            HarvestError::Io(e) => write!(f, "IO error: {}", e),
            HarvestError::Json(e) => write!(f, "JSON error: {}", e),
            HarvestError::Http(e) => write!(f, "HTTP error: {}", e),
            HarvestError::UpstreamQuery(e) => write!(f, "Upstream query error: {}", e),
            HarvestError::Worker(e) => write!(f, "Worker error: {}", e),
            HarvestError::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for HarvestError {}

impl From<std::io::Error> for HarvestError {
    fn from(err: std::io::Error) -> Self {
        HarvestError::Io(err)
    }
}

impl From<serde_json::Error> for HarvestError {
    fn from(err: serde_json::Error) -> Self {
        HarvestError::Json(err)
    }
}

impl From<reqwest::Error> for HarvestError {
    fn from(err: reqwest::Error) -> Self {
        HarvestError::Http(err)
    }
}

impl From<String> for HarvestError {
    fn from(err: String) -> Self {
        HarvestError::Other(err)
    }
}

impl From<&str> for HarvestError {
    fn from(err: &str) -> Self {
        HarvestError::Other(err.to_string())
    }
}

/// What went wrong for a single match. Recorded next to the id in the
/// failure details file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Download,
    Decompression,
    Parse,
    Io,
    Panic,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Download => "download",
            FailureKind::Decompression => "decompression",
            FailureKind::Parse => "parse",
            FailureKind::Io => "io",
            FailureKind::Panic => "panic",
        };
        f.write_str(name)
    }
}

/// Error returned by a single stage of the per-match pipeline.
#[derive(Debug)]
pub enum StageError {
    Download(String),
    Decompression(String),
    Parse(String),
    Io(std::io::Error),
    Panic(String),
}

impl StageError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StageError::Download(_) => FailureKind::Download,
            StageError::Decompression(_) => FailureKind::Decompression,
            StageError::Parse(_) => FailureKind::Parse,
            StageError::Io(_) => FailureKind::Io,
            StageError::Panic(_) => FailureKind::Panic,
        }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageError::Download(e) => write!(f, "Download error: {}", e),
            StageError::Decompression(e) => write!(f, "Decompression error: {}", e),
            StageError::Parse(e) => write!(f, "Parse error: {}", e),
            StageError::Io(e) => write!(f, "IO error: {}", e),
            StageError::Panic(e) => write!(f, "Stage panicked: {}", e),
        }
    }
}

impl std::error::Error for StageError {}

impl From<std::io::Error> for StageError {
    fn from(err: std::io::Error) -> Self {
        StageError::Io(err)
    }
}
