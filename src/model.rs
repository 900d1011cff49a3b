use crate::error::FailureKind;
use serde::{Deserialize, Deserializer, Serialize};

/// One row of the match manifest, as returned by the explorer query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDescriptor {
    pub match_id: u64,
    #[serde(default)]
    pub match_seq_num: u64,
    #[serde(deserialize_with = "string_or_number")]
    pub replay_salt: String,
    pub cluster: u32,
    #[serde(default)]
    pub patch: String,
    #[serde(default)]
    pub game_mode: u32,
    pub duration: u32,
    #[serde(default)]
    pub start_time: i64,
    #[serde(default)]
    pub radiant_win: bool,
}

impl MatchDescriptor {
    /// Minimal descriptor carrying only what the pipeline needs.
    pub fn new(match_id: u64, cluster: u32, replay_salt: impl Into<String>, duration: u32) -> Self {
        Self {
            match_id,
            match_seq_num: 0,
            replay_salt: replay_salt.into(),
            cluster,
            patch: String::new(),
            game_mode: 0,
            duration,
            start_time: 0,
            radiant_win: false,
        }
    }
}

/// The explorer returns `replay_salt` as a bare integer; hand-written
/// manifests tend to quote it.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Salt {
        Text(String),
        Number(u64),
    }

    Ok(match Salt::deserialize(deserializer)? {
        Salt::Text(s) => s,
        Salt::Number(n) => n.to_string(),
    })
}

/// A failed match together with the stage that failed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub match_id: u64,
    pub kind: FailureKind,
    pub message: String,
}
