use crate::model::MatchDescriptor;
use crate::pipeline::DurationFilter;
use crate::HarvestError;
use serde_json::Value;
use std::time::Duration;

/// All Pick and Captains Mode.
pub const RANKED_GAME_MODES: [u32; 2] = [1, 2];

/// Anything that can answer an explorer SQL query with a JSON document.
pub trait MatchSource {
    fn query(&self, sql: &str) -> Result<Value, HarvestError>;
}

/// Blocking client for the OpenDota explorer endpoint.
pub struct ExplorerClient {
    client: reqwest::blocking::Client,
    api_url: String,
    api_key: String,
}

impl ExplorerClient {
    pub fn new(api_url: &str, api_key: &str, timeout: Duration) -> Result<Self, HarvestError> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

impl MatchSource for ExplorerClient {
    fn query(&self, sql: &str) -> Result<Value, HarvestError> {
        let url = format!("{}/explorer", self.api_url);
        let response = self
            .client
            .get(&url)
            .query(&[("sql", sql), ("api_key", self.api_key.as_str())])
            .send()?;
        let status = response.status();
        // The explorer reports query errors in the body, so a non-2xx body
        // is still worth decoding.
        let body = response.text()?;
        serde_json::from_str(&body).map_err(|e| {
            HarvestError::UpstreamQuery(format!("HTTP {} with undecodable body: {}", status, e))
        })
    }
}

/// Build the sampling query for `patch`, newest matches first.
pub fn build_query(n: usize, patch: &str) -> Result<String, HarvestError> {
    if !is_valid_patch(patch) {
        return Err(HarvestError::UpstreamQuery(format!("refusing to query for patch '{}'", patch)));
    }
    let modes = RANKED_GAME_MODES
        .iter()
        .map(|m| format!("m.game_mode = {}", m))
        .collect::<Vec<_>>()
        .join(" OR ");
    Ok(format!(
        "SELECT \
m.match_id, m.match_seq_num, m.replay_salt, mp.patch, m.game_mode, \
m.duration, m.start_time, m.cluster, m.radiant_win \
FROM matches m \
JOIN match_patch mp ON mp.match_id = m.match_id AND mp.patch = '{patch}' \
WHERE ({modes}) \
ORDER BY m.start_time DESC \
LIMIT {n};"
    ))
}

/// Patch names look like `7.37` or `7.37c`; anything else could break out
/// of the SQL literal.
fn is_valid_patch(patch: &str) -> bool {
    !patch.is_empty()
        && patch.starts_with(|c: char| c.is_ascii_digit())
        && patch.chars().all(|c| c.is_ascii_digit() || c == '.' || c.is_ascii_lowercase())
}

pub struct ReplayLocator<S: MatchSource> {
    source: S,
    filter: Option<DurationFilter>,
}

impl<S: MatchSource> ReplayLocator<S> {
    pub fn new(source: S) -> Self {
        Self { source, filter: None }
    }

    /// Drop out-of-range durations before they ever reach the manifest.
    /// The orchestrator applies the same check again on its own.
    pub fn with_filter(mut self, filter: DurationFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Returns at most `n` descriptors in upstream order. Upstream trouble
    /// is logged and yields an empty list.
    pub fn locate(&self, n: usize, patch: &str) -> Vec<MatchDescriptor> {
        match self.try_locate(n, patch) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::error!(patch, error = %e, "Match query failed");
                Vec::new()
            }
        }
    }

    fn try_locate(&self, n: usize, patch: &str) -> Result<Vec<MatchDescriptor>, HarvestError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let sql = build_query(n, patch)?;
        let response = self.source.query(&sql)?;
        let rows = match response.get("rows").and_then(Value::as_array) {
            Some(rows) => rows,
            None => {
                return Err(HarvestError::UpstreamQuery(format!(
                    "response has no rows: {}",
                    truncate(&response.to_string(), 300)
                )));
            }
        };

        let mut matches = Vec::with_capacity(rows.len().min(n));
        for row in rows.iter().take(n) {
            match serde_json::from_value::<MatchDescriptor>(row.clone()) {
                Ok(m) => {
                    if self.filter.map_or(true, |f| f.accepts(m.duration)) {
                        matches.push(m);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Skipping undecodable match row"),
            }
        }
        tracing::info!(requested = n, returned = rows.len(), kept = matches.len(), "Sampled matches");
        Ok(matches)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
