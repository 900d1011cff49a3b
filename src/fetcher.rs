use crate::config::DEFAULT_REPLAY_BASE;
use crate::error::StageError;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Turns (cluster, match id, salt) into a download URL. `{cluster}` in the
/// base is substituted; the rest is appended as `/<id>_<salt>.dem.bz2`.
#[derive(Debug, Clone)]
pub struct ReplayUrlTemplate {
    base: String,
}

impl ReplayUrlTemplate {
    pub fn new(base: impl Into<String>) -> Self {
        let base: String = base.into();
        Self { base: base.trim_end_matches('/').to_string() }
    }

    pub fn url(&self, cluster: u32, match_id: u64, replay_salt: &str) -> String {
        format!(
            "{}/{}_{}.dem.bz2",
            self.base.replace("{cluster}", &cluster.to_string()),
            match_id,
            replay_salt
        )
    }
}

impl Default for ReplayUrlTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_REPLAY_BASE)
    }
}

pub trait ReplayFetcher: Send + Sync {
    /// Download the compressed replay into `dest_dir` and return its path.
    fn fetch(&self, cluster: u32, match_id: u64, replay_salt: &str, dest_dir: &Path) -> Result<PathBuf, StageError>;
}

pub struct HttpReplayFetcher {
    client: reqwest::blocking::Client,
    template: ReplayUrlTemplate,
}

impl HttpReplayFetcher {
    pub fn new(template: ReplayUrlTemplate, timeout: Duration) -> Result<Self, crate::HarvestError> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, template })
    }
}

impl ReplayFetcher for HttpReplayFetcher {
    fn fetch(&self, cluster: u32, match_id: u64, replay_salt: &str, dest_dir: &Path) -> Result<PathBuf, StageError> {
        let url = self.template.url(cluster, match_id, replay_salt);
        tracing::info!(match_id, %url, "Downloading replay");

        let file_name = url.rsplit('/').next().unwrap_or_default();
        let target = dest_dir.join(file_name);
        let partial = dest_dir.join(format!("{}.part", file_name));

        let mut response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| StageError::Download(format!("{}: {}", url, e)))?;

        // Only a plain 200 carries a replay; anything else leaves no file.
        if response.status() != reqwest::StatusCode::OK {
            return Err(StageError::Download(format!("HTTP {} for {}", response.status(), url)));
        }

        let bytes = match write_body(&mut response, &partial) {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = fs::remove_file(&partial);
                return Err(StageError::Download(format!("{}: body transfer failed: {}", url, e)));
            }
        };
        if let Err(e) = fs::rename(&partial, &target) {
            let _ = fs::remove_file(&partial);
            return Err(StageError::Io(e));
        }

        tracing::info!(match_id, bytes, path = %target.display(), "Replay downloaded");
        Ok(target)
    }
}

fn write_body(response: &mut reqwest::blocking::Response, path: &Path) -> Result<u64, String> {
    let file = File::create(path).map_err(|e| e.to_string())?;
    let mut writer = BufWriter::new(file);
    let bytes = response.copy_to(&mut writer).map_err(|e| e.to_string())?;
    writer.flush().map_err(|e| e.to_string())?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn test_default_template_matches_replay_storage() {
        let template = ReplayUrlTemplate::default();
        assert_eq!(
            template.url(273, 8226246802, "1234567"),
            "http://replay273.valve.net/570/8226246802_1234567.dem.bz2"
        );
    }

    #[test]
    fn test_template_without_placeholder_and_trailing_slash() {
        let template = ReplayUrlTemplate::new("http://127.0.0.1:9000/570/");
        assert_eq!(template.url(5, 1, "abc"), "http://127.0.0.1:9000/570/1_abc.dem.bz2");
    }

    #[test]
    fn test_fetch_writes_blob_on_200() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/570/1_abc.dem.bz2");
            then.status(200).body(b"compressed-bytes");
        });
        let temp_dir = tempfile::tempdir().unwrap();
        let fetcher = HttpReplayFetcher::new(
            ReplayUrlTemplate::new(format!("{}/570", server.base_url())),
            Duration::from_secs(5),
        )
        .unwrap();

        let path = fetcher.fetch(5, 1, "abc", temp_dir.path()).unwrap();
        mock.assert();
        assert_eq!(path, temp_dir.path().join("1_abc.dem.bz2"));
        assert_eq!(fs::read(&path).unwrap(), b"compressed-bytes");
        assert!(!temp_dir.path().join("1_abc.dem.bz2.part").exists());
    }

    #[test]
    fn test_fetch_non_200_is_error_and_leaves_nothing() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/570/2_def.dem.bz2");
            then.status(404);
        });
        let temp_dir = tempfile::tempdir().unwrap();
        let fetcher = HttpReplayFetcher::new(
            ReplayUrlTemplate::new(format!("{}/570", server.base_url())),
            Duration::from_secs(5),
        )
        .unwrap();

        let err = fetcher.fetch(5, 2, "def", temp_dir.path()).unwrap_err();
        assert!(matches!(err, StageError::Download(ref msg) if msg.contains("404")));
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_fetch_unreachable_host_is_download_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let fetcher = HttpReplayFetcher::new(
            ReplayUrlTemplate::new("http://127.0.0.1:1/570"),
            Duration::from_secs(2),
        )
        .unwrap();
        let err = fetcher.fetch(1, 3, "x", temp_dir.path()).unwrap_err();
        assert!(matches!(err, StageError::Download(_)));
    }

    #[test]
    fn test_failed_rename_removes_partial_download() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/570/4_ghi.dem.bz2");
            then.status(200).body(b"compressed-bytes");
        });
        let temp_dir = tempfile::tempdir().unwrap();
        // A directory squatting on the target name makes the rename fail.
        let blocker = temp_dir.path().join("4_ghi.dem.bz2");
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("keep"), b"x").unwrap();
        let fetcher = HttpReplayFetcher::new(
            ReplayUrlTemplate::new(format!("{}/570", server.base_url())),
            Duration::from_secs(5),
        )
        .unwrap();

        let err = fetcher.fetch(5, 4, "ghi", temp_dir.path()).unwrap_err();
        assert!(matches!(err, StageError::Io(_)));
        assert!(!temp_dir.path().join("4_ghi.dem.bz2.part").exists());
    }
}
