use crate::HarvestError;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.opendota.com/api/";
pub const DEFAULT_REPLAY_BASE: &str = "http://replay{cluster}.valve.net/570";
pub const DEFAULT_PARSER_CMD: &str = "java -jar ./parser/replay-parser/target/replay-parser-1.0.0.jar";
pub const DEFAULT_WORKERS: usize = 6;
pub const DEFAULT_MIN_DURATION: u32 = 1200;
pub const DEFAULT_MAX_DURATION: u32 = 3600;

/// Runtime settings, read from the environment (a `.env` file is loaded
/// first by the binary) and then overridden by CLI flags.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub api_key: Option<String>,
    pub api_url: String,
    pub data_dir: PathBuf,
    pub patch: String,
    pub sample_size: usize,
    pub workers: usize,
    pub min_duration: u32,
    pub max_duration: u32,
    pub replay_base: String,
    pub parser_cmd: String,
    pub http_timeout: Duration,
    pub parser_timeout: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: DEFAULT_API_URL.to_string(),
            data_dir: PathBuf::from("./data"),
            patch: "7.37".to_string(),
            sample_size: 12000,
            workers: DEFAULT_WORKERS,
            min_duration: DEFAULT_MIN_DURATION,
            max_duration: DEFAULT_MAX_DURATION,
            replay_base: DEFAULT_REPLAY_BASE.to_string(),
            parser_cmd: DEFAULT_PARSER_CMD.to_string(),
            http_timeout: Duration::from_secs(120),
            parser_timeout: Duration::from_secs(900),
        }
    }
}

impl HarvestConfig {
    pub fn from_env() -> Result<Self, HarvestError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, HarvestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        config.api_key = get("OPENDOTA_API_KEY");
        if let Some(url) = get("OPENDOTA_API_URL") {
            config.api_url = url;
        }
        if let Some(dir) = get("HARVEST_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(patch) = get("HARVEST_PATCH") {
            config.patch = patch;
        }
        if let Some(base) = get("HARVEST_REPLAY_BASE") {
            config.replay_base = base;
        }
        if let Some(cmd) = get("HARVEST_PARSER_CMD") {
            config.parser_cmd = cmd;
        }
        if let Some(v) = get("HARVEST_SAMPLE_SIZE") {
            config.sample_size = parse_var("HARVEST_SAMPLE_SIZE", &v)?;
        }
        if let Some(v) = get("HARVEST_WORKERS") {
            config.workers = parse_var("HARVEST_WORKERS", &v)?;
        }
        if let Some(v) = get("HARVEST_MIN_DURATION") {
            config.min_duration = parse_var("HARVEST_MIN_DURATION", &v)?;
        }
        if let Some(v) = get("HARVEST_MAX_DURATION") {
            config.max_duration = parse_var("HARVEST_MAX_DURATION", &v)?;
        }
        if let Some(v) = get("HARVEST_HTTP_TIMEOUT_SECS") {
            config.http_timeout = Duration::from_secs(parse_var("HARVEST_HTTP_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("HARVEST_PARSER_TIMEOUT_SECS") {
            config.parser_timeout = Duration::from_secs(parse_var("HARVEST_PARSER_TIMEOUT_SECS", &v)?);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.workers == 0 {
            return Err(HarvestError::Config("worker count must be at least 1".to_string()));
        }
        if self.min_duration > self.max_duration {
            return Err(HarvestError::Config(format!(
                "min duration {} exceeds max duration {}",
                self.min_duration, self.max_duration
            )));
        }
        Ok(())
    }

    /// The API key is only needed to talk to the match database, so the
    /// check happens when a command actually needs it.
    pub fn require_api_key(&self) -> Result<&str, HarvestError> {
        self.api_key.as_deref().ok_or_else(|| {
            HarvestError::Config("OPENDOTA_API_KEY is not set (add it to the environment or .env)".to_string())
        })
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T, HarvestError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| HarvestError::Config(format!("{} has invalid value '{}'", key, value)))
}
