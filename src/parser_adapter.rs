use crate::error::StageError;
use crate::HarvestError;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub trait ReplayParser: Send + Sync {
    /// Turn a decompressed replay into a feature file at `output`.
    fn parse(&self, replay: &Path, output: &Path) -> Result<PathBuf, StageError>;
}

/// Runs the replay parser as a child process:
/// `<program> <args...> <replay> <output>`. Exit status 0 is success; the
/// JSON it writes is not inspected here.
#[derive(Debug, Clone)]
pub struct ExternalParser {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl ExternalParser {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new(), timeout: None }
    }

    /// Split a whitespace-separated command line such as
    /// `java -jar parser.jar`.
    pub fn from_command_line(command: &str) -> Result<Self, HarvestError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| HarvestError::Config("parser command is empty".to_string()))?;
        Ok(Self { program, args: parts.collect(), timeout: None })
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn run(&self, replay: &Path, output: &Path) -> Result<ExitStatus, StageError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(replay)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| StageError::Parse(format!("could not start {}: {}", self.program, e)))?;

        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if let Some(limit) = self.timeout {
                if started.elapsed() >= limit {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(StageError::Parse(format!(
                        "parser killed after {:.1}s timeout",
                        limit.as_secs_f64()
                    )));
                }
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl ReplayParser for ExternalParser {
    fn parse(&self, replay: &Path, output: &Path) -> Result<PathBuf, StageError> {
        tracing::info!(replay = %replay.display(), "Parsing replay");
        let status = self.run(replay, output)?;
        if !status.success() {
            return Err(StageError::Parse(format!("parser exited with {}", status)));
        }
        tracing::info!(output = %output.display(), "Replay parsed");
        Ok(output.to_path_buf())
    }
}
