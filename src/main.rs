use clap::{Parser, Subcommand};
use dotenv::dotenv;
use replay_harvest::config::HarvestConfig;
use replay_harvest::harvest::{self, Selection};
use replay_harvest::layout::DataLayout;
use replay_harvest::manifest::ManifestStore;
use replay_harvest::orchestrator::RunReport;
use replay_harvest::progress::TracingObserver;
use replay_harvest::HarvestError;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "replay-harvest")]
#[command(about = "Sample ranked matches, download their replays and parse them into feature files", long_about = None)]
struct Cli {
    /// Data directory (overrides HARVEST_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Query the match database and write match_data.json
    Sample {
        /// Number of matches to request
        #[arg(long)]
        count: Option<usize>,
        /// Game patch, e.g. 7.37
        #[arg(long)]
        patch: Option<String>,
    },
    /// Download and parse every match in match_data.json
    Process {
        #[arg(long)]
        workers: Option<usize>,
        /// Do not re-download matches that already have a feature file
        #[arg(long)]
        skip_existing: bool,
    },
    /// Re-run only the matches listed in failed_matches.json
    RetryFailed {
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Sample, then process (the default)
    Run {
        #[arg(long)]
        count: Option<usize>,
        #[arg(long)]
        patch: Option<String>,
        #[arg(long)]
        workers: Option<usize>,
        #[arg(long)]
        skip_existing: bool,
    },
    /// Show manifest, output and failure counts
    Status,
}

fn main() -> ExitCode {
    dotenv().ok();
    let _telemetry = replay_harvest::init_tracing("replay-harvest");
    let cli = Cli::parse();

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> Result<(), HarvestError> {
    let mut config = HarvestConfig::from_env()?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let store = ManifestStore::new(DataLayout::new(&config.data_dir));

    match cli.command.unwrap_or(Commands::Run { count: None, patch: None, workers: None, skip_existing: false }) {
        Commands::Sample { count, patch } => {
            apply_sample_overrides(&mut config, count, patch);
            harvest::sample(&config, &store)?;
        }
        Commands::Process { workers, skip_existing } => {
            apply_worker_override(&mut config, workers)?;
            process(&config, &store, skip_existing, Selection::Manifest)?;
        }
        Commands::RetryFailed { workers } => {
            apply_worker_override(&mut config, workers)?;
            process(&config, &store, false, Selection::FailedOnly)?;
        }
        Commands::Run { count, patch, workers, skip_existing } => {
            apply_sample_overrides(&mut config, count, patch);
            apply_worker_override(&mut config, workers)?;
            tracing::info!("Sampling matches from SQL database...");
            harvest::sample(&config, &store)?;
            tracing::info!("Done sampling matches!");
            process(&config, &store, skip_existing, Selection::Manifest)?;
        }
        Commands::Status => status(&store)?,
    }
    Ok(())
}

fn apply_sample_overrides(config: &mut HarvestConfig, count: Option<usize>, patch: Option<String>) {
    if let Some(count) = count {
        config.sample_size = count;
    }
    if let Some(patch) = patch {
        config.patch = patch;
    }
}

fn apply_worker_override(config: &mut HarvestConfig, workers: Option<usize>) -> Result<(), HarvestError> {
    if let Some(workers) = workers {
        config.workers = workers;
    }
    config.validate()
}

fn process(config: &HarvestConfig, store: &ManifestStore, skip_existing: bool, selection: Selection) -> Result<RunReport, HarvestError> {
    let pipeline = harvest::build_pipeline(config, store.layout().clone(), skip_existing)?;
    harvest::process(store, pipeline, config.workers, selection, Arc::new(TracingObserver::new()))
}

fn status(store: &ManifestStore) -> Result<(), HarvestError> {
    let summary = harvest::status(store)?;
    println!("data dir:        {}", store.layout().base_dir.display());
    println!("manifest:        {}", summary.manifest);
    println!("parsed replays:  {}", summary.parsed);
    println!("failed matches:  {}", summary.failed);
    for (kind, count) in &summary.failed_by_kind {
        println!("  {:<14} {}", kind.to_string(), count);
    }
    Ok(())
}
