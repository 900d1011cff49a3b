use crate::config::HarvestConfig;
use crate::decompressor::Bz2Decompressor;
use crate::error::{FailureKind, HarvestError};
use crate::fetcher::{HttpReplayFetcher, ReplayUrlTemplate};
use crate::layout::DataLayout;
use crate::locator::{ExplorerClient, ReplayLocator};
use crate::manifest::ManifestStore;
use crate::model::MatchDescriptor;
use crate::orchestrator::{Orchestrator, RunReport};
use crate::parser_adapter::ExternalParser;
use crate::pipeline::{DurationFilter, MatchPipeline};
use crate::progress::RunObserver;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Which manifest entries a processing run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Everything in `match_data.json`.
    Manifest,
    /// Only the ids listed in `failed_matches.json`.
    FailedOnly,
}

pub fn duration_filter(config: &HarvestConfig) -> DurationFilter {
    DurationFilter::new(config.min_duration, config.max_duration)
}

/// Query the match database and write the match manifest. Fails before any
/// request when no API key is configured.
pub fn sample(config: &HarvestConfig, store: &ManifestStore) -> Result<usize, HarvestError> {
    let api_key = config.require_api_key()?;
    store.layout().initialize()?;

    let client = ExplorerClient::new(&config.api_url, api_key, config.http_timeout)?;
    let locator = ReplayLocator::new(client).with_filter(duration_filter(config));
    let matches = locator.locate(config.sample_size, &config.patch);
    if matches.is_empty() {
        tracing::warn!(patch = %config.patch, "Match query returned nothing; manifest will be empty");
    }
    store.save_matches(&matches)?;
    Ok(matches.len())
}

/// The production pipeline: HTTP replay storage, bzip2, external parser.
pub fn build_pipeline(
    config: &HarvestConfig,
    layout: DataLayout,
    skip_existing: bool,
) -> Result<MatchPipeline, HarvestError> {
    let fetcher = HttpReplayFetcher::new(ReplayUrlTemplate::new(config.replay_base.as_str()), config.http_timeout)?;
    let parser = ExternalParser::from_command_line(&config.parser_cmd)?.with_timeout(config.parser_timeout);
    Ok(
        MatchPipeline::new(Arc::new(fetcher), Arc::new(Bz2Decompressor), Arc::new(parser), layout)
            .with_filter(duration_filter(config))
            .with_skip_existing(skip_existing),
    )
}

pub fn select_matches(store: &ManifestStore, selection: Selection) -> Result<Vec<MatchDescriptor>, HarvestError> {
    let mut manifest = store.load_matches()?;
    if selection == Selection::FailedOnly {
        let failed: HashSet<u64> = store.load_failed_ids()?.into_iter().collect();
        manifest.retain(|m| failed.contains(&m.match_id));
    }
    Ok(manifest)
}

/// Run the selected matches through `pipeline` and overwrite the failure
/// manifest with this run's failures.
///
/// A retry with nothing to retry leaves the data directory untouched.
pub fn process(
    store: &ManifestStore,
    pipeline: MatchPipeline,
    workers: usize,
    selection: Selection,
    observer: Arc<dyn RunObserver>,
) -> Result<RunReport, HarvestError> {
    store.layout().initialize()?;
    let matches = select_matches(store, selection)?;
    if selection == Selection::FailedOnly {
        if matches.is_empty() {
            tracing::info!("No failed matches to retry");
            return Ok(RunReport::default());
        }
        tracing::info!(count = matches.len(), "Retrying failed matches");
    }

    let report = Orchestrator::new(Arc::new(pipeline), workers)
        .with_observer(observer)
        .run(&matches)?;
    store.save_failures(&report.failures)?;
    Ok(report)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSummary {
    pub manifest: usize,
    pub parsed: usize,
    pub failed: usize,
    pub failed_by_kind: BTreeMap<FailureKind, usize>,
}

/// Counts for the `status` command. The failure count comes from the id
/// manifest; the details file only contributes the per-kind breakdown.
pub fn status(store: &ManifestStore) -> Result<StatusSummary, HarvestError> {
    let layout = store.layout();
    let manifest = if layout.match_manifest().exists() {
        store.load_matches()?.len()
    } else {
        0
    };

    let mut failed_by_kind = BTreeMap::new();
    for failure in store.load_failure_details()? {
        *failed_by_kind.entry(failure.kind).or_insert(0) += 1;
    }

    Ok(StatusSummary {
        manifest,
        parsed: layout.count_parsed()?,
        failed: store.load_failed_ids()?.len(),
        failed_by_kind,
    })
}
