use std::sync::atomic::AtomicBool;

use serde::Serialize;
use tracing::info;

use crate::config::{CsvLocation, RunConfig};
use crate::error::ReconError;
use crate::ingest::{ingest_rows, read_csv_rows, IngestReport};
use crate::inventory::{fetch_inventory, FetchReport};
use crate::matcher::{match_applications, MatchReport, MatchStrategy};
use crate::platform::PlatformClient;
use crate::reconcile::{apply, plan, PlannedAction, ReconcileReport};
use crate::source::{acquire_csv, CsvSource};

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Plan only; no topology writes.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub engine_version: String,
    pub run_at: String,
    pub input_csv_name: String,
    pub csv_location: CsvLocation,
    pub strategy: MatchStrategy,
    pub dry_run: bool,
}

/// Everything a run decided and did, phase by phase.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub meta: RunMeta,
    pub ingest: IngestReport,
    pub inventory: FetchReport,
    pub matching: MatchReport,
    pub actions: Vec<PlannedAction>,
    /// `None` on a dry run.
    pub reconcile: Option<ReconcileReport>,
}

/// One full pass: acquire → ingest → fetch inventory → match → reconcile.
pub fn sync(
    config: &RunConfig,
    source: &dyn CsvSource,
    client: &dyn PlatformClient,
    cancel: &AtomicBool,
    options: &SyncOptions,
) -> Result<RunReport, ReconError> {
    let strategy = config.match_strategy();
    let meta = RunMeta {
        engine_version: env!("CARGO_PKG_VERSION").to_string(),
        run_at: chrono::Utc::now().to_rfc3339(),
        input_csv_name: config.input_csv_name.clone(),
        csv_location: config.csv_location,
        strategy,
        dry_run: options.dry_run,
    };

    let bytes = acquire_csv(source, &config.input_csv_name, &config.retry, cancel)?;
    let rows = read_csv_rows(&bytes)?;
    let (mut apps, ingest) = ingest_rows(&rows, &config.field_map, &config.app_prefix)?;

    info!(platform = %client.target(), "getting VM information from platform");
    let (inventory, fetch) = fetch_inventory(client, config.page_size)?;

    let matching = match_applications(&mut apps, &inventory, strategy);

    let existing = client.list_topology_definitions()?;
    let actions = plan(apps, &existing);

    let reconcile = if options.dry_run {
        info!(actions = actions.len(), "dry run, no topology definitions written");
        None
    } else {
        Some(apply(client, &actions)?)
    };

    Ok(RunReport {
        meta,
        ingest,
        inventory: fetch,
        matching,
        actions,
        reconcile,
    })
}
