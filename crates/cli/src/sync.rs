//! `apptopo sync` and `apptopo validate`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use apptopo_platform::{PlatformApi, PlatformCredentials};
use apptopo_recon::engine::RunReport;
use apptopo_recon::reconcile::PlannedAction;
use apptopo_recon::{ReconError, RunConfig, SyncOptions};
use tracing::info;

use crate::exit_codes::{recon_exit_code, recon_hint, EXIT_ERROR};
use crate::{logging, signals, source, CliError};

impl From<ReconError> for CliError {
    fn from(err: ReconError) -> Self {
        Self {
            code: recon_exit_code(&err),
            hint: recon_hint(&err),
            message: err.to_string(),
        }
    }
}

/// Read and validate the run configuration file.
pub fn load_config(path: &Path) -> Result<RunConfig, CliError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::usage(format!("cannot read config {}: {e}", path.display())))?;
    Ok(RunConfig::from_json(&text)?)
}

pub fn cmd_sync(
    config_path: PathBuf,
    dry_run: bool,
    json: bool,
    output: Option<PathBuf>,
) -> Result<(), CliError> {
    let config = load_config(&config_path)?;
    let subscriber = logging::build_subscriber(&config.logging)?;

    let report = tracing::subscriber::with_default(subscriber, || run(&config, dry_run))?;

    if let Some(path) = &output {
        let body = report_json(&report)?;
        std::fs::write(path, body + "\n").map_err(|e| {
            CliError::usage(format!("cannot write report to {}: {e}", path.display()))
        })?;
    }

    if json {
        println!("{}", report_json(&report)?);
    } else {
        print!("{}", render_summary(&report));
    }
    Ok(())
}

fn run(config: &RunConfig, dry_run: bool) -> Result<RunReport, CliError> {
    if !config.ignored_keys.is_empty() {
        tracing::debug!(keys = ?config.ignored_keys, "ignoring unknown configuration keys");
    }

    let source = source::from_config(config)?;
    let creds = PlatformCredentials::from_env().map_err(CliError::config)?;

    info!(
        source = %source.describe(),
        platform = %creds.base_url,
        dry_run,
        "starting topology sync"
    );

    let client = PlatformApi::connect(&creds).map_err(ReconError::from)?;

    let options = SyncOptions { dry_run };
    let report = apptopo_recon::sync(
        config,
        source.as_ref(),
        &client,
        signals::cancel_flag(),
        &options,
    )?;
    Ok(report)
}

/// Parse and validate the config without touching any source or platform.
pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = load_config(&config_path)?;
    source::from_config(&config)?;
    PlatformCredentials::from_env().map_err(|e| {
        CliError::config(e).with_hint("set TURBO_ADDRESS, TURBO_USERNAME and TURBO_PASSWORD")
    })?;

    println!(
        "ok: {} from {} ({}), strategy {:?}",
        config.input_csv_name,
        config.csv_location,
        config.input_csv_dir,
        config.match_strategy()
    );
    for key in &config.ignored_keys {
        println!("note: unknown key {key} ignored");
    }
    Ok(())
}

fn report_json(report: &RunReport) -> Result<String, CliError> {
    serde_json::to_string_pretty(report).map_err(|e| CliError {
        code: EXIT_ERROR,
        message: format!("cannot serialize run report: {e}"),
        hint: None,
    })
}

/// Human-readable run summary for stdout.
pub fn render_summary(report: &RunReport) -> String {
    let mut out = String::new();
    let mode = if report.meta.dry_run { " (dry run)" } else { "" };

    let _ = writeln!(out, "apptopo sync{mode}: {}", report.meta.input_csv_name);
    let _ = writeln!(
        out,
        "  rows:         {} read, {} skipped, {} application(s)",
        report.ingest.rows, report.ingest.skipped_rows, report.ingest.applications
    );
    let _ = writeln!(
        out,
        "  inventory:    {} VM(s) in {} window(s), {} via fallback, {} skipped",
        report.inventory.vms_fetched,
        report.inventory.windows,
        report.inventory.fallback_windows,
        report.inventory.skipped_ids.len()
    );
    let _ = writeln!(
        out,
        "  matching:     {}/{} member(s) matched, {} ambiguous",
        report.matching.matched, report.matching.members, report.matching.ambiguous
    );

    for action in &report.actions {
        let line = match action {
            PlannedAction::Skip { application, reason } => format!("skip    {application}: {reason}"),
            PlannedAction::Create { application, payload, pruned } => format!(
                "create  {application} ({} member(s){})",
                payload.static_connections().len(),
                pruned_note(*pruned)
            ),
            PlannedAction::Update { application, payload, pruned, .. } => format!(
                "update  {application} ({} member(s){})",
                payload.static_connections().len(),
                pruned_note(*pruned)
            ),
        };
        let _ = writeln!(out, "  {line}");
    }

    match &report.reconcile {
        Some(r) => {
            let _ = writeln!(
                out,
                "  result:       {} created, {} updated, {} skipped",
                r.created.len(),
                r.updated.len(),
                r.skipped.len()
            );
        }
        None => {
            let _ = writeln!(out, "  result:       nothing written");
        }
    }
    out
}

fn pruned_note(pruned: usize) -> String {
    if pruned == 0 {
        String::new()
    } else {
        format!(", {pruned} unmatched dropped")
    }
}
