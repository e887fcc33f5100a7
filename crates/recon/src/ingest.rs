//! CSV rows → applications.
//!
//! Row-level problems (blank application or entity name, no address,
//! duplicate member) are reported as [`RowOutcome`]s and never stop
//! ingestion. A row mapping that lacks a required mapped column means the
//! field map does not fit the data source and aborts with
//! [`ReconError::MissingColumn`].

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::FieldMap;
use crate::error::ReconError;
use crate::model::{Application, MemberOutcome};

/// One CSV record keyed by header name.
pub type CsvRow = HashMap<String, String>;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Applications keyed by prefixed name.
pub type Applications = BTreeMap<String, Application>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    /// Application column blank; nothing recorded.
    SkippedNoApplication,
    /// Entity name blank; nothing recorded.
    SkippedNoMember,
    Member(MemberOutcome),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub rows: usize,
    pub skipped_rows: usize,
    /// Subset of `skipped_rows` that named an application but no member.
    pub rows_without_member: usize,
    pub members_added: usize,
    pub members_without_address: usize,
    pub duplicate_members: usize,
    pub applications: usize,
}

/// Decode CSV bytes into header-keyed rows.
///
/// A leading UTF-8 BOM is ignored. Ragged rows are accepted; a short row
/// simply lacks the trailing columns.
pub fn read_csv_rows(data: &[u8]) -> Result<Vec<CsvRow>, ReconError> {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(data);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ReconError::Csv(e.to_string()))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ReconError::Csv(e.to_string()))?;
        let row: CsvRow = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), v.to_string()))
            .collect();
        rows.push(row);
    }

    debug!(rows = rows.len(), columns = headers.len(), "read input CSV");
    Ok(rows)
}

/// Group rows into applications named `prefix + app_name`.
pub fn ingest_rows(
    rows: &[CsvRow],
    field_map: &FieldMap,
    prefix: &str,
) -> Result<(Applications, IngestReport), ReconError> {
    info!("looking for applications and associated VMs");

    let mut apps = Applications::new();
    let mut report = IngestReport::default();

    for (index, row) in rows.iter().enumerate() {
        // Header is line 1
        let line = index + 2;
        report.rows += 1;

        match ingest_row(&mut apps, row, line, field_map, prefix)? {
            RowOutcome::SkippedNoApplication => report.skipped_rows += 1,
            RowOutcome::SkippedNoMember => {
                report.skipped_rows += 1;
                report.rows_without_member += 1;
            }
            RowOutcome::Member(MemberOutcome::Added) => report.members_added += 1,
            RowOutcome::Member(MemberOutcome::AddedWithoutAddress) => {
                report.members_added += 1;
                report.members_without_address += 1;
            }
            RowOutcome::Member(MemberOutcome::Duplicate) => report.duplicate_members += 1,
        }
    }

    report.applications = apps.len();
    info!(
        applications = report.applications,
        members = report.members_added,
        skipped_rows = report.skipped_rows,
        "parsed input CSV"
    );

    Ok((apps, report))
}

fn ingest_row(
    apps: &mut Applications,
    row: &CsvRow,
    line: usize,
    field_map: &FieldMap,
    prefix: &str,
) -> Result<RowOutcome, ReconError> {
    let app_name = column(row, &field_map.app_name, line)?;
    if app_name.is_empty() {
        warn!("no application defined on row {line} of input CSV, skipping");
        return Ok(RowOutcome::SkippedNoApplication);
    }

    let member_name = column(row, &field_map.entity_name, line)?;
    if member_name.is_empty() {
        warn!("no entity name defined on row {line} of input CSV, skipping");
        return Ok(RowOutcome::SkippedNoMember);
    }

    let raw_ips = field_map
        .entity_ip
        .as_ref()
        .and_then(|col| row.get(col))
        .map(String::as_str)
        .unwrap_or("");

    let full_name = format!("{prefix}{app_name}");
    let app = apps
        .entry(full_name.clone())
        .or_insert_with(|| Application::new(full_name));

    let outcome = app.add_member(member_name, raw_ips);
    if outcome == MemberOutcome::AddedWithoutAddress {
        warn!("no IP address defined on row {line} of input CSV, member {member_name} kept for name matching");
    }

    Ok(RowOutcome::Member(outcome))
}

fn column<'a>(row: &'a CsvRow, name: &str, line: usize) -> Result<&'a str, ReconError> {
    row.get(name)
        .map(|v| v.trim())
        .ok_or_else(|| ReconError::MissingColumn {
            row: line,
            column: name.into(),
        })
}
