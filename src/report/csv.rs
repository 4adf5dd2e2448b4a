//! CSV export of a view's flat rows.

use crate::models::{Report, ReportBody};
use anyhow::{anyhow, Context, Result};
use csv::WriterBuilder;
use serde::Serialize;

const FUNNEL_HEADER: &[&str] = &["stage", "count"];
const USERS_HEADER: &[&str] = &["user", "deals"];
const PIVOT_HEADER: &[&str] = &["user", "stage", "count"];
const TEAMS_HEADER: &[&str] = &["team", "stage", "count"];
const DETAIL_HEADER: &[&str] = &[
    "order",
    "stage",
    "nickname",
    "deals",
    "total_value",
    "average_value",
    "stage_id",
];
const STAGES_HEADER: &[&str] = &[
    "name",
    "nickname",
    "id",
    "order",
    "pipeline",
    "pipeline_id",
    "objective",
];
const PIPELINES_HEADER: &[&str] = &["id", "name", "stages"];

/// Serialize the primary row set of `report` as CSV, header included.
///
/// Pivots are written in long format, one line per cell; the stage detail
/// view exports its per-stage rows. The header line is written even when
/// there are no rows.
pub fn generate_csv_report(report: &Report) -> Result<String> {
    match &report.body {
        ReportBody::Funnel { rows, .. } => write_rows(FUNNEL_HEADER, rows),
        ReportBody::Users { rows } => write_rows(USERS_HEADER, rows),
        ReportBody::Pivot { cells, .. } => write_rows(PIVOT_HEADER, cells),
        ReportBody::Teams { cells, .. } => write_rows(TEAMS_HEADER, cells),
        ReportBody::Detail { rows, .. } => write_rows(DETAIL_HEADER, rows),
        ReportBody::Stages { rows } => write_rows(STAGES_HEADER, rows),
        ReportBody::Pipelines { rows } => write_rows(PIPELINES_HEADER, rows),
    }
}

fn write_rows<T: Serialize>(header: &[&str], rows: &[T]) -> Result<String> {
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(vec![]);

    wtr.write_record(header).context("Failed to write CSV header")?;
    for row in rows {
        wtr.serialize(row).context("Failed to serialize CSV row")?;
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| anyhow!("Failed to flush CSV output: {}", e.error()))?;

    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}
