//! Markdown report generation.
//!
//! This module renders every dashboard view as Markdown tables, and the
//! whole report as pretty JSON.

use crate::models::{
    DetailSummary, FunnelRow, FunnelSummary, PipelineRow, PivotCell, Report, ReportBody,
    ReportMetadata, StageCatalogRow, StageMemberRow, StageRow, TeamPivotCell, UserDealCount,
    UserPerformance,
};
use anyhow::Result;
use chrono::{DateTime, NaiveDate};
use std::io::Write;
use std::path::Path;

const NO_DATA: &str = "No deals found for this period.";

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();
    let currency = report.metadata.currency_symbol.as_str();

    // Title
    output.push_str(&format!("# Pipeline Dashboard: {}\n\n", view_title(&report.body)));

    // Metadata section
    output.push_str(&generate_metadata_section(&report.metadata));

    match &report.body {
        ReportBody::Funnel {
            team,
            rows,
            summary,
        } => output.push_str(&generate_funnel_section(team, rows, summary)),
        ReportBody::Users { rows } => output.push_str(&generate_users_section(rows)),
        ReportBody::Pivot {
            users,
            stages,
            cells,
        } => output.push_str(&generate_pivot_section(users, stages, cells)),
        ReportBody::Teams {
            teams,
            stages,
            cells,
        } => output.push_str(&generate_team_section(teams, stages, cells)),
        ReportBody::Detail {
            user,
            rows,
            summary,
            performance,
            members,
        } => {
            output.push_str(&generate_detail_section(
                user.as_deref(),
                rows,
                summary,
                currency,
            ));
            output.push_str(&generate_performance_section(performance, currency));
            output.push_str(&generate_members_section(members, currency));
        }
        ReportBody::Stages { rows } => output.push_str(&generate_catalog_section(rows)),
        ReportBody::Pipelines { rows } => output.push_str(&generate_pipelines_section(rows)),
    }

    // Footer
    output.push_str(&generate_footer());

    output
}

fn view_title(body: &ReportBody) -> &'static str {
    match body {
        ReportBody::Funnel { .. } => "Sales Funnel",
        ReportBody::Users { .. } => "Deals per User",
        ReportBody::Pivot { .. } => "Deals by User and Stage",
        ReportBody::Teams { .. } => "Team Comparison",
        ReportBody::Detail { .. } => "Stage Detail",
        ReportBody::Stages { .. } => "Stage Catalog",
        ReportBody::Pipelines { .. } => "Pipelines",
    }
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **View:** {}\n", metadata.view));
    section.push_str(&format!("- **Source:** {}\n", metadata.source));
    section.push_str(&format!(
        "- **Period:** {} to {}\n",
        metadata.start_date.format("%Y-%m-%d"),
        metadata.end_date.format("%Y-%m-%d")
    ));
    section.push_str(&format!("- **Team:** {}\n", metadata.team));
    if let Some(ref pipeline) = metadata.pipeline_id {
        section.push_str(&format!("- **Pipeline:** `{}`\n", pipeline));
    }
    section.push_str(&format!("- **Records:** {}\n", metadata.records));
    section.push_str(&format!(
        "- **Generated At:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push('\n');

    section
}

fn generate_funnel_section(team: &str, rows: &[FunnelRow], summary: &FunnelSummary) -> String {
    let mut section = String::new();

    section.push_str(&format!("## Sales Funnel ({})\n\n", team));

    if rows.is_empty() {
        section.push_str(&format!("{}\n\n", NO_DATA));
        return section;
    }

    section.push_str("| Stage | Deals |\n");
    section.push_str("|:---|---:|\n");
    for row in rows {
        section.push_str(&format!("| {} | {} |\n", row.stage, row.count));
    }
    section.push('\n');

    section.push_str("### Funnel Metrics\n\n");
    section.push_str(&format!("- **Total Deals:** {}\n", summary.total_deals));
    match summary.conversion_rate {
        Some(rate) => section.push_str(&format!("- **Conversion Rate:** {:.1}%\n", rate)),
        None => section.push_str("- **Conversion Rate:** N/A\n"),
    }
    section.push_str(&format!("- **Active Stages:** {}\n", summary.active_stages));
    section.push_str(&format!(
        "- **Average per Stage:** {:.1}\n\n",
        summary.average_per_stage
    ));

    section
}

fn generate_users_section(rows: &[UserDealCount]) -> String {
    let mut section = String::new();

    section.push_str("## Deals per User\n\n");

    if rows.is_empty() {
        section.push_str(&format!("{}\n\n", NO_DATA));
        return section;
    }

    section.push_str("| User | Deals |\n");
    section.push_str("|:---|---:|\n");
    for row in rows {
        section.push_str(&format!("| {} | {} |\n", row.user, row.deals));
    }
    section.push('\n');

    section
}

/// Render a dense grid whose cells are laid out row-major.
fn generate_grid(corner: &str, rows: &[String], columns: &[String], counts: &[usize]) -> String {
    let mut grid = String::new();

    grid.push_str(&format!("| {} |", corner));
    for column in columns {
        grid.push_str(&format!(" {} |", column));
    }
    grid.push_str(" **Total** |\n");

    grid.push_str("|:---|");
    for _ in columns {
        grid.push_str("---:|");
    }
    grid.push_str("---:|\n");

    for (i, row) in rows.iter().enumerate() {
        let start = i * columns.len();
        let row_counts = counts.get(start..start + columns.len()).unwrap_or_default();

        grid.push_str(&format!("| {} |", row));
        for count in row_counts {
            grid.push_str(&format!(" {} |", count));
        }
        grid.push_str(&format!(" **{}** |\n", row_counts.iter().sum::<usize>()));
    }
    grid.push('\n');

    grid
}

fn generate_pivot_section(users: &[String], stages: &[String], cells: &[PivotCell]) -> String {
    let mut section = String::new();

    section.push_str("## Deals by User and Stage\n\n");

    if cells.is_empty() {
        section.push_str(&format!("{}\n\n", NO_DATA));
        return section;
    }

    let counts: Vec<usize> = cells.iter().map(|c| c.count).collect();
    section.push_str(&generate_grid("User", users, stages, &counts));

    section
}

fn generate_team_section(teams: &[String], stages: &[String], cells: &[TeamPivotCell]) -> String {
    let mut section = String::new();

    section.push_str("## Team Comparison\n\n");

    if teams.is_empty() {
        section.push_str("No teams configured. Add a `[funnel.teams]` table to the config.\n\n");
        return section;
    }
    if cells.is_empty() {
        section.push_str(&format!("{}\n\n", NO_DATA));
        return section;
    }

    let counts: Vec<usize> = cells.iter().map(|c| c.count).collect();
    section.push_str(&generate_grid("Team", teams, stages, &counts));

    section
}

fn generate_detail_section(
    user: Option<&str>,
    rows: &[StageRow],
    summary: &DetailSummary,
    currency: &str,
) -> String {
    let mut section = String::new();

    match user {
        Some(user) => section.push_str(&format!("## Deals by Stage ({})\n\n", user)),
        None => section.push_str("## Deals by Stage\n\n"),
    }

    if rows.is_empty() {
        section.push_str("No stages found for this pipeline.\n\n");
        return section;
    }

    section.push_str("| Order | Stage | Nickname | Deals | Total Value | Average Value | Stage ID |\n");
    section.push_str("|---:|:---|:---|---:|---:|---:|:---|\n");
    for row in rows {
        section.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | `{}` |\n",
            row.order,
            row.stage,
            row.nickname,
            row.deals,
            format_currency(row.total_value, currency),
            format_currency(row.average_value, currency),
            row.stage_id
        ));
    }
    section.push('\n');

    section.push_str("### Overall Metrics\n\n");
    section.push_str(&format!("- **Total Deals:** {}\n", summary.total_deals));
    section.push_str(&format!(
        "- **Total Value:** {}\n",
        format_currency(summary.total_value, currency)
    ));
    section.push_str(&format!(
        "- **Average Value:** {}\n",
        format_currency(summary.average_value, currency)
    ));
    if summary.unmatched_deals > 0 {
        section.push_str(&format!(
            "- **Deals Outside Known Stages:** {}\n",
            summary.unmatched_deals
        ));
    }
    section.push('\n');

    section
}

fn generate_performance_section(rows: &[UserPerformance], currency: &str) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## User Performance\n\n");
    section.push_str("| User | Deals | Total Value | Average Value | Active Stages | Stages |\n");
    section.push_str("|:---|---:|---:|---:|---:|:---|\n");
    for row in rows {
        section.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            row.user,
            row.total_deals,
            format_currency(row.total_value, currency),
            format_currency(row.average_value, currency),
            row.active_stages,
            row.stages
        ));
    }
    section.push('\n');

    section
}

fn generate_members_section(members: &[StageMemberRow], currency: &str) -> String {
    if members.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Deals in Each Stage\n\n");

    let mut current: Option<&str> = None;
    for member in members {
        if current != Some(member.stage.as_str()) {
            if current.is_some() {
                section.push('\n');
            }
            section.push_str(&format!("### {}\n\n", member.stage));
            section.push_str("| ID | Name | Value | User | Created At |\n");
            section.push_str("|:---|:---|---:|:---|:---|\n");
            current = Some(member.stage.as_str());
        }

        section.push_str(&format!(
            "| `{}` | {} | {} | {} | {} |\n",
            member.id,
            member.name,
            format_currency(member.value, currency),
            member.user,
            format_created_at(member.created_at.as_deref())
        ));
    }
    section.push('\n');

    section
}

fn generate_catalog_section(rows: &[StageCatalogRow]) -> String {
    let mut section = String::new();

    section.push_str("## Stage Catalog\n\n");

    if rows.is_empty() {
        section.push_str("No stages found.\n\n");
        return section;
    }

    section.push_str("| Name | Nickname | ID | Order | Pipeline | Pipeline ID | Objective |\n");
    section.push_str("|:---|:---|:---|---:|:---|:---|:---|\n");
    for row in rows {
        section.push_str(&format!(
            "| {} | {} | `{}` | {} | {} | `{}` | {} |\n",
            row.name, row.nickname, row.id, row.order, row.pipeline, row.pipeline_id, row.objective
        ));
    }
    section.push('\n');

    section
}

fn generate_pipelines_section(rows: &[PipelineRow]) -> String {
    let mut section = String::new();

    section.push_str("## Pipelines\n\n");

    if rows.is_empty() {
        section.push_str("No pipelines found.\n\n");
        return section;
    }

    section.push_str("| ID | Name | Stages |\n");
    section.push_str("|:---|:---|---:|\n");
    for row in rows {
        section.push_str(&format!("| `{}` | {} | {} |\n", row.id, row.name, row.stages));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str("*Report generated by funnelboard*\n");

    footer
}

/// Format a monetary amount as `{symbol} 1,234.56`.
pub fn format_currency(value: f64, symbol: &str) -> String {
    let negative = value < 0.0;
    let fixed = format!("{:.2}", value.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!(
        "{} {}{}.{}",
        symbol,
        if negative { "-" } else { "" },
        grouped,
        cents
    )
}

/// Render a CRM timestamp as `dd/mm/YYYY HH:MM`.
///
/// Values that are not RFC 3339 are shown as sent; missing ones as "N/A".
pub fn format_created_at(created_at: Option<&str>) -> String {
    match created_at {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|ts| ts.format("%d/%m/%Y %H:%M").to_string())
            .unwrap_or_else(|_| raw.to_string()),
        None => "N/A".to_string(),
    }
}

/// Write the report to a file.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}

/// File name for an exported view: `{prefix}_{YYYYMMDD}_to_{YYYYMMDD}.{extension}`.
pub fn export_file_name(
    prefix: &str,
    start: NaiveDate,
    end: NaiveDate,
    extension: &str,
) -> String {
    format!(
        "{}_{}_to_{}.{}",
        prefix,
        start.format("%Y%m%d"),
        end.format("%Y%m%d"),
        extension
    )
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
