//! View assembly.
//!
//! Fetches the payloads a view needs from a [`CrmSource`], runs them
//! through the payload boundary and the aggregation engine, and wraps the
//! rows in a [`Report`].

use crate::analysis::{self, TeamRoster};
use crate::cli::View;
use crate::crm::{
    parse_deals, parse_pipelines, parse_stages, CrmError, CrmSource, DealQuery, PayloadError,
};
use crate::models::{Deal, Report, ReportBody, ReportMetadata, Stage};
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised while building a view.
#[derive(Debug, Error)]
pub enum DashboardError {
    /// A payload could not be fetched.
    #[error(transparent)]
    Fetch(#[from] CrmError),

    /// A payload was fetched but could not be interpreted.
    #[error("could not interpret CRM response: {0}")]
    Payload(#[from] PayloadError),
}

/// Everything needed to build one view, besides the data source.
#[derive(Debug, Clone)]
pub struct ViewRequest {
    pub view: View,
    pub query: DealQuery,
    pub team: String,
    pub user: Option<String>,
    pub stage_order: Vec<String>,
    pub teams: TeamRoster,
    pub currency_symbol: String,
}

/// Fetch, parse and aggregate the data for `request.view`.
pub async fn build_report<S>(source: &S, request: &ViewRequest) -> Result<Report, DashboardError>
where
    S: CrmSource + ?Sized,
{
    let query = &request.query;
    let pipeline_id = query.pipeline_id.as_deref();

    let (records, body) = match request.view {
        View::Funnel => {
            let deals = fetch_deals(source, query).await?;
            let rows = analysis::funnel_view(&deals, &request.team, &request.teams);
            let summary = analysis::summarize_funnel(&rows);
            (
                deals.len(),
                ReportBody::Funnel {
                    team: request.team.clone(),
                    rows,
                    summary,
                },
            )
        }
        View::Users => {
            let deals = fetch_deals(source, query).await?;
            let rows = analysis::deals_per_user(&deals);
            (deals.len(), ReportBody::Users { rows })
        }
        View::Pivot => {
            let deals = fetch_deals(source, query).await?;
            let pivot = analysis::build_pivot(&deals, &request.stage_order);
            (
                deals.len(),
                ReportBody::Pivot {
                    users: pivot.users,
                    stages: pivot.stages,
                    cells: pivot.cells,
                },
            )
        }
        View::Teams => {
            let deals = fetch_deals(source, query).await?;
            let pivot = analysis::build_team_pivot(&deals, &request.stage_order, &request.teams);
            (
                deals.len(),
                ReportBody::Teams {
                    teams: pivot.teams,
                    stages: pivot.stages,
                    cells: pivot.cells,
                },
            )
        }
        View::Detail => {
            let (stages, deals) =
                futures::try_join!(fetch_stages(source, pipeline_id), fetch_deals(source, query))?;

            let mut detail = analysis::build_stage_detail(&deals, &stages);
            if detail.unmatched > 0 {
                info!(
                    "{} deal(s) are not in any stage of the selected pipeline",
                    detail.unmatched
                );
            }
            if let Some(ref user) = request.user {
                if !detail.users().iter().any(|u| u == user.trim()) {
                    info!("'{}' owns no deals in the selected stages", user.trim());
                }
                detail = detail.for_user(user);
            }

            (
                deals.len(),
                ReportBody::Detail {
                    user: request.user.clone(),
                    rows: detail.rows(),
                    summary: detail.summary(),
                    performance: analysis::user_performance(&detail),
                    members: detail.member_rows(),
                },
            )
        }
        View::Stages => {
            let stages = fetch_stages(source, pipeline_id).await?;
            let rows = analysis::stage_catalog(&stages);
            (stages.len(), ReportBody::Stages { rows })
        }
        View::Pipelines => {
            let payload = source.pipelines().await?;
            let pipelines = parse_pipelines(&payload)?;
            let rows = analysis::pipeline_rows(&pipelines);
            (pipelines.len(), ReportBody::Pipelines { rows })
        }
    };

    let metadata = ReportMetadata {
        view: request.view.to_string(),
        source: source.describe(),
        start_date: query.start_date,
        end_date: query.end_date,
        team: request.team.clone(),
        pipeline_id: query.pipeline_id.clone(),
        records,
        generated_at: Utc::now(),
        currency_symbol: request.currency_symbol.clone(),
    };

    Ok(Report { metadata, body })
}

async fn fetch_deals<S>(source: &S, query: &DealQuery) -> Result<Vec<Deal>, DashboardError>
where
    S: CrmSource + ?Sized,
{
    let payload = source.deals(query).await?;
    let deals = parse_deals(&payload)?;
    debug!("Parsed {} deals", deals.len());
    Ok(deals)
}

async fn fetch_stages<S>(source: &S, pipeline_id: Option<&str>) -> Result<Vec<Stage>, DashboardError>
where
    S: CrmSource + ?Sized,
{
    let payload = source.stages(pipeline_id).await?;
    let stages = parse_stages(&payload)?;
    debug!("Parsed {} stages", stages.len());
    Ok(stages)
}
