//! Data models for the pipeline dashboard.
//!
//! This module contains the records parsed from the CRM payloads (deals,
//! stage definitions, pipelines) and the flat row types produced by the
//! aggregation engine and consumed by the report renderers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Label used for deals whose stage carries no name.
pub const NO_STAGE: &str = "No Stage";

/// Owner label shown in drill-down rows for deals without an owner.
pub const NO_USER: &str = "No user";

/// Funnel step derived from a deal's rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RatingStage {
    Leads,
    Mql,
    Sql,
    Proposal,
    Negotiation,
    /// Catch-all for missing or out-of-range ratings.
    InProgress,
}

impl RatingStage {
    /// Canonical display order of the rating funnel.
    pub const ALL: [RatingStage; 6] = [
        RatingStage::Leads,
        RatingStage::Mql,
        RatingStage::Sql,
        RatingStage::Proposal,
        RatingStage::Negotiation,
        RatingStage::InProgress,
    ];

    /// Maps a rating to its funnel step.
    pub fn from_rating(rating: Option<i64>) -> Self {
        match rating {
            Some(1) => RatingStage::Leads,
            Some(2) => RatingStage::Mql,
            Some(3) => RatingStage::Sql,
            Some(4) => RatingStage::Proposal,
            Some(5) => RatingStage::Negotiation,
            _ => RatingStage::InProgress,
        }
    }
}

impl fmt::Display for RatingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RatingStage::Leads => write!(f, "Leads"),
            RatingStage::Mql => write!(f, "MQL"),
            RatingStage::Sql => write!(f, "SQL"),
            RatingStage::Proposal => write!(f, "Proposal"),
            RatingStage::Negotiation => write!(f, "Negotiation"),
            RatingStage::InProgress => write!(f, "In Progress"),
        }
    }
}

/// A sales opportunity as read from the CRM.
///
/// Missing optional fields are replaced with neutral defaults while parsing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "RawDeal")]
pub struct Deal {
    /// Opaque identifier (numeric ids are rendered as strings).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Monetary amount; absent or null amounts are zero.
    pub value: f64,
    /// Rating used by the rating funnel.
    pub rating: Option<i64>,
    /// Owner display name, trimmed; `None` when absent or blank.
    pub user: Option<String>,
    /// Identifier of the deal's current stage.
    pub stage_id: Option<String>,
    /// Name of the deal's current stage.
    pub stage_name: Option<String>,
    /// Creation timestamp as sent by the CRM.
    pub created_at: Option<String>,
}

impl Deal {
    /// Trimmed, non-empty owner name.
    pub fn owner(&self) -> Option<&str> {
        self.user
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Stage name, or [`NO_STAGE`] when the deal has none.
    pub fn stage_label(&self) -> &str {
        self.stage_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(NO_STAGE)
    }
}

/// Loose shape of a deal object; every field is optional and untyped.
#[derive(Debug, Default, Deserialize)]
struct RawDeal {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    name: Value,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    rating: Value,
    #[serde(default)]
    user: Value,
    #[serde(default)]
    owner: Value,
    #[serde(default)]
    assigned_user: Value,
    #[serde(default)]
    deal_stage: Value,
    #[serde(default)]
    stage: Value,
    #[serde(default)]
    created_at: Value,
}

impl From<RawDeal> for Deal {
    fn from(raw: RawDeal) -> Self {
        let stage = if raw.deal_stage.is_null() {
            &raw.stage
        } else {
            &raw.deal_stage
        };

        let user = [&raw.user, &raw.owner, &raw.assigned_user]
            .into_iter()
            .find_map(owner_name);

        Self {
            id: text(&raw.id).unwrap_or_default(),
            name: text(&raw.name).unwrap_or_default(),
            value: amount(&raw.value),
            rating: whole_number(&raw.rating),
            user,
            stage_id: stage.get("id").and_then(text),
            stage_name: match stage {
                Value::String(name) => Some(name.clone()),
                other => other.get("name").and_then(text),
            },
            created_at: text(&raw.created_at),
        }
    }
}

/// Reads a string or number as text.
fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reads a monetary amount; anything unusable counts as zero.
fn amount(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Reads an integer, accepting floats without a fractional part.
fn whole_number(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|v| v.fract() == 0.0 && *v >= i64::MIN as f64 && *v <= i64::MAX as f64)
            .map(|v| v as i64)
    })
}

/// Reads an owner reference: a plain string or an object with `name`.
fn owner_name(value: &Value) -> Option<String> {
    let name = match value {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("name")?.as_str()?,
        _ => return None,
    };
    let trimmed = name.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Pipeline a stage belongs to.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineRef {
    pub id: String,
    pub name: String,
}

/// A stage definition from the CRM.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "RawStage")]
pub struct Stage {
    pub id: String,
    pub name: String,
    /// Short label; empty when the CRM sends none.
    pub nickname: String,
    /// Position within its pipeline.
    pub order: i64,
    pub objective: Option<String>,
    pub pipeline: Option<PipelineRef>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStage {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    name: Value,
    #[serde(default)]
    nickname: Value,
    #[serde(default)]
    order: Value,
    #[serde(default)]
    objective: Value,
    #[serde(default)]
    deal_pipeline: Value,
}

impl From<RawStage> for Stage {
    fn from(raw: RawStage) -> Self {
        let pipeline = raw.deal_pipeline.as_object().map(|p| PipelineRef {
            id: p.get("id").and_then(text).unwrap_or_default(),
            name: p.get("name").and_then(text).unwrap_or_default(),
        });

        Self {
            id: text(&raw.id).unwrap_or_default(),
            name: text(&raw.name).unwrap_or_default(),
            nickname: text(&raw.nickname).unwrap_or_default(),
            order: raw.order.as_i64().unwrap_or(0),
            objective: text(&raw.objective).filter(|o| !o.is_empty()),
            pipeline,
        }
    }
}

/// A sales pipeline (funnel) from the CRM.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "RawPipeline")]
pub struct Pipeline {
    pub id: String,
    pub name: String,
    pub stages: Vec<Stage>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPipeline {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    name: Value,
    #[serde(default)]
    deal_stages: Value,
}

impl From<RawPipeline> for Pipeline {
    fn from(raw: RawPipeline) -> Self {
        let stages = raw
            .deal_stages
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter(|item| item.is_object())
                    .filter_map(|item| Stage::deserialize(item).ok())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id: text(&raw.id).unwrap_or_default(),
            name: text(&raw.name).unwrap_or_default(),
            stages,
        }
    }
}

/// One row of the rating funnel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunnelRow {
    pub stage: String,
    pub count: usize,
}

/// Headline metrics for a rating funnel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FunnelSummary {
    pub total_deals: usize,
    pub active_stages: usize,
    /// Last stage count over first stage count, in percent.
    pub conversion_rate: Option<f64>,
    pub average_per_stage: f64,
}

/// Number of deals owned by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserDealCount {
    pub user: String,
    pub deals: usize,
}

/// One (user, stage) cell of the dense pivot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PivotCell {
    pub user: String,
    pub stage: String,
    pub count: usize,
}

/// One (team, stage) cell of the dense team pivot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamPivotCell {
    pub team: String,
    pub stage: String,
    pub count: usize,
}

/// Lightweight projection of a deal kept inside a stage bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DealSummary {
    pub id: String,
    pub name: String,
    pub value: f64,
    pub user: String,
    pub created_at: Option<String>,
}

impl From<&Deal> for DealSummary {
    fn from(deal: &Deal) -> Self {
        Self {
            id: deal.id.clone(),
            name: deal.name.clone(),
            value: deal.value,
            user: deal.owner().unwrap_or(NO_USER).to_string(),
            created_at: deal.created_at.clone(),
        }
    }
}

/// Deals grouped under one known stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageBucket {
    pub stage_id: String,
    pub name: String,
    pub nickname: String,
    pub order_index: i64,
    pub count: usize,
    pub total_value: f64,
    pub average_value: f64,
    pub deals: Vec<DealSummary>,
}

impl StageBucket {
    /// Creates an empty bucket for a stage definition.
    pub fn empty(stage: &Stage) -> Self {
        Self {
            stage_id: stage.id.clone(),
            name: stage.name.clone(),
            nickname: stage.nickname.clone(),
            order_index: stage.order,
            count: 0,
            total_value: 0.0,
            average_value: 0.0,
            deals: Vec::new(),
        }
    }

    /// Adds a deal to the bucket. Call [`StageBucket::finish`] afterwards.
    pub fn push(&mut self, deal: DealSummary) {
        self.count += 1;
        self.total_value += deal.value;
        self.deals.push(deal);
    }

    /// Recomputes the average from the running totals.
    pub fn finish(&mut self) {
        self.average_value = if self.count > 0 {
            self.total_value / self.count as f64
        } else {
            0.0
        };
    }

    /// Recomputes count, total and average from the member list.
    pub fn refresh_totals(&mut self) {
        self.count = self.deals.len();
        self.total_value = self.deals.iter().map(|d| d.value).sum();
        self.finish();
    }
}

/// Flat table row for a stage bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageRow {
    pub order: i64,
    pub stage: String,
    pub nickname: String,
    pub deals: usize,
    pub total_value: f64,
    pub average_value: f64,
    pub stage_id: String,
}

impl From<&StageBucket> for StageRow {
    fn from(bucket: &StageBucket) -> Self {
        Self {
            order: bucket.order_index,
            stage: bucket.name.clone(),
            nickname: bucket.nickname.clone(),
            deals: bucket.count,
            total_value: bucket.total_value,
            average_value: bucket.average_value,
            stage_id: bucket.stage_id.clone(),
        }
    }
}

/// Flat drill-down row: one member deal of a stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageMemberRow {
    pub stage: String,
    pub id: String,
    pub name: String,
    pub value: f64,
    pub user: String,
    pub created_at: Option<String>,
}

/// Overall metrics of a stage detail view.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetailSummary {
    pub total_deals: usize,
    pub total_value: f64,
    pub average_value: f64,
    /// Deals whose stage id is not among the known stages.
    pub unmatched_deals: usize,
}

/// Per-user totals across the stage detail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserPerformance {
    pub user: String,
    pub total_deals: usize,
    pub total_value: f64,
    pub average_value: f64,
    pub active_stages: usize,
    pub stages: String,
}

/// Flat row describing a stage definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageCatalogRow {
    pub name: String,
    pub nickname: String,
    pub id: String,
    pub order: i64,
    pub pipeline: String,
    pub pipeline_id: String,
    pub objective: String,
}

/// Flat row describing a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineRow {
    pub id: String,
    pub name: String,
    pub stages: usize,
}

/// Metadata about a rendered report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    /// Name of the rendered view.
    pub view: String,
    /// Where the data came from (CRM base URL or input file).
    pub source: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub team: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<String>,
    /// Number of records that fed the view.
    pub records: usize,
    pub generated_at: DateTime<Utc>,
    pub currency_symbol: String,
}

/// View-specific content of a report.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "view", content = "data", rename_all = "snake_case")]
pub enum ReportBody {
    Funnel {
        team: String,
        rows: Vec<FunnelRow>,
        summary: FunnelSummary,
    },
    Users {
        rows: Vec<UserDealCount>,
    },
    Pivot {
        users: Vec<String>,
        stages: Vec<String>,
        cells: Vec<PivotCell>,
    },
    Teams {
        teams: Vec<String>,
        stages: Vec<String>,
        cells: Vec<TeamPivotCell>,
    },
    Detail {
        user: Option<String>,
        rows: Vec<StageRow>,
        summary: DetailSummary,
        performance: Vec<UserPerformance>,
        members: Vec<StageMemberRow>,
    },
    Stages {
        rows: Vec<StageCatalogRow>,
    },
    Pipelines {
        rows: Vec<PipelineRow>,
    },
}

/// A complete rendered dashboard view.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub body: ReportBody,
}

impl Report {
    /// Returns true when the view has no rows to show.
    pub fn is_empty(&self) -> bool {
        match &self.body {
            ReportBody::Funnel { rows, .. } => rows.is_empty(),
            ReportBody::Users { rows } => rows.is_empty(),
            ReportBody::Pivot { cells, .. } => cells.is_empty(),
            ReportBody::Teams { cells, .. } => cells.is_empty(),
            ReportBody::Detail { rows, .. } => rows.is_empty(),
            ReportBody::Stages { rows } => rows.is_empty(),
            ReportBody::Pipelines { rows } => rows.is_empty(),
        }
    }
}
