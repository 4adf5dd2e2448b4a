//! Deal aggregation and statistics.
//!
//! Pure functions that group deals by funnel stage, by owner and by team,
//! and build the dense pivots and per-stage buckets shown by the reports.
//! Nothing here performs I/O or knows about caching.

use crate::models::{
    Deal, DealSummary, DetailSummary, FunnelRow, FunnelSummary, Pipeline, PipelineRow,
    PivotCell, RatingStage, Stage, StageBucket, StageCatalogRow, StageMemberRow, StageRow,
    TeamPivotCell, UserDealCount, UserPerformance,
};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::trace;

/// Team selector that disables team filtering.
pub const ALL_TEAMS: &str = "All";

/// Team name to member display names.
pub type TeamRoster = BTreeMap<String, Vec<String>>;

/// Count deals per rating stage, in canonical funnel order.
///
/// Stages without deals are omitted.
pub fn classify_by_rating(deals: &[Deal]) -> Vec<FunnelRow> {
    let mut counts: HashMap<RatingStage, usize> = HashMap::new();

    for deal in deals {
        *counts
            .entry(RatingStage::from_rating(deal.rating))
            .or_default() += 1;
    }

    RatingStage::ALL
        .iter()
        .filter_map(|stage| {
            counts.get(stage).map(|&count| FunnelRow {
                stage: stage.to_string(),
                count,
            })
        })
        .collect()
}

/// Keep only the deals owned by members of `team`.
///
/// [`ALL_TEAMS`] or a team missing from the roster returns the input as is.
pub fn classify_by_team(deals: &[Deal], team: &str, roster: &TeamRoster) -> Vec<Deal> {
    if team == ALL_TEAMS {
        return deals.to_vec();
    }
    let Some(members) = roster.get(team) else {
        return deals.to_vec();
    };

    let members: HashSet<&str> = members.iter().map(|m| m.trim()).collect();

    deals
        .iter()
        .filter(|deal| deal.owner().is_some_and(|owner| members.contains(owner)))
        .cloned()
        .collect()
}

/// Team filter followed by the rating funnel.
pub fn funnel_view(deals: &[Deal], team: &str, roster: &TeamRoster) -> Vec<FunnelRow> {
    let filtered = classify_by_team(deals, team, roster);
    classify_by_rating(&filtered)
}

/// Headline numbers for a rating funnel.
pub fn summarize_funnel(rows: &[FunnelRow]) -> FunnelSummary {
    let total_deals: usize = rows.iter().map(|r| r.count).sum();
    let active_stages = rows.len();

    let conversion_rate = match (rows.first(), rows.last()) {
        (Some(first), Some(last)) if rows.len() > 1 && first.count > 0 => {
            Some(last.count as f64 / first.count as f64 * 100.0)
        }
        _ => None,
    };

    let average_per_stage = if active_stages > 0 {
        total_deals as f64 / active_stages as f64
    } else {
        0.0
    };

    FunnelSummary {
        total_deals,
        active_stages,
        conversion_rate,
        average_per_stage,
    }
}

/// Distinct trimmed owner names, sorted.
pub fn distinct_users(deals: &[Deal]) -> Vec<String> {
    let users: BTreeSet<&str> = deals.iter().filter_map(Deal::owner).collect();
    users.into_iter().map(String::from).collect()
}

/// The seed ordering (deduplicated) followed by unseen stage labels in
/// first-encountered order.
pub fn effective_stage_order(seed: &[String], deals: &[Deal]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut order = Vec::new();

    let labels = seed
        .iter()
        .map(String::as_str)
        .chain(deals.iter().map(Deal::stage_label));

    for label in labels {
        if seen.insert(label) {
            order.push(label.to_string());
        }
    }

    order
}

/// Dense owner × stage grid of deal counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pivot {
    /// Row axis: owners, sorted.
    pub users: Vec<String>,
    /// Column axis: effective stage order.
    pub stages: Vec<String>,
    /// Row-major cells, one per (user, stage).
    pub cells: Vec<PivotCell>,
}

impl Pivot {
    /// Count for one (user, stage) pair.
    #[allow(dead_code)] // Lookup helper for callers holding a pivot
    pub fn count(&self, user: &str, stage: &str) -> Option<usize> {
        let row = self.users.iter().position(|u| u == user)?;
        let col = self.stages.iter().position(|s| s == stage)?;
        self.cells.get(row * self.stages.len() + col).map(|c| c.count)
    }
}

/// Build the dense user × stage pivot.
///
/// Deals without an owner are left out entirely.
pub fn build_pivot(deals: &[Deal], canonical_stage_order: &[String]) -> Pivot {
    let users = distinct_users(deals);
    let stages = effective_stage_order(canonical_stage_order, deals);

    let mut counts: HashMap<(&str, &str), usize> = HashMap::new();
    for deal in deals {
        if let Some(owner) = deal.owner() {
            *counts.entry((owner, deal.stage_label())).or_default() += 1;
        }
    }

    let mut cells = Vec::with_capacity(users.len() * stages.len());
    for user in &users {
        for stage in &stages {
            cells.push(PivotCell {
                user: user.clone(),
                stage: stage.clone(),
                count: counts
                    .get(&(user.as_str(), stage.as_str()))
                    .copied()
                    .unwrap_or(0),
            });
        }
    }

    Pivot {
        users,
        stages,
        cells,
    }
}

/// Dense team × stage grid of deal counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamPivot {
    pub teams: Vec<String>,
    pub stages: Vec<String>,
    pub cells: Vec<TeamPivotCell>,
}

/// Build the dense team × stage pivot from the roster.
pub fn build_team_pivot(
    deals: &[Deal],
    canonical_stage_order: &[String],
    roster: &TeamRoster,
) -> TeamPivot {
    let teams: Vec<String> = roster.keys().cloned().collect();
    let stages = effective_stage_order(canonical_stage_order, deals);

    let mut member_team: HashMap<&str, &str> = HashMap::new();
    for (team, members) in roster {
        for member in members {
            member_team.insert(member.trim(), team.as_str());
        }
    }

    let mut counts: HashMap<(&str, &str), usize> = HashMap::new();
    for deal in deals {
        let team = deal.owner().and_then(|owner| member_team.get(owner));
        if let Some(&team) = team {
            *counts.entry((team, deal.stage_label())).or_default() += 1;
        }
    }

    let mut cells = Vec::with_capacity(teams.len() * stages.len());
    for team in &teams {
        for stage in &stages {
            cells.push(TeamPivotCell {
                team: team.clone(),
                stage: stage.clone(),
                count: counts
                    .get(&(team.as_str(), stage.as_str()))
                    .copied()
                    .unwrap_or(0),
            });
        }
    }

    TeamPivot {
        teams,
        stages,
        cells,
    }
}

/// Deal counts per owner, busiest first.
pub fn deals_per_user(deals: &[Deal]) -> Vec<UserDealCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for owner in deals.iter().filter_map(Deal::owner) {
        *counts.entry(owner).or_default() += 1;
    }

    let mut rows: Vec<UserDealCount> = counts
        .into_iter()
        .map(|(user, deals)| UserDealCount {
            user: user.to_string(),
            deals,
        })
        .collect();

    // BTreeMap order breaks ties by name
    rows.sort_by_key(|row| std::cmp::Reverse(row.deals));
    rows
}

/// Deals bucketed under the known stages of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageDetail {
    /// Buckets keyed by stage id.
    pub buckets: BTreeMap<String, StageBucket>,
    /// Deals dropped because their stage id is unknown.
    pub unmatched: usize,
}

impl StageDetail {
    /// Buckets ordered by stage order, then name.
    pub fn ordered(&self) -> Vec<&StageBucket> {
        let mut buckets: Vec<&StageBucket> = self.buckets.values().collect();
        buckets.sort_by(|a, b| {
            a.order_index
                .cmp(&b.order_index)
                .then_with(|| a.name.cmp(&b.name))
        });
        buckets
    }

    /// Distinct owners of the bucketed deals, sorted.
    pub fn users(&self) -> Vec<String> {
        let users: BTreeSet<&str> = self
            .buckets
            .values()
            .flat_map(|b| b.deals.iter().map(|d| d.user.as_str()))
            .collect();
        users.into_iter().map(String::from).collect()
    }

    /// Same buckets restricted to one owner's deals.
    ///
    /// Every bucket shell is kept, even when the owner has no deal in it.
    pub fn for_user(&self, user: &str) -> StageDetail {
        let user = user.trim();
        let mut buckets = self.buckets.clone();

        for bucket in buckets.values_mut() {
            bucket.deals.retain(|d| d.user == user);
            bucket.refresh_totals();
        }

        StageDetail {
            buckets,
            unmatched: self.unmatched,
        }
    }

    /// Overall totals across all buckets.
    pub fn summary(&self) -> DetailSummary {
        let total_deals: usize = self.buckets.values().map(|b| b.count).sum();
        let total_value: f64 = self.buckets.values().map(|b| b.total_value).sum();

        DetailSummary {
            total_deals,
            total_value,
            average_value: if total_deals > 0 {
                total_value / total_deals as f64
            } else {
                0.0
            },
            unmatched_deals: self.unmatched,
        }
    }

    /// Flat table rows, in stage order.
    pub fn rows(&self) -> Vec<StageRow> {
        self.ordered().into_iter().map(StageRow::from).collect()
    }

    /// Flat drill-down rows, in stage order.
    pub fn member_rows(&self) -> Vec<StageMemberRow> {
        self.ordered()
            .into_iter()
            .flat_map(|bucket| {
                bucket.deals.iter().map(move |deal| StageMemberRow {
                    stage: bucket.name.clone(),
                    id: deal.id.clone(),
                    name: deal.name.clone(),
                    value: deal.value,
                    user: deal.user.clone(),
                    created_at: deal.created_at.clone(),
                })
            })
            .collect()
    }
}

/// Bucket deals under the known stages by stage id.
///
/// Deals whose stage id is missing or not among `stages` are dropped and
/// only counted in [`StageDetail::unmatched`].
pub fn build_stage_detail(deals: &[Deal], stages: &[Stage]) -> StageDetail {
    let mut buckets: BTreeMap<String, StageBucket> = stages
        .iter()
        .map(|stage| (stage.id.clone(), StageBucket::empty(stage)))
        .collect();

    let mut unmatched = 0;
    for deal in deals {
        let bucket = deal
            .stage_id
            .as_deref()
            .and_then(|id| buckets.get_mut(id));

        match bucket {
            Some(bucket) => bucket.push(DealSummary::from(deal)),
            None => {
                trace!("Dropping deal {:?}: unknown stage {:?}", deal.id, deal.stage_id);
                unmatched += 1;
            }
        }
    }

    for bucket in buckets.values_mut() {
        bucket.finish();
    }

    StageDetail { buckets, unmatched }
}

/// Per-owner totals across a stage detail, highest total value first.
pub fn user_performance(detail: &StageDetail) -> Vec<UserPerformance> {
    #[derive(Default)]
    struct Totals<'a> {
        deals: usize,
        value: f64,
        stages: BTreeSet<&'a str>,
    }

    let mut per_user: BTreeMap<&str, Totals> = BTreeMap::new();
    for bucket in detail.buckets.values() {
        for deal in &bucket.deals {
            let totals = per_user.entry(deal.user.as_str()).or_default();
            totals.deals += 1;
            totals.value += deal.value;
            totals.stages.insert(bucket.name.as_str());
        }
    }

    let mut rows: Vec<UserPerformance> = per_user
        .into_iter()
        .map(|(user, totals)| UserPerformance {
            user: user.to_string(),
            total_deals: totals.deals,
            total_value: totals.value,
            average_value: if totals.deals > 0 {
                totals.value / totals.deals as f64
            } else {
                0.0
            },
            active_stages: totals.stages.len(),
            stages: totals.stages.into_iter().collect::<Vec<_>>().join(", "),
        })
        .collect();

    rows.sort_by(|a, b| {
        b.total_value
            .partial_cmp(&a.total_value)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.user.cmp(&b.user))
    });

    rows
}

/// Truncate `text` to `max_chars` characters, appending "...".
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Flat rows describing stage definitions.
pub fn stage_catalog(stages: &[Stage]) -> Vec<StageCatalogRow> {
    stages
        .iter()
        .map(|stage| {
            let pipeline = stage.pipeline.as_ref();
            StageCatalogRow {
                name: stage.name.clone(),
                nickname: if stage.nickname.is_empty() {
                    "N/A".to_string()
                } else {
                    stage.nickname.clone()
                },
                id: stage.id.clone(),
                order: stage.order,
                pipeline: pipeline.map_or_else(|| "N/A".to_string(), |p| p.name.clone()),
                pipeline_id: pipeline.map_or_else(|| "N/A".to_string(), |p| p.id.clone()),
                objective: stage
                    .objective
                    .as_deref()
                    .map_or_else(|| "N/A".to_string(), |o| truncate_text(o, 50)),
            }
        })
        .collect()
}

/// Flat rows describing pipelines.
pub fn pipeline_rows(pipelines: &[Pipeline]) -> Vec<PipelineRow> {
    pipelines
        .iter()
        .map(|p| PipelineRow {
            id: p.id.clone(),
            name: p.name.clone(),
            stages: p.stages.len(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PipelineRef, NO_STAGE, NO_USER};

    fn rated(rating: Option<i64>) -> Deal {
        Deal {
            rating,
            ..Default::default()
        }
    }

    fn owned(user: &str, stage: Option<&str>) -> Deal {
        Deal {
            user: Some(user.to_string()),
            stage_name: stage.map(String::from),
            ..Default::default()
        }
    }

    fn staged(id: &str, stage_id: Option<&str>, value: f64, user: Option<&str>) -> Deal {
        Deal {
            id: id.to_string(),
            name: format!("Deal {}", id),
            value,
            user: user.map(String::from),
            stage_id: stage_id.map(String::from),
            ..Default::default()
        }
    }

    fn stage(id: &str, name: &str, order: i64) -> Stage {
        Stage {
            id: id.to_string(),
            name: name.to_string(),
            order,
            ..Default::default()
        }
    }

    fn roster() -> TeamRoster {
        let mut roster = TeamRoster::new();
        roster.insert("Fenix".to_string(), vec!["Paola".to_string()]);
        roster.insert("Bulls".to_string(), vec!["Maria ".to_string()]);
        roster
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_classify_by_rating_scenario() {
        let deals = vec![rated(Some(1)), rated(Some(1)), rated(Some(3)), rated(Some(9))];

        let rows = classify_by_rating(&deals);

        assert_eq!(
            rows,
            vec![
                FunnelRow { stage: "Leads".to_string(), count: 2 },
                FunnelRow { stage: "SQL".to_string(), count: 1 },
                FunnelRow { stage: "In Progress".to_string(), count: 1 },
            ]
        );
    }

    #[test]
    fn test_classify_by_rating_covers_every_deal() {
        let deals: Vec<Deal> = [None, Some(0), Some(1), Some(2), Some(3), Some(4), Some(5), Some(6), Some(-1)]
            .into_iter()
            .map(rated)
            .collect();

        let rows = classify_by_rating(&deals);
        let total: usize = rows.iter().map(|r| r.count).sum();

        assert_eq!(total, deals.len());
        assert_eq!(rows.last().map(|r| r.count), Some(4));
        assert!(classify_by_rating(&[]).is_empty());
    }

    #[test]
    fn test_classify_by_team_all_is_identity() {
        let deals = vec![owned("Paola", None), owned("Zed", None), Deal::default()];

        assert_eq!(classify_by_team(&deals, ALL_TEAMS, &roster()), deals);
        assert_eq!(classify_by_team(&deals, "Unknown Team", &roster()), deals);
    }

    #[test]
    fn test_classify_by_team_trims_names() {
        let deals = vec![
            owned("Maria", None),
            owned("  Maria ", None),
            owned("maria", None),
            owned("Paola", None),
            Deal::default(),
        ];

        let bulls = classify_by_team(&deals, "Bulls", &roster());

        assert_eq!(bulls.len(), 2);
        assert!(bulls.iter().all(|d| d.owner() == Some("Maria")));
    }

    #[test]
    fn test_team_filter_runs_before_rating() {
        let mut deals = vec![owned("Paola", None), owned("Maria", None)];
        deals[0].rating = Some(1);
        deals[1].rating = Some(2);

        let rows = funnel_view(&deals, "Fenix", &roster());

        assert_eq!(rows, vec![FunnelRow { stage: "Leads".to_string(), count: 1 }]);
    }

    #[test]
    fn test_summarize_funnel() {
        let rows = vec![
            FunnelRow { stage: "Leads".to_string(), count: 8 },
            FunnelRow { stage: "SQL".to_string(), count: 4 },
            FunnelRow { stage: "In Progress".to_string(), count: 2 },
        ];

        let summary = summarize_funnel(&rows);

        assert_eq!(summary.total_deals, 14);
        assert_eq!(summary.active_stages, 3);
        assert_eq!(summary.conversion_rate, Some(25.0));
        assert!((summary.average_per_stage - 14.0 / 3.0).abs() < 1e-9);

        let single = summarize_funnel(&rows[..1]);
        assert_eq!(single.conversion_rate, None);
        assert_eq!(summarize_funnel(&[]), FunnelSummary::default());
    }

    #[test]
    fn test_build_pivot_scenario() {
        let deals = vec![
            owned("Ann ", Some("X")),
            owned("Ann", Some("Y")),
            owned("Bob", Some("X")),
        ];

        let pivot = build_pivot(&deals, &strings(&["X", "Y"]));

        assert_eq!(pivot.users, strings(&["Ann", "Bob"]));
        assert_eq!(pivot.stages, strings(&["X", "Y"]));
        assert_eq!(pivot.count("Ann", "X"), Some(1));
        assert_eq!(pivot.count("Ann", "Y"), Some(1));
        assert_eq!(pivot.count("Bob", "X"), Some(1));
        assert_eq!(pivot.count("Bob", "Y"), Some(0));

        let order: Vec<(&str, &str)> = pivot
            .cells
            .iter()
            .map(|c| (c.user.as_str(), c.stage.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![("Ann", "X"), ("Ann", "Y"), ("Bob", "X"), ("Bob", "Y")]
        );
    }

    #[test]
    fn test_build_pivot_is_dense() {
        let deals = vec![
            owned("Cid", Some("Z")),
            owned("Ann", None),
            owned("  ", Some("X")),
            Deal {
                stage_name: Some("W".to_string()),
                ..Default::default()
            },
        ];

        let pivot = build_pivot(&deals, &strings(&["X", "Y", "X"]));

        assert_eq!(pivot.users, strings(&["Ann", "Cid"]));
        assert_eq!(pivot.stages, strings(&["X", "Y", "Z", NO_STAGE, "W"]));
        assert_eq!(pivot.cells.len(), pivot.users.len() * pivot.stages.len());
        assert_eq!(pivot.count("Ann", NO_STAGE), Some(1));
        assert_eq!(pivot.count("Cid", "Z"), Some(1));

        let counted: usize = pivot.cells.iter().map(|c| c.count).sum();
        assert_eq!(counted, 2);

        let unique: HashSet<(&str, &str)> = pivot
            .cells
            .iter()
            .map(|c| (c.user.as_str(), c.stage.as_str()))
            .collect();
        assert_eq!(unique.len(), pivot.cells.len());
    }

    #[test]
    fn test_build_pivot_is_idempotent() {
        let deals = vec![owned("Bob", Some("B")), owned("Ann", Some("A")), owned("Bob", Some("C"))];
        let seed = strings(&["A"]);

        let first = build_pivot(&deals, &seed);
        let second = build_pivot(&deals, &seed);

        assert_eq!(first, second);
        assert_eq!(first.stages, strings(&["A", "B", "C"]));
    }

    #[test]
    fn test_build_team_pivot() {
        let deals = vec![
            owned("Paola", Some("X")),
            owned("Maria", Some("X")),
            owned("Maria", Some("Y")),
            owned("Outsider", Some("Q")),
        ];

        let pivot = build_team_pivot(&deals, &strings(&["X", "Y"]), &roster());

        assert_eq!(pivot.teams, strings(&["Bulls", "Fenix"]));
        assert_eq!(pivot.stages, strings(&["X", "Y", "Q"]));
        assert_eq!(pivot.cells.len(), 6);

        let count = |team: &str, stage: &str| {
            pivot
                .cells
                .iter()
                .find(|c| c.team == team && c.stage == stage)
                .map(|c| c.count)
        };
        assert_eq!(count("Bulls", "X"), Some(1));
        assert_eq!(count("Bulls", "Y"), Some(1));
        assert_eq!(count("Fenix", "X"), Some(1));
        assert_eq!(count("Fenix", "Q"), Some(0));
    }

    #[test]
    fn test_deals_per_user_ordering() {
        let deals = vec![
            owned("Bob", None),
            owned("Ann", None),
            owned("Cid", None),
            owned("Cid", None),
            Deal::default(),
        ];

        let rows = deals_per_user(&deals);
        let users: Vec<&str> = rows.iter().map(|r| r.user.as_str()).collect();

        assert_eq!(users, vec!["Cid", "Ann", "Bob"]);
        assert_eq!(rows[0].deals, 2);
    }

    #[test]
    fn test_build_stage_detail_counts_and_values() {
        let stages = vec![stage("s1", "LEADs", 1), stage("s2", "FOLLOW UP", 2)];
        let deals = vec![
            staged("1", Some("s1"), 100.0, Some("Ann")),
            staged("2", Some("s1"), 250.5, Some("Bob")),
            staged("3", Some("s2"), 0.0, None),
        ];

        let detail = build_stage_detail(&deals, &stages);

        let s1 = &detail.buckets["s1"];
        assert_eq!(s1.count, 2);
        assert_eq!(s1.total_value, 350.5);
        assert_eq!(s1.average_value, 175.25);

        let s2 = &detail.buckets["s2"];
        assert_eq!(s2.count, 1);
        assert_eq!(s2.deals[0].user, NO_USER);
    }

    #[test]
    fn test_missing_value_counts_as_zero() {
        let stages = vec![stage("s1", "A", 1)];
        let deal: Deal = serde_json::from_value(serde_json::json!({
            "id": "d1",
            "deal_stage": {"id": "s1", "name": "A"}
        }))
        .unwrap();

        let detail = build_stage_detail(&[deal], &stages);

        assert_eq!(detail.buckets["s1"].count, 1);
        assert_eq!(detail.buckets["s1"].total_value, 0.0);
    }

    #[test]
    fn test_non_finite_value_keeps_totals_finite() {
        let stages = vec![stage("s1", "A", 1)];
        let deals: Vec<Deal> = serde_json::from_value(serde_json::json!([
            {"id": "d1", "value": "NaN", "deal_stage": {"id": "s1"}},
            {"id": "d2", "value": 100, "deal_stage": {"id": "s1"}}
        ]))
        .unwrap();

        let detail = build_stage_detail(&deals, &stages);

        assert_eq!(detail.buckets["s1"].total_value, 100.0);
        assert_eq!(detail.buckets["s1"].average_value, 50.0);
        assert_eq!(detail.summary().total_value, 100.0);
    }

    #[test]
    fn test_unknown_stage_ids_are_dropped() {
        let stages = vec![stage("s1", "A", 1)];
        let deals = vec![
            staged("1", Some("s1"), 10.0, None),
            staged("2", Some("ghost"), 99.0, None),
            staged("3", None, 5.0, None),
        ];

        let detail = build_stage_detail(&deals, &stages);

        assert_eq!(detail.buckets.len(), 1);
        assert!(!detail.buckets.contains_key("ghost"));
        assert_eq!(detail.unmatched, 2);
        assert_eq!(detail.summary().total_deals, 1);
        assert_eq!(detail.summary().total_value, 10.0);
    }

    #[test]
    fn test_stage_detail_conserves_value() {
        let stages = vec![stage("a", "A", 2), stage("b", "B", 1), stage("c", "C", 3)];
        let deals = vec![
            staged("1", Some("a"), 12.5, None),
            staged("2", Some("b"), 7.5, None),
            staged("3", Some("b"), 30.0, None),
            staged("4", Some("zzz"), 1000.0, None),
        ];

        let detail = build_stage_detail(&deals, &stages);
        let bucketed: f64 = detail.buckets.values().map(|b| b.total_value).sum();

        assert_eq!(bucketed, 50.0);
        assert_eq!(detail.buckets["c"].average_value, 0.0);

        let names: Vec<&str> = detail.ordered().iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_stage_detail_for_user_keeps_shells() {
        let stages = vec![stage("s1", "A", 1), stage("s2", "B", 2)];
        let deals = vec![
            staged("1", Some("s1"), 100.0, Some("Ann")),
            staged("2", Some("s1"), 50.0, Some("Bob")),
            staged("3", Some("s2"), 70.0, Some("Bob")),
        ];
        let detail = build_stage_detail(&deals, &stages);

        let ann = detail.for_user("Ann ");

        assert_eq!(ann.buckets.len(), 2);
        assert_eq!(ann.buckets["s1"].count, 1);
        assert_eq!(ann.buckets["s1"].total_value, 100.0);
        assert_eq!(ann.buckets["s2"].count, 0);
        assert_eq!(ann.buckets["s2"].average_value, 0.0);
        assert_eq!(detail.users(), strings(&["Ann", "Bob"]));
        assert_eq!(detail.buckets["s1"].count, 2);
    }

    #[test]
    fn test_stage_detail_flat_rows() {
        let stages = vec![stage("s2", "B", 2), stage("s1", "A", 1)];
        let deals = vec![
            staged("1", Some("s2"), 1.0, Some("Ann")),
            staged("2", Some("s1"), 2.0, Some("Bob")),
        ];
        let detail = build_stage_detail(&deals, &stages);

        let rows = detail.rows();
        assert_eq!(rows[0].stage, "A");
        assert_eq!(rows[1].stage_id, "s2");

        let members = detail.member_rows();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].stage, "A");
        assert_eq!(members[0].user, "Bob");
    }

    #[test]
    fn test_user_performance() {
        let stages = vec![stage("s1", "A", 1), stage("s2", "B", 2)];
        let deals = vec![
            staged("1", Some("s1"), 100.0, Some("Ann")),
            staged("2", Some("s2"), 300.0, Some("Ann")),
            staged("3", Some("s1"), 500.0, Some("Bob")),
        ];
        let detail = build_stage_detail(&deals, &stages);

        let rows = user_performance(&detail);

        assert_eq!(rows[0].user, "Bob");
        assert_eq!(rows[1].user, "Ann");
        assert_eq!(rows[1].total_deals, 2);
        assert_eq!(rows[1].average_value, 200.0);
        assert_eq!(rows[1].active_stages, 2);
        assert_eq!(rows[1].stages, "A, B");
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 50), "short");
        assert_eq!(truncate_text("ligação completa", 7), "ligação...");
    }

    #[test]
    fn test_stage_catalog() {
        let mut with_pipeline = stage("s1", "LEADs", 1);
        with_pipeline.pipeline = Some(PipelineRef {
            id: "p1".to_string(),
            name: "House".to_string(),
        });
        with_pipeline.objective = Some("x".repeat(60));

        let rows = stage_catalog(&[with_pipeline, stage("s2", "B", 2)]);

        assert_eq!(rows[0].pipeline, "House");
        assert_eq!(rows[0].objective.chars().count(), 53);
        assert_eq!(rows[1].nickname, "N/A");
        assert_eq!(rows[1].pipeline_id, "N/A");
        assert_eq!(rows[1].objective, "N/A");
    }

    #[test]
    fn test_pipeline_rows() {
        let pipelines = vec![Pipeline {
            id: "p1".to_string(),
            name: "House".to_string(),
            stages: vec![stage("s1", "A", 1)],
        }];

        assert_eq!(
            pipeline_rows(&pipelines),
            vec![PipelineRow {
                id: "p1".to_string(),
                name: "House".to_string(),
                stages: 1
            }]
        );
    }
}
