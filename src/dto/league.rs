//! DTO definitions used by the league REST API, the SSE stream and the
//! documentation layer.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    dto::{format_system_time, validation::validate_confirmed},
    services::sync_service::SyncStatus,
    state::{
        cost::Money,
        league::{AdjustmentRejection, League, Team, Transaction, TransactionKind},
        scoring::{self, LeaderboardEntry, LeaderboardMetric, ParTable},
        sync_machine::SyncPhase,
    },
};

/// Raw content of one score cell. Anything but one to three digits counts as `0`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ScoreEntryRequest {
    /// Text typed into the cell.
    #[schema(example = "4")]
    pub value: String,
}

/// Request to buy a stroke adjustment on behalf of the acting team.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AdjustmentRequest {
    /// Roster index of the team whose score changes.
    pub target: usize,
    /// Strokes to add (positive) or remove (negative, own team only).
    pub amount: i32,
    /// Roster index of the team paying for the adjustment.
    pub acting: usize,
    /// Mirrors the confirmation checkbox; must be `true`.
    #[validate(custom(function = "validate_confirmed"))]
    pub confirmed: bool,
}

/// Query string of `GET /league/quotes`.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct QuotesQuery {
    /// Roster index of the team that would pay.
    pub acting: usize,
}

/// Direction of a transaction as sent to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Strokes added to the target.
    Add,
    /// Strokes removed from the acting team.
    Remove,
}

impl From<TransactionKind> for TransactionType {
    fn from(value: TransactionKind) -> Self {
        match value {
            TransactionKind::Add => Self::Add,
            TransactionKind::Remove => Self::Remove,
        }
    }
}

/// One purchased adjustment as shown in a team's history.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionView {
    /// `add` or `remove`.
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// Strokes moved, always positive.
    pub amount: u32,
    /// Name of the team whose score changed.
    pub to: String,
    /// Price paid, in dollars.
    #[schema(value_type = f64, example = 5.0)]
    pub cost: Money,
}

impl From<&Transaction> for TransactionView {
    fn from(value: &Transaction) -> Self {
        Self {
            kind: value.kind.into(),
            amount: value.amount,
            to: value.to.clone(),
            cost: value.cost,
        }
    }
}

/// Scorecard of one team with its derived totals.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TeamView {
    /// Roster index.
    pub index: usize,
    /// Team name.
    pub name: String,
    /// Strokes per hole, `0` for holes not played yet.
    pub strokes: Vec<u32>,
    /// Net purchased strokes.
    pub adjustments: i64,
    /// Signed display of `adjustments`, e.g. `+2`.
    pub adjustments_display: String,
    /// Strokes played plus adjustments.
    pub total_strokes: i64,
    /// Score against par over played holes.
    pub relative_to_par: i64,
    /// `E`, `+N` or `-N`.
    pub relative_display: String,
    /// Adjustments bought by this team.
    pub transactions: Vec<TransactionView>,
}

impl TeamView {
    fn build(index: usize, team: &Team, pars: &ParTable) -> Self {
        let relative = scoring::relative_to_par(team, pars);
        Self {
            index,
            name: team.name.clone(),
            strokes: team.strokes.to_vec(),
            adjustments: team.adjustments,
            adjustments_display: scoring::format_adjustment(team.adjustments),
            total_strokes: scoring::total_strokes(team),
            relative_to_par: relative,
            relative_display: scoring::format_relative(relative),
            transactions: team.transactions.iter().map(Into::into).collect(),
        }
    }
}

/// One line of the leaderboard.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LeaderboardRow {
    /// 1-based position.
    pub rank: usize,
    /// Roster index of the team.
    pub index: usize,
    /// Team name.
    pub name: String,
    /// Strokes played plus adjustments.
    pub total_strokes: i64,
    /// Score against par over played holes.
    pub relative_to_par: i64,
    /// `E`, `+N` or `-N`.
    pub relative_display: String,
}

impl From<LeaderboardEntry> for LeaderboardRow {
    fn from(value: LeaderboardEntry) -> Self {
        Self {
            rank: value.rank,
            index: value.index,
            name: value.name,
            total_strokes: value.total_strokes,
            relative_display: scoring::format_relative(value.relative_to_par),
            relative_to_par: value.relative_to_par,
        }
    }
}

/// Sync status as exposed to the presentation layer.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SyncStatusView {
    /// Current sync phase.
    #[schema(value_type = String, example = "synced")]
    pub phase: SyncPhase,
    /// Incremented on every phase transition.
    pub version: usize,
    /// Message of the last store failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// RFC 3339 time of the last successful load, write or remote update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<String>,
    /// Whether a local revision is still waiting to be written.
    pub pending_writes: bool,
}

impl From<&SyncStatus> for SyncStatusView {
    fn from(value: &SyncStatus) -> Self {
        Self {
            phase: value.phase,
            version: value.version,
            last_error: value.last_error.clone(),
            last_synced_at: value.last_synced_at.map(format_system_time),
            pending_writes: value.pending_writes,
        }
    }
}

/// Everything the presentation layer renders.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LeagueView {
    /// Every team in roster order.
    pub teams: Vec<TeamView>,
    /// Metric used to rank the leaderboard.
    #[schema(value_type = String, example = "par_relative")]
    pub leaderboard_metric: LeaderboardMetric,
    /// Teams ranked by the metric.
    pub leaderboard: Vec<LeaderboardRow>,
    /// Sum of every transaction cost, in dollars.
    #[schema(value_type = f64, example = 34.06)]
    pub pot: Money,
    /// Synchronisation state of this client.
    pub sync: SyncStatusView,
}

impl LeagueView {
    /// Assemble the view of one league revision.
    pub fn build(
        league: &League,
        status: &SyncStatus,
        pars: &ParTable,
        metric: LeaderboardMetric,
    ) -> Self {
        Self {
            teams: league
                .teams()
                .iter()
                .enumerate()
                .map(|(index, team)| TeamView::build(index, team, pars))
                .collect(),
            leaderboard_metric: metric,
            leaderboard: scoring::leaderboard(league, metric, pars)
                .into_iter()
                .map(Into::into)
                .collect(),
            pot: scoring::pot(league),
            sync: status.into(),
        }
    }
}

/// Price of the `+1` / `-1` buttons shown next to one team.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TeamQuote {
    /// Roster index.
    pub index: usize,
    /// Team name.
    pub name: String,
    /// Cost of adding one stroke to this team.
    #[schema(value_type = f64)]
    pub add_cost: Money,
    /// Cost of removing one stroke; only offered on the acting team itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<f64>)]
    pub remove_cost: Option<Money>,
}

/// Adjustment prices for one acting team.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuotesResponse {
    /// Roster index of the paying team.
    pub acting: usize,
    /// One entry per team, in roster order.
    pub quotes: Vec<TeamQuote>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
/// Why an adjustment was not recorded.
pub enum RejectionReason {
    /// Strokes can only be removed from the acting team.
    OpponentRemoval,
    /// The amount was zero.
    ZeroAmount,
}

impl From<AdjustmentRejection> for RejectionReason {
    fn from(value: AdjustmentRejection) -> Self {
        match value {
            AdjustmentRejection::OpponentRemoval => Self::OpponentRemoval,
            AdjustmentRejection::ZeroAmount => Self::ZeroAmount,
        }
    }
}

/// Outcome of `POST /league/adjustments`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdjustmentResponse {
    /// Whether the transaction was recorded.
    pub applied: bool,
    /// Why nothing was recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectionReason>,
    /// The recorded transaction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionView>,
    /// League after the request.
    pub league: LeagueView,
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use serde_json::json;

    use super::*;
    use crate::state::{cost::CostPolicy, league::tests::league};

    fn status() -> SyncStatus {
        SyncStatus {
            phase: SyncPhase::Synced,
            version: 2,
            last_error: None,
            last_synced_at: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(60)),
            pending_writes: false,
        }
    }

    #[test]
    fn league_view_serialises_money_as_dollars() {
        let league = match league()
            .record_adjustment(3, 2, 0, &CostPolicy::STEEP)
            .unwrap()
        {
            crate::state::league::AdjustmentOutcome::Applied { league, .. } => league,
            other => panic!("unexpected outcome: {other:?}"),
        };

        let view = LeagueView::build(
            &league,
            &status(),
            &ParTable::default(),
            LeaderboardMetric::ParRelative,
        );
        let value = serde_json::to_value(&view).unwrap();

        assert_eq!(value["pot"], json!(5.0));
        assert_eq!(value["teams"][3]["adjustments_display"], json!("+2"));
        assert_eq!(
            value["teams"][0]["transactions"][0],
            json!({ "type": "add", "amount": 2, "to": "Team 4", "cost": 5.0 })
        );
        assert_eq!(value["sync"]["phase"], json!("synced"));
        assert_eq!(value["sync"]["last_synced_at"], json!("1970-01-01T00:01:00Z"));
        assert_eq!(value["leaderboard_metric"], json!("par_relative"));
        assert_eq!(value["leaderboard"].as_array().unwrap().len(), 12);
    }

    #[test]
    fn unconfirmed_adjustment_fails_validation() {
        let request: AdjustmentRequest = serde_json::from_value(json!({
            "target": 1, "amount": 1, "acting": 1, "confirmed": false
        }))
        .unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn remove_cost_is_omitted_when_absent() {
        let quote = TeamQuote {
            index: 1,
            name: "Team 2".into(),
            add_cost: Money::from_cents(500),
            remove_cost: None,
        };
        assert_eq!(
            serde_json::to_value(&quote).unwrap(),
            json!({ "index": 1, "name": "Team 2", "add_cost": 5.0 })
        );
    }
}
