use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post, put},
};
use axum_valid::Valid;

use crate::{
    dto::league::{
        AdjustmentRequest, AdjustmentResponse, LeagueView, QuotesQuery, QuotesResponse,
        ScoreEntryRequest,
    },
    error::AppError,
    services::league_service,
    state::SharedState,
};

/// League endpoints used by the scoreboard frontend.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/league", get(get_league))
        .route("/league/quotes", get(get_quotes))
        .route("/league/teams/{team}/holes/{hole}", put(record_score))
        .route("/league/adjustments", post(record_adjustment))
}

/// Current league: scorecards, leaderboard, pot and sync status.
#[utoipa::path(
    get,
    path = "/league",
    tag = "league",
    responses((status = 200, description = "Current league", body = LeagueView))
)]
/// Current league with totals, leaderboard and pot.
pub async fn get_league(State(state): State<SharedState>) -> Json<LeagueView> {
    Json(league_service::league_view(&state))
}

/// Prices of the `+1` / `-1` buttons for the acting team.
#[utoipa::path(
    get,
    path = "/league/quotes",
    tag = "league",
    params(QuotesQuery),
    responses(
        (status = 200, description = "Adjustment prices", body = QuotesResponse),
        (status = 404, description = "Unknown acting team")
    )
)]
/// Adjustment prices for the acting team.
pub async fn get_quotes(
    State(state): State<SharedState>,
    Query(query): Query<QuotesQuery>,
) -> Result<Json<QuotesResponse>, AppError> {
    Ok(Json(league_service::quotes(&state, query.acting)?))
}

#[utoipa::path(
    put,
    path = "/league/teams/{team}/holes/{hole}",
    tag = "league",
    params(
        ("team" = usize, Path, description = "Roster index of the team (0-based)"),
        ("hole" = usize, Path, description = "Hole index (0-based)")
    ),
    request_body = ScoreEntryRequest,
    responses(
        (status = 200, description = "Score recorded", body = LeagueView),
        (status = 404, description = "Unknown team or hole"),
        (status = 409, description = "League not loaded yet"),
        (status = 503, description = "Sync controller unavailable")
    )
)]
/// Store the raw content of one score cell.
pub async fn record_score(
    State(state): State<SharedState>,
    Path((team, hole)): Path<(usize, usize)>,
    Json(payload): Json<ScoreEntryRequest>,
) -> Result<Json<LeagueView>, AppError> {
    let view = league_service::record_score(&state, team, hole, &payload.value).await?;
    Ok(Json(view))
}

#[utoipa::path(
    post,
    path = "/league/adjustments",
    tag = "league",
    request_body = AdjustmentRequest,
    responses(
        (status = 200, description = "Adjustment processed; `applied` tells whether it was recorded", body = AdjustmentResponse),
        (status = 400, description = "Adjustment not confirmed"),
        (status = 404, description = "Unknown team"),
        (status = 409, description = "League not loaded yet")
    )
)]
/// Buy a stroke adjustment for the acting team.
pub async fn record_adjustment(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<AdjustmentRequest>>,
) -> Result<Json<AdjustmentResponse>, AppError> {
    let response = league_service::record_adjustment(&state, payload).await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, response::IntoResponse};

    use super::*;
    use crate::{
        services::league_service::tests::synced_state,
        state::{cost::Money, sync_machine::SyncPhase},
    };

    #[tokio::test]
    async fn get_league_lists_the_roster() {
        let (state, _store) = synced_state().await;

        let Json(view) = get_league(State(state)).await;

        assert_eq!(view.teams.len(), 12);
        assert_eq!(view.teams[0].name, "AirPumpBulges LLC");
        assert_eq!(view.sync.phase, SyncPhase::Synced);
        assert_eq!(view.pot, Money::ZERO);
    }

    #[tokio::test]
    async fn score_entry_updates_the_cell() {
        let (state, store) = synced_state().await;

        let Json(view) = record_score(
            State(state),
            Path((1, 2)),
            Json(ScoreEntryRequest { value: "6".into() }),
        )
        .await
        .unwrap();

        assert_eq!(view.teams[1].strokes[2], 6);
        assert_eq!(view.teams[1].total_strokes, 6);
        assert!(store.peek("leagueState").is_some());
    }

    #[tokio::test]
    async fn unknown_hole_is_404() {
        let (state, _store) = synced_state().await;

        let err = record_score(
            State(state),
            Path((0, 18)),
            Json(ScoreEntryRequest { value: "4".into() }),
        )
        .await
        .unwrap_err();

        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn adjustment_reports_cost_and_pot() {
        let (state, _store) = synced_state().await;
        let request = AdjustmentRequest {
            target: 5,
            amount: 1,
            acting: 0,
            confirmed: true,
        };

        let Json(response) = record_adjustment(State(state.clone()), Valid(Json(request)))
            .await
            .unwrap();

        assert!(response.applied);
        assert_eq!(response.league.teams[5].adjustments, 1);
        assert_eq!(response.league.pot, Money::from_cents(500));

        let Json(quotes) = get_quotes(State(state), Query(QuotesQuery { acting: 0 }))
            .await
            .unwrap();
        assert_eq!(quotes.quotes[5].add_cost, Money::from_cents(875));
    }

    #[tokio::test]
    async fn quotes_for_unknown_team_are_404() {
        let (state, _store) = synced_state().await;

        let err = get_quotes(State(state), Query(QuotesQuery { acting: 40 }))
            .await
            .unwrap_err();

        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
