use std::future::Future;

use tokio::time::timeout;
use tracing::info;

use crate::{
    dto::league::{AdjustmentRequest, AdjustmentResponse, LeagueView, QuotesResponse, TeamQuote},
    error::ServiceError,
    services::sync_service::AdjustmentReply,
    state::{
        SharedState,
        league::{League, coerce_stroke_input},
    },
};

/// Render the current league revision together with the sync status.
pub fn league_view(state: &SharedState) -> LeagueView {
    view_of(state, &state.sync().league())
}

fn view_of(state: &SharedState, league: &League) -> LeagueView {
    let config = state.config();
    LeagueView::build(
        league,
        &state.sync().status(),
        config.pars(),
        config.leaderboard(),
    )
}

/// Live prices of the adjustment buttons for `acting`.
pub fn quotes(state: &SharedState, acting: usize) -> Result<QuotesResponse, ServiceError> {
    let league = state.sync().league();
    let policy = state.config().cost_policy();

    let quotes = league
        .teams()
        .iter()
        .enumerate()
        .map(|(target, team)| {
            let add_cost = league.quote(target, acting, &policy)?;
            Ok(TeamQuote {
                index: target,
                name: team.name.clone(),
                add_cost,
                remove_cost: (target == acting).then_some(add_cost),
            })
        })
        .collect::<Result<Vec<_>, ServiceError>>()?;

    Ok(QuotesResponse { acting, quotes })
}

/// Store the strokes typed into one score cell.
pub async fn record_score(
    state: &SharedState,
    team: usize,
    hole: usize,
    raw: &str,
) -> Result<LeagueView, ServiceError> {
    let value = coerce_stroke_input(raw);
    let league = with_timeout(state, state.sync().record_score(team, hole, value)).await?;
    info!(team, hole, value, "score recorded");
    Ok(view_of(state, &league))
}

/// Buy a confirmed adjustment. Requests the league refuses come back with
/// `applied: false` and the current league.
pub async fn record_adjustment(
    state: &SharedState,
    request: AdjustmentRequest,
) -> Result<AdjustmentResponse, ServiceError> {
    if !request.confirmed {
        return Err(ServiceError::InvalidInput(
            "adjustment must be confirmed".into(),
        ));
    }

    let reply = with_timeout(
        state,
        state
            .sync()
            .record_adjustment(request.target, request.amount, request.acting),
    )
    .await?;

    Ok(match reply {
        AdjustmentReply::Applied {
            league,
            transaction,
        } => AdjustmentResponse {
            applied: true,
            reason: None,
            transaction: Some((&transaction).into()),
            league: view_of(state, &league),
        },
        AdjustmentReply::Rejected(rejection) => AdjustmentResponse {
            applied: false,
            reason: Some(rejection.into()),
            transaction: None,
            league: league_view(state),
        },
    })
}

async fn with_timeout<T, Fut>(state: &SharedState, work: Fut) -> Result<T, ServiceError>
where
    Fut: Future<Output = Result<T, ServiceError>>,
{
    match state.command_timeout() {
        Some(limit) => timeout(limit, work)
            .await
            .map_err(|_| ServiceError::Timeout)?,
        None => work.await,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::document_store::memory::MemoryDocumentStore,
        dto::league::RejectionReason,
        services::sync_service::{Backoff, SyncController},
        state::{AppState, cost::Money, sync_machine::SyncPhase},
    };

    /// Application state backed by a fresh memory store, already synced.
    pub(crate) async fn synced_state() -> (SharedState, MemoryDocumentStore) {
        let config = AppConfig::default();
        let settings = config.sync_settings().with_backoff(Backoff {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(40),
        });
        let handle = SyncController::spawn(settings).unwrap();
        let store = MemoryDocumentStore::new();
        handle.install_store(Arc::new(store.clone())).await.unwrap();

        let mut status = handle.watch_status();
        tokio::time::timeout(
            Duration::from_secs(2),
            status.wait_for(|status| status.phase == SyncPhase::Synced),
        )
        .await
        .unwrap()
        .unwrap();

        let state = AppState::new(config, handle);
        state.update_degraded(false);
        (state, store)
    }

    fn adjustment(target: usize, amount: i32, acting: usize) -> AdjustmentRequest {
        AdjustmentRequest {
            target,
            amount,
            acting,
            confirmed: true,
        }
    }

    #[tokio::test]
    async fn score_entry_is_coerced() {
        let (state, _store) = synced_state().await;

        let view = record_score(&state, 0, 0, "5").await.unwrap();
        assert_eq!(view.teams[0].strokes[0], 5);
        assert_eq!(view.teams[0].relative_display, "+1");

        let view = record_score(&state, 0, 0, "abc").await.unwrap();
        assert_eq!(view.teams[0].strokes[0], 0);
        assert_eq!(view.teams[0].relative_display, "E");
    }

    #[tokio::test]
    async fn quoted_cost_matches_recorded_cost() {
        let (state, _store) = synced_state().await;

        let before = quotes(&state, 2).unwrap();
        assert_eq!(before.quotes[2].add_cost, Money::from_cents(500));
        assert_eq!(before.quotes[2].remove_cost, Some(Money::from_cents(500)));
        assert_eq!(before.quotes[5].remove_cost, None);

        let response = record_adjustment(&state, adjustment(2, -1, 2))
            .await
            .unwrap();
        assert!(response.applied);
        assert_eq!(
            response.transaction.unwrap().cost,
            before.quotes[2].remove_cost.unwrap()
        );
        assert_eq!(response.league.teams[2].adjustments, -1);

        let after = quotes(&state, 2).unwrap();
        assert_eq!(after.quotes[7].add_cost, Money::from_cents(875));
    }

    #[tokio::test]
    async fn opponent_removal_is_reported_not_applied() {
        let (state, _store) = synced_state().await;

        let response = record_adjustment(&state, adjustment(4, -1, 0))
            .await
            .unwrap();
        assert!(!response.applied);
        assert_eq!(response.reason, Some(RejectionReason::OpponentRemoval));
        assert!(response.league.teams[0].transactions.is_empty());
        assert_eq!(response.league.pot, Money::ZERO);
    }

    #[tokio::test]
    async fn unconfirmed_adjustment_is_refused() {
        let (state, _store) = synced_state().await;
        let mut request = adjustment(1, 1, 1);
        request.confirmed = false;

        let err = record_adjustment(&state, request).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn unknown_acting_team_is_not_found() {
        let (state, _store) = synced_state().await;
        assert!(matches!(
            quotes(&state, 12),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn commands_are_refused_before_load() {
        let config = AppConfig::default();
        let handle = SyncController::spawn(config.sync_settings()).unwrap();
        let state = AppState::with_command_timeout(config, handle, Some(Duration::from_millis(50)));

        let err = record_score(&state, 0, 0, "4").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }
}
