use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report `degraded` while storage is unreachable or the league is not synced.
pub fn health_status(state: &SharedState) -> HealthResponse {
    let status = state.sync().status();

    if state.is_degraded() {
        match &status.last_error {
            Some(reason) => warn!(phase = ?status.phase, %reason, "league sync degraded"),
            None => warn!(phase = ?status.phase, "league sync degraded"),
        }
        HealthResponse::degraded(status.phase)
    } else {
        HealthResponse::ok(status.phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        services::{league_service::tests::synced_state, sync_service::SyncController},
        state::{AppState, sync_machine::SyncPhase},
    };

    #[tokio::test]
    async fn synced_league_is_healthy() {
        let (state, _store) = synced_state().await;
        let health = health_status(&state);
        assert_eq!(health.status, "ok");
        assert_eq!(health.sync_phase, SyncPhase::Synced);

        state.update_degraded(true);
        assert_eq!(health_status(&state).status, "degraded");
    }

    #[tokio::test]
    async fn league_without_store_is_degraded() {
        let config = AppConfig::default();
        let handle = SyncController::spawn(config.sync_settings()).unwrap();
        let state = AppState::new(config, handle);
        state.update_degraded(false);

        let health = health_status(&state);
        assert_eq!(health.status, "degraded");
        assert_eq!(health.sync_phase, SyncPhase::Uninitialized);
    }
}
