use serde::Serialize;
use utoipa::ToSchema;

use crate::state::sync_machine::SyncPhase;

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Sync phase of the league at the time of the check.
    #[schema(value_type = String, example = "synced")]
    pub sync_phase: SyncPhase,
}

impl HealthResponse {
    /// The storage backend is reachable and the league is in sync.
    pub fn ok(sync_phase: SyncPhase) -> Self {
        Self {
            status: "ok".to_string(),
            sync_phase,
        }
    }

    /// Storage unreachable or league not synced.
    pub fn degraded(sync_phase: SyncPhase) -> Self {
        Self {
            status: "degraded".to_string(),
            sync_phase,
        }
    }
}
