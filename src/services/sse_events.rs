use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    dto::{
        league::SyncStatusView,
        sse::{Handshake, LeagueUpdatedEvent, ServerEvent, SyncStatusEvent},
    },
    services::league_service,
    state::SharedState,
};

/// First event sent on every stream.
pub const EVENT_HANDSHAKE: &str = "handshake";
/// A new league revision.
pub const EVENT_LEAGUE_UPDATED: &str = "league.updated";
/// A new sync status.
pub const EVENT_SYNC_STATUS: &str = "sync.status";

/// Forward every league revision and sync status change published by the
/// sync controller onto the SSE hub. Stops once the controller is gone.
pub fn spawn_forwarder(state: SharedState) -> JoinHandle<()> {
    let mut league = state.sync().watch_league();
    let mut status = state.sync().watch_status();
    league.mark_unchanged();
    status.mark_unchanged();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = league.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    broadcast_league_updated(&state);
                }
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    broadcast_sync_status(&state);
                }
            }
        }

        debug!("SSE forwarder stopped");
    })
}

/// Broadcast the current league view.
pub fn broadcast_league_updated(state: &SharedState) {
    let payload = LeagueUpdatedEvent(league_service::league_view(state));
    send_event(state, EVENT_LEAGUE_UPDATED, &payload);
}

/// Broadcast the current sync status.
pub fn broadcast_sync_status(state: &SharedState) {
    let payload = SyncStatusEvent(SyncStatusView::from(&state.sync().status()));
    send_event(state, EVENT_SYNC_STATUS, &payload);
}

/// Events replayed to a stream when it connects, so clients render without
/// waiting for the next change.
pub fn initial_events(state: &SharedState) -> Vec<ServerEvent> {
    let handshake = Handshake {
        message: "league stream connected".into(),
        degraded: state.is_degraded(),
    };

    [
        encode(EVENT_HANDSHAKE, &handshake),
        encode(
            EVENT_SYNC_STATUS,
            &SyncStatusEvent(SyncStatusView::from(&state.sync().status())),
        ),
        encode(
            EVENT_LEAGUE_UPDATED,
            &LeagueUpdatedEvent(league_service::league_view(state)),
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn send_event<T: Serialize>(state: &SharedState, event: &str, payload: &T) {
    if let Some(event) = encode(event, payload) {
        state.sse().broadcast(event);
    }
}

fn encode<T: Serialize>(event: &str, payload: &T) -> Option<ServerEvent> {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(event, error = %err, "failed to serialise SSE payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::services::league_service::{self, tests::synced_state};

    #[tokio::test]
    async fn local_score_is_broadcast_as_league_update() {
        let (state, _store) = synced_state().await;
        let mut receiver = state.sse().subscribe();
        let forwarder = spawn_forwarder(state.clone());

        league_service::record_score(&state, 3, 0, "4").await.unwrap();

        let event = timeout(Duration::from_secs(2), async {
            loop {
                let event = receiver.recv().await.unwrap();
                if event.event.as_deref() == Some(EVENT_LEAGUE_UPDATED) {
                    break event;
                }
            }
        })
        .await
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&event.data).unwrap();
        assert_eq!(value["teams"][3]["strokes"][0], 4);
        forwarder.abort();
    }

    #[tokio::test]
    async fn initial_events_start_with_handshake() {
        let (state, _store) = synced_state().await;
        let events = initial_events(&state);

        let names = events
            .iter()
            .map(|event| event.event.as_deref().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            [EVENT_HANDSHAKE, EVENT_SYNC_STATUS, EVENT_LEAGUE_UPDATED]
        );
        assert!(events[0].data.contains(r#""degraded":false"#));
    }
}
