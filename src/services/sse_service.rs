use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{dto::sse::ServerEvent, services::sse_events, state::SharedState};

/// Subscribe to the league SSE stream, returning the connection id, the
/// events to replay first and the live receiver.
pub fn subscribe_league(
    state: &SharedState,
) -> (Uuid, Vec<ServerEvent>, broadcast::Receiver<ServerEvent>) {
    // Subscribe before rendering the snapshot so no revision falls in between.
    let receiver = state.sse().subscribe();
    let initial = sse_events::initial_events(state);
    (Uuid::new_v4(), initial, receiver)
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

/// Convert a broadcast receiver into an SSE response, replaying `initial`
/// first and cleaning up once the client disconnects.
pub fn to_sse_stream(
    connection_id: Uuid,
    initial: Vec<ServerEvent>,
    mut receiver: broadcast::Receiver<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        for payload in initial {
            if tx.send(Ok(to_event(payload))).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            // Every event carries a full snapshot; the next one catches up.
                            debug!(%connection_id, skipped, "league SSE stream lagged");
                            continue;
                        }
                    }
                }
            }
        }

        info!(%connection_id, "league SSE stream disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{league_service::tests::synced_state, sse_events::EVENT_HANDSHAKE};

    #[tokio::test]
    async fn subscription_replays_current_state() {
        let (state, _store) = synced_state().await;
        let before = state.sse().subscriber_count();

        let (_id, initial, _receiver) = subscribe_league(&state);

        assert_eq!(state.sse().subscriber_count(), before + 1);
        assert_eq!(initial[0].event.as_deref(), Some(EVENT_HANDSHAKE));
    }
}
