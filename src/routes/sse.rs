use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;
use tracing::info;

use crate::{services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse/league",
    tag = "sse",
    responses((status = 200, description = "League SSE stream: `handshake`, `league.updated` and `sync.status` events", content_type = "text/event-stream", body = String))
)]
/// Stream league revisions and sync status changes to connected frontends.
pub async fn league_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let (connection_id, initial, receiver) = sse_service::subscribe_league(&state);
    info!(%connection_id, "New league SSE connection");
    sse_service::to_sse_stream(connection_id, initial, receiver)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/league", get(league_stream))
}
