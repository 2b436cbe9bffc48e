use axum::Router;

use crate::state::SharedState;

/// Swagger UI and OpenAPI JSON.

pub mod docs;
/// Health check route.
pub mod health;
/// League routes.
pub mod league;
/// Live league stream.
pub mod sse;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sse::router())
        .merge(league::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
