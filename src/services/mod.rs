/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// League views, quotes and mutations behind the REST routes.
pub mod league_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events streaming service.
pub mod sse_service;
/// Storage connection supervisor with reconnect backoff.
pub mod storage_supervisor;
/// Sync controller reconciling the league with the shared document.
pub mod sync_service;
