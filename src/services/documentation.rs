use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Fantasy Golf Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::league_stream,
        crate::routes::league::get_league,
        crate::routes::league::get_quotes,
        crate::routes::league::record_score,
        crate::routes::league::record_adjustment,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::league::LeagueView,
            crate::dto::league::TeamView,
            crate::dto::league::TransactionView,
            crate::dto::league::TransactionType,
            crate::dto::league::LeaderboardRow,
            crate::dto::league::SyncStatusView,
            crate::dto::league::QuotesResponse,
            crate::dto::league::TeamQuote,
            crate::dto::league::ScoreEntryRequest,
            crate::dto::league::AdjustmentRequest,
            crate::dto::league::AdjustmentResponse,
            crate::dto::league::RejectionReason,
            crate::dto::sse::Handshake,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "league", description = "Scores, adjustments and standings"),
    )
)]
/// OpenAPI document of the HTTP surface.
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_league_routes() {
        let doc = ApiDoc::openapi();
        let paths = doc.paths.paths.keys().cloned().collect::<Vec<_>>();

        for path in [
            "/healthcheck",
            "/sse/league",
            "/league",
            "/league/quotes",
            "/league/teams/{team}/holes/{hole}",
            "/league/adjustments",
        ] {
            assert!(paths.iter().any(|p| p == path), "missing {path}");
        }
    }
}
