use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Gridiron Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::matches::get_match,
        crate::routes::matches::get_clock,
        crate::routes::clock::start,
        crate::routes::clock::pause,
        crate::routes::clock::reset,
        crate::routes::clock::end,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::clock::ClockSnapshot,
            crate::dto::clock::ClockActionOutcome,
            crate::dto::clock::ClockActionResponse,
            crate::dto::clock::ResetClockRequest,
            crate::dto::match_view::MatchSnapshot,
            crate::dto::match_view::EventSnapshot,
            crate::dto::match_view::EventFeedSnapshot,
            crate::dto::match_view::StatLineSnapshot,
            crate::dto::match_view::MatchViewResponse,
            crate::dto::ws::InitialLoadData,
            crate::dto::ws::ServerMessage,
            crate::dto::ws::ClientMessage,
            crate::state::clock::ClockKind,
            crate::state::clock::ClockStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "matches", description = "Read-side match views"),
        (name = "clock", description = "Game and play clock controls"),
        (name = "websocket", description = "Live update stream for viewers"),
    )
)]
pub struct ApiDoc;
