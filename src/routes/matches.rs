use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::{clock::ClockSnapshot, match_view::MatchViewResponse},
    error::AppError,
    services::snapshot_service,
    state::{SharedState, clock::ClockKind},
};

/// Routes serving the read side of a match.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/matches/{id}", get(get_match))
        .route("/matches/{id}/{kind}", get(get_clock))
}

/// Serve the composite view of one match.
#[utoipa::path(
    get,
    path = "/matches/{id}",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Identifier of the match")),
    responses(
        (status = 200, description = "Header, clocks, events and stats", body = MatchViewResponse),
        (status = 404, description = "Unknown match"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn get_match(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchViewResponse>, AppError> {
    let view = snapshot_service::match_view(&state, id).await?;
    Ok(Json(view))
}

/// Serve the current snapshot of one clock.
#[utoipa::path(
    get,
    path = "/matches/{id}/{kind}",
    tag = "matches",
    params(
        ("id" = Uuid, Path, description = "Identifier of the match"),
        ("kind" = ClockKind, Path, description = "`gameclock` or `playclock`")
    ),
    responses(
        (status = 200, description = "Current clock snapshot", body = ClockSnapshot),
        (status = 404, description = "Unknown match, or this clock was never armed"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn get_clock(
    State(state): State<SharedState>,
    Path((id, kind)): Path<(Uuid, ClockKind)>,
) -> Result<Json<ClockSnapshot>, AppError> {
    let snapshot = snapshot_service::clock_snapshot(&state, id, kind).await?;
    Ok(Json(*snapshot))
}
