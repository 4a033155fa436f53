use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::clock::{ClockActionResponse, ResetClockRequest},
    error::AppError,
    services::clock_service,
    state::{SharedState, clock::ClockKind},
};

/// Routes carrying the clock control surface.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/matches/{id}/{kind}/start", post(start))
        .route("/matches/{id}/{kind}/pause", post(pause))
        .route("/matches/{id}/{kind}/reset", post(reset))
        .route("/matches/{id}/{kind}/end", post(end))
}

/// Arm the countdown, or report that it is already running.
#[utoipa::path(
    post,
    path = "/matches/{id}/{kind}/start",
    tag = "clock",
    params(
        ("id" = Uuid, Path, description = "Identifier of the match"),
        ("kind" = ClockKind, Path, description = "`gameclock` or `playclock`")
    ),
    responses(
        (status = 200, description = "Clock running", body = ClockActionResponse),
        (status = 404, description = "Unknown match"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn start(
    State(state): State<SharedState>,
    Path((id, kind)): Path<(Uuid, ClockKind)>,
) -> Result<Json<ClockActionResponse>, AppError> {
    let response = clock_service::start_clock(&state, id, kind).await?;
    Ok(Json(response))
}

/// Freeze the countdown at its current value.
#[utoipa::path(
    post,
    path = "/matches/{id}/{kind}/pause",
    tag = "clock",
    params(
        ("id" = Uuid, Path, description = "Identifier of the match"),
        ("kind" = ClockKind, Path, description = "`gameclock` or `playclock`")
    ),
    responses(
        (status = 200, description = "Clock paused", body = ClockActionResponse),
        (status = 404, description = "Unknown match or clock"),
        (status = 409, description = "Clock is not running"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn pause(
    State(state): State<SharedState>,
    Path((id, kind)): Path<(Uuid, ClockKind)>,
) -> Result<Json<ClockActionResponse>, AppError> {
    let response = clock_service::pause_clock(&state, id, kind).await?;
    Ok(Json(response))
}

/// Force the clock to a given value and resting status.
#[utoipa::path(
    post,
    path = "/matches/{id}/{kind}/reset",
    tag = "clock",
    params(
        ("id" = Uuid, Path, description = "Identifier of the match"),
        ("kind" = ClockKind, Path, description = "`gameclock` or `playclock`")
    ),
    request_body = ResetClockRequest,
    responses(
        (status = 200, description = "Clock reset", body = ClockActionResponse),
        (status = 400, description = "Value or status out of range"),
        (status = 404, description = "Unknown match or clock"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn reset(
    State(state): State<SharedState>,
    Path((id, kind)): Path<(Uuid, ClockKind)>,
    Json(request): Json<ResetClockRequest>,
) -> Result<Json<ClockActionResponse>, AppError> {
    request.validate()?;
    let response = clock_service::reset_clock(&state, id, kind, request).await?;
    Ok(Json(response))
}

/// Tear the clock down and release its resources.
#[utoipa::path(
    post,
    path = "/matches/{id}/{kind}/end",
    tag = "clock",
    params(
        ("id" = Uuid, Path, description = "Identifier of the match"),
        ("kind" = ClockKind, Path, description = "`gameclock` or `playclock`")
    ),
    responses(
        (status = 200, description = "Clock ended", body = ClockActionResponse),
        (status = 404, description = "Unknown match or clock"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn end(
    State(state): State<SharedState>,
    Path((id, kind)): Path<(Uuid, ClockKind)>,
) -> Result<Json<ClockActionResponse>, AppError> {
    let response = clock_service::end_clock(&state, id, kind).await?;
    Ok(Json(response))
}
