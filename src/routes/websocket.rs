use axum::{
    Router,
    extract::{Path, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::validation::validate_client_id, error::AppError, services::websocket_service,
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/ws/{match_id}/{client_id}",
    params(
        ("match_id" = Uuid, Path, description = "Match to watch"),
        ("client_id" = String, Path, description = "Caller-chosen session identifier")
    ),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 400, description = "Malformed client id")
    )
)]
/// Upgrade the HTTP connection into a viewer WebSocket session.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Path((match_id, client_id)): Path<(Uuid, String)>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    // Client ids end up in logs and in the session registry, so only a tame
    // character set is let through.
    if let Err(err) = validate_client_id(&client_id) {
        return Err(AppError::BadRequest(
            err.message
                .map(|message| message.into_owned())
                .unwrap_or_else(|| "invalid client id".into()),
        ));
    }

    Ok(ws.on_upgrade(move |socket| {
        websocket_service::handle_socket(state, socket, match_id, client_id)
    }))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws/{match_id}/{client_id}", get(ws_handler))
}
