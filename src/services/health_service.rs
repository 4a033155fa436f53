use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report process health while logging storage connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_match_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    let active_clocks = state.clocks().len();
    let sessions = state.connections().session_count();
    if state.is_degraded().await {
        HealthResponse::degraded(active_clocks, sessions)
    } else {
        HealthResponse::ok(active_clocks, sessions)
    }
}
