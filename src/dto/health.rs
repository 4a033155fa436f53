use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Clocks currently registered in this process.
    pub active_clocks: usize,
    /// Live WebSocket sessions served by this process.
    pub sessions: usize,
}

impl HealthResponse {
    /// Health response for a process with working storage.
    pub fn ok(active_clocks: usize, sessions: usize) -> Self {
        Self {
            status: "ok".to_string(),
            active_clocks,
            sessions,
        }
    }

    /// Health response while storage is down and writes are rejected.
    pub fn degraded(active_clocks: usize, sessions: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            active_clocks,
            sessions,
        }
    }
}
