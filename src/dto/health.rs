use serde::Serialize;
use utoipa::ToSchema;

/// Liveness payload returned by the `/health` route.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always "ok" while the process serves traffic.
    pub status: String,
    /// Number of live rooms.
    pub rooms: usize,
    /// Number of bound WebSocket connections.
    pub connections: usize,
}

impl HealthResponse {
    /// Create a health response with the current gauges.
    pub fn ok(rooms: usize, connections: usize) -> Self {
        Self {
            status: "ok".to_string(),
            rooms,
            connections,
        }
    }
}
