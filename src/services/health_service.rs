use crate::{dto::health::HealthResponse, state::SharedState};

/// Respond with the liveness payload and current gauges.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let rooms = state.registry().lock().await.room_count();
    HealthResponse::ok(rooms, state.connection_count())
}
