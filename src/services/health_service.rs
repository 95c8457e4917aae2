use crate::{dto::health::HealthResponse, state::SharedState};

/// Build the current health status of the backend.
pub fn health_status(state: &SharedState) -> HealthResponse {
    HealthResponse::ok(state.registry().room_count())
}
