//! Health reporting backed by a store liveness probe.

use crate::{dto::health::HealthResponse, state::SharedState};

/// Current health status: degraded when the session store is unreachable.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.store().health_check().await {
        Ok(()) => HealthResponse::ok(),
        Err(_) => HealthResponse::degraded(),
    }
}
