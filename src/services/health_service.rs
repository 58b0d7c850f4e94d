use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Probe the session store and report whether live sync is running.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let reachable = match state.store().health_check().await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "storage health check failed");
            false
        }
    };

    HealthResponse::from_probes(reachable, !state.is_degraded())
}
