use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Whether the session store answered the connectivity probe.
    pub storage_reachable: bool,
    /// Whether the participant state is fed by live change streams.
    pub live_sync: bool,
}

impl HealthResponse {
    /// Build a response from the probe results; any failure reports "degraded".
    pub fn from_probes(storage_reachable: bool, live_sync: bool) -> Self {
        let status = if storage_reachable && live_sync {
            "ok"
        } else {
            "degraded"
        };
        Self {
            status: status.to_string(),
            storage_reachable,
            live_sync,
        }
    }
}
