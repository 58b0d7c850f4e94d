use serde::Serialize;
use tracing::warn;

use crate::{
    dto::sse::{ServerEvent, SystemStatus},
    services::view_service,
    state::SharedState,
};

const EVENT_VIEW: &str = "view";
const EVENT_SYSTEM_STATUS: &str = "system_status";

/// Broadcast the current matrix view to every SSE subscriber.
pub async fn broadcast_view(state: &SharedState) {
    if state.sse().receiver_count() == 0 {
        return;
    }
    let view = view_service::current_view(state).await;
    send_event(state, EVENT_VIEW, &view);
}

/// Broadcast a degraded mode change.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    send_event(state, EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
}

fn send_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize SSE payload"),
    }
}
