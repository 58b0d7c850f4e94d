use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod health;
pub mod participant;
pub mod session;
pub mod sse;
pub mod view;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(participant::router())
        .merge(session::router())
        .merge(view::router())
        .merge(sse::router())
        .merge(docs::router())
        .with_state(state)
}
