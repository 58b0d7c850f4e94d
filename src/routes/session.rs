use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::session::{ResetResponse, SessionStatusResponse},
    error::AppError,
    services::session_service,
    state::SharedState,
};

/// Shared session controls; any participant may use them.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/session/reveal", post(reveal))
        .route("/session/reset", post(reset))
}

/// Reveal every placement to every participant.
#[utoipa::path(
    post,
    path = "/session/reveal",
    tag = "session",
    responses(
        (status = 200, description = "Session revealed", body = SessionStatusResponse),
        (status = 503, description = "Session store unavailable")
    )
)]
pub async fn reveal(State(state): State<SharedState>) -> Result<Json<SessionStatusResponse>, AppError> {
    Ok(Json(session_service::reveal(&state).await?))
}

/// Hide the results and delete every placement.
#[utoipa::path(
    post,
    path = "/session/reset",
    tag = "session",
    responses(
        (status = 200, description = "Session reset", body = ResetResponse),
        (status = 500, description = "Results hidden but placements left behind"),
        (status = 503, description = "Session store unavailable")
    )
)]
pub async fn reset(State(state): State<SharedState>) -> Result<Json<ResetResponse>, AppError> {
    Ok(Json(session_service::reset(&state).await?))
}
