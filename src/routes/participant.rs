use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::participant::{ChooseNameRequest, ParticipantResponse, PreviewRequest},
    error::AppError,
    services::participant_service,
    state::SharedState,
};

/// Local participant endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/participant", get(get_participant))
        .route("/participant/name", post(choose_name))
        .route("/participant/preview", post(place_preview))
        .route("/participant/submit", post(submit))
}

/// Return the participant's identity, phase and own marker.
#[utoipa::path(
    get,
    path = "/participant",
    tag = "participant",
    responses((status = 200, description = "Current participant", body = ParticipantResponse))
)]
pub async fn get_participant(State(state): State<SharedState>) -> Json<ParticipantResponse> {
    Json(participant_service::get_participant(&state).await)
}

/// Choose the participant's display name.
#[utoipa::path(
    post,
    path = "/participant/name",
    tag = "participant",
    request_body = ChooseNameRequest,
    responses(
        (status = 200, description = "Name chosen", body = ParticipantResponse),
        (status = 400, description = "Invalid name")
    )
)]
pub async fn choose_name(
    State(state): State<SharedState>,
    Valid(Json(body)): Valid<Json<ChooseNameRequest>>,
) -> Result<Json<ParticipantResponse>, AppError> {
    Ok(Json(
        participant_service::choose_name(&state, &body.name).await?,
    ))
}

/// Move the unsubmitted marker.
#[utoipa::path(
    post,
    path = "/participant/preview",
    tag = "participant",
    request_body = PreviewRequest,
    responses(
        (status = 200, description = "Preview moved", body = ParticipantResponse),
        (status = 409, description = "Markers cannot be moved in the current phase")
    )
)]
pub async fn place_preview(
    State(state): State<SharedState>,
    Valid(Json(body)): Valid<Json<PreviewRequest>>,
) -> Result<Json<ParticipantResponse>, AppError> {
    Ok(Json(
        participant_service::place_preview(&state, body.x, body.y).await?,
    ))
}

/// Submit the preview marker.
#[utoipa::path(
    post,
    path = "/participant/submit",
    tag = "participant",
    responses(
        (status = 200, description = "Placement submitted", body = ParticipantResponse),
        (status = 409, description = "Nothing to submit in the current phase"),
        (status = 503, description = "Session store unavailable")
    )
)]
pub async fn submit(State(state): State<SharedState>) -> Result<Json<ParticipantResponse>, AppError> {
    Ok(Json(participant_service::submit(&state).await?))
}
