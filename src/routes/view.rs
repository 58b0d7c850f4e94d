use axum::{Json, Router, extract::State, routing::get};

use crate::{dto::view::MatrixView, services::view_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/view",
    tag = "view",
    responses((status = 200, description = "Render-ready matrix view", body = MatrixView))
)]
/// Return what the participant should currently see.
pub async fn get_view(State(state): State<SharedState>) -> Json<MatrixView> {
    Json(view_service::current_view(&state).await)
}

pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/view", get(get_view))
}
