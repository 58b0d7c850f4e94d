use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the Coaching Matrix backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::participant::get_participant,
        crate::routes::participant::choose_name,
        crate::routes::participant::place_preview,
        crate::routes::participant::submit,
        crate::routes::session::reveal,
        crate::routes::session::reset,
        crate::routes::view::get_view,
        crate::routes::sse::view_stream,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::participant::ChooseNameRequest,
            crate::dto::participant::PreviewRequest,
            crate::dto::participant::ParticipantResponse,
            crate::dto::participant::PlacementSummary,
            crate::dto::participant::PointDto,
            crate::dto::phase::VisiblePhase,
            crate::dto::session::SessionStatusResponse,
            crate::dto::session::ResetResponse,
            crate::dto::view::MatrixView,
            crate::dto::view::MarkerDto,
            crate::dto::view::LegendEntry,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "participant", description = "Local participant identity and placement"),
        (name = "session", description = "Shared reveal and reset controls"),
        (name = "view", description = "Render-ready matrix view"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;
