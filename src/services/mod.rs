/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Participant commands: name, preview and submit.
pub mod participant_service;
/// Shared session commands: reveal and reset.
pub mod session_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Subscription, bulk fetch and resynchronisation against the session store.
pub mod sync_service;
/// Projection of the client session into a render-ready view.
pub mod view_service;
