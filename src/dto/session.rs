use serde::Serialize;
use utoipa::ToSchema;

use crate::dto::phase::VisiblePhase;

/// Outcome of a reveal request.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionStatusResponse {
    /// Reveal flag after the operation.
    pub revealed: bool,
    /// Phase of the local participant after the operation.
    pub phase: VisiblePhase,
}

/// Outcome of a reset request.
#[derive(Debug, Serialize, ToSchema)]
pub struct ResetResponse {
    /// Number of placements deleted.
    pub cleared: usize,
    pub revealed: bool,
    pub phase: VisiblePhase,
}
