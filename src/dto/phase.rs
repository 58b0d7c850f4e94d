use serde::Serialize;
use utoipa::ToSchema;

use crate::state::phase::Phase;

/// Participant phase exposed to clients (REST/SSE).
#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisiblePhase {
    /// No name chosen yet.
    NameEntry,
    /// Placing and submitting a marker.
    Placement,
    /// Waiting for the reveal.
    Submitted,
    /// All markers visible.
    Revealed,
}

impl From<Phase> for VisiblePhase {
    fn from(value: Phase) -> Self {
        match value {
            Phase::NameEntry => VisiblePhase::NameEntry,
            Phase::Placement => VisiblePhase::Placement,
            Phase::Submitted => VisiblePhase::Submitted,
            Phase::Revealed => VisiblePhase::Revealed,
        }
    }
}
