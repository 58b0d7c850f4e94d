use serde::Serialize;
use utoipa::ToSchema;

use crate::dto::phase::VisiblePhase;

/// Render-ready projection of the matrix for the local participant.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq)]
pub struct MatrixView {
    pub phase: VisiblePhase,
    pub participant_name: Option<String>,
    /// The participant's own marker: the preview while placing, the stored
    /// placement otherwise.
    pub own_marker: Option<MarkerDto>,
    /// Other participants' markers, empty until revealed.
    pub others: Vec<MarkerDto>,
    /// Number of stored placements, own included.
    pub participant_count: usize,
    /// Legend entries in arrival order, empty until revealed.
    pub legend: Vec<LegendEntry>,
    pub can_place: bool,
    pub can_submit: bool,
    /// Status line shown above the matrix.
    pub hint: String,
    /// Quadrant colors: top-left, top-right, bottom-left, bottom-right.
    pub quadrants: Vec<String>,
    pub degraded: bool,
}

/// One marker drawn on the matrix.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq)]
pub struct MarkerDto {
    /// Full participant name.
    pub name: String,
    /// Display label, possibly truncated.
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub color: String,
}

/// One legend line.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq)]
pub struct LegendEntry {
    pub name: String,
    pub label: String,
    pub color: String,
    pub is_self: bool,
}
