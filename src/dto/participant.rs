use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::{
        format_system_time,
        phase::VisiblePhase,
        validation::{validate_coordinate, validate_participant_name},
    },
    state::{
        client::ClientSession,
        placement::{Placement, Point},
    },
};

/// Payload used to pick the participant's display name.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ChooseNameRequest {
    /// Display name; surrounding whitespace is trimmed.
    #[validate(custom(function = "validate_participant_name"))]
    pub name: String,
}

/// Normalised coordinates of a click on the matrix.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PreviewRequest {
    /// Horizontal position, clamped to `[0, 1]`.
    pub x: f64,
    /// Vertical position, clamped to `[0, 1]`.
    pub y: f64,
}

impl Validate for PreviewRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = validate_coordinate(self.x) {
            errors.add("x", e);
        }
        if let Err(e) = validate_coordinate(self.y) {
            errors.add("y", e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Normalised matrix coordinate.
#[derive(Clone, Copy, Debug, Serialize, ToSchema, PartialEq)]
pub struct PointDto {
    /// Horizontal position in [0, 1].
    pub x: f64,
    /// Vertical position in [0, 1].
    pub y: f64,
}

impl From<Point> for PointDto {
    fn from(value: Point) -> Self {
        Self {
            x: value.x,
            y: value.y,
        }
    }
}

/// Stored placement as exposed to clients.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct PlacementSummary {
    /// Row identifier.
    pub id: Uuid,
    /// Participant name.
    pub name: String,
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
    /// RFC 3339 creation time.
    pub created_at: String,
}

impl From<&Placement> for PlacementSummary {
    fn from(value: &Placement) -> Self {
        Self {
            id: value.id,
            name: value.name.clone(),
            x: value.point.x,
            y: value.point.y,
            created_at: format_system_time(value.created_at),
        }
    }
}

/// Local identity, phase and own marker of the participant.
#[derive(Debug, Serialize, ToSchema)]
pub struct ParticipantResponse {
    /// Chosen display name.
    pub name: Option<String>,
    /// Current phase.
    pub phase: VisiblePhase,
    /// Whether the participant's placement is stored.
    pub submitted: bool,
    /// Unsubmitted marker position, only while placing.
    pub preview: Option<PointDto>,
    /// Stored placement for the participant's name, if any.
    pub placement: Option<PlacementSummary>,
    /// Whether a bulk fetch has completed since startup.
    pub synced: bool,
}

impl From<&ClientSession> for ParticipantResponse {
    fn from(value: &ClientSession) -> Self {
        Self {
            name: value.name().map(str::to_string),
            phase: value.phase().into(),
            submitted: value.submitted(),
            preview: value.preview().map(PointDto::from),
            placement: value.own_placement().map(PlacementSummary::from),
            synced: value.is_synced(),
        }
    }
}
