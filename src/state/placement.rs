use std::time::SystemTime;

use uuid::Uuid;

use crate::dao::models::PlacementEntity;

/// Normalised position on the matrix, `(0, 0)` being the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// Horizontal position in `[0, 1]`.
    pub x: f64,
    /// Vertical position in `[0, 1]`.
    pub y: f64,
}

impl Point {
    /// Build a point, pulling each coordinate back into `[0, 1]`.
    pub fn clamped(x: f64, y: f64) -> Self {
        Self {
            x: clamp_unit(x),
            y: clamp_unit(y),
        }
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// A participant's marker as mirrored locally.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    /// Row identity assigned by the store.
    pub id: Uuid,
    /// Full participant name (never truncated).
    pub name: String,
    /// Marker position.
    pub point: Point,
    /// Creation timestamp of the row.
    pub created_at: SystemTime,
}

impl From<PlacementEntity> for Placement {
    fn from(value: PlacementEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            point: Point {
                x: value.x,
                y: value.y,
            },
            created_at: value.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_out_of_range_coordinates() {
        assert_eq!(Point::clamped(1.5, -0.3), Point { x: 1.0, y: 0.0 });
        assert_eq!(Point::clamped(0.25, 0.75), Point { x: 0.25, y: 0.75 });
    }

    #[test]
    fn nan_falls_back_to_origin_axis() {
        let point = Point::clamped(f64::NAN, 0.5);
        assert_eq!(point.x, 0.0);
        assert_eq!(point.y, 0.5);
    }
}
