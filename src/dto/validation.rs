//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest accepted participant name, in characters.
pub const MAX_NAME_CHARS: usize = 40;

/// Validates a self-asserted participant name.
///
/// Surrounding whitespace is ignored; what remains must be non-empty, at most
/// [`MAX_NAME_CHARS`] characters and free of control characters.
pub fn validate_participant_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("name_empty");
        err.message = Some("Name must not be empty".into());
        return Err(err);
    }

    let length = trimmed.chars().count();
    if length > MAX_NAME_CHARS {
        let mut err = ValidationError::new("name_length");
        err.message = Some(
            format!("Name must be at most {MAX_NAME_CHARS} characters (got {length})").into(),
        );
        return Err(err);
    }

    if trimmed.chars().any(char::is_control) {
        let mut err = ValidationError::new("name_format");
        err.message = Some("Name must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a coordinate is a finite number.
pub fn validate_coordinate(value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        let mut err = ValidationError::new("coordinate_finite");
        err.message = Some("Coordinate must be a finite number".into());
        Err(err)
    }
}
