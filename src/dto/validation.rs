//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest room code accepted from callers.
const MAX_ROOM_CODE_LENGTH: usize = 18;

/// Validates that a room code is a short, non-empty string of ASCII digits.
///
/// # Examples
///
/// ```ignore
/// validate_room_code("482913") // Ok
/// validate_room_code("48a913") // Err - not a digit
/// validate_room_code("")       // Err - empty
/// ```
pub fn validate_room_code(code: &str) -> Result<(), ValidationError> {
    if code.is_empty() || code.len() > MAX_ROOM_CODE_LENGTH {
        let mut err = ValidationError::new("room_code_length");
        err.message = Some(
            format!(
                "Room code must be 1 to {MAX_ROOM_CODE_LENGTH} digits (got {})",
                code.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !code.chars().all(|c| c.is_ascii_digit()) {
        let mut err = ValidationError::new("room_code_format");
        err.message = Some("Room code must contain only digits".into());
        return Err(err);
    }

    Ok(())
}
