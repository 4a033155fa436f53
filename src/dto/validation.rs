//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::state::clock::ClockStatus;

/// Upper bound accepted for a clock value, in seconds (four hours).
pub const MAX_CLOCK_SECONDS: u64 = 14_400;

/// Validates that a clock value fits the accepted range.
pub fn validate_clock_value(value: u64) -> Result<(), ValidationError> {
    if value > MAX_CLOCK_SECONDS {
        let mut err = ValidationError::new("clock_value_range");
        err.message = Some(
            format!("clock value must be at most {MAX_CLOCK_SECONDS} seconds (got {value})").into(),
        );
        return Err(err);
    }
    Ok(())
}

/// Validates that a status a clock is forced into is a resting one.
///
/// `stopping` only ever appears in the update stream while a running clock is
/// being halted; accepting it from a client would strand the clock there.
pub fn validate_resting_status(status: ClockStatus) -> Result<(), ValidationError> {
    if status == ClockStatus::Stopping {
        let mut err = ValidationError::new("clock_status_transient");
        err.message = Some("a clock cannot be forced into the transient `stopping` state".into());
        return Err(err);
    }
    Ok(())
}

/// Validates a WebSocket client id: 1 to 64 characters, alphanumeric plus
/// `-` and `_`.
pub fn validate_client_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > 64 {
        let mut err = ValidationError::new("client_id_length");
        err.message =
            Some(format!("client id must be 1 to 64 characters (got {})", id.len()).into());
        return Err(err);
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        let mut err = ValidationError::new("client_id_format");
        err.message =
            Some("client id must contain only alphanumerics, hyphens and underscores".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_clock_value_range() {
        assert!(validate_clock_value(0).is_ok());
        assert!(validate_clock_value(900).is_ok());
        assert!(validate_clock_value(MAX_CLOCK_SECONDS).is_ok());
        assert!(validate_clock_value(MAX_CLOCK_SECONDS + 1).is_err());
    }

    #[test]
    fn test_validate_resting_status() {
        assert!(validate_resting_status(ClockStatus::Stopped).is_ok());
        assert!(validate_resting_status(ClockStatus::Running).is_ok());
        assert!(validate_resting_status(ClockStatus::Paused).is_ok());
        assert!(validate_resting_status(ClockStatus::Stopping).is_err());
    }

    #[test]
    fn test_validate_client_id_valid() {
        assert!(validate_client_id("scoreboard-1").is_ok());
        assert!(validate_client_id("viewer_42").is_ok());
        assert!(validate_client_id("A").is_ok());
    }

    #[test]
    fn test_validate_client_id_invalid() {
        assert!(validate_client_id("").is_err()); // empty
        assert!(validate_client_id(&"x".repeat(65)).is_err()); // too long
        assert!(validate_client_id("board room").is_err()); // space
        assert!(validate_client_id("tv#1").is_err()); // punctuation
    }
}
