use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::ClockEntity,
    dto::validation::{validate_clock_value, validate_resting_status},
    state::clock::{ClockKind, ClockStatus},
};

/// Point-in-time view of one countdown clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ClockSnapshot {
    /// Match the clock belongs to.
    pub match_id: Uuid,
    /// Game or play clock.
    pub kind: ClockKind,
    /// Remaining seconds.
    pub value: u64,
    /// Lifecycle status at the time of the snapshot.
    pub status: ClockStatus,
}

impl From<ClockEntity> for ClockSnapshot {
    fn from(entity: ClockEntity) -> Self {
        Self {
            match_id: entity.match_id,
            kind: entity.kind,
            value: entity.value,
            status: entity.status,
        }
    }
}

/// How a clock control request was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ClockActionOutcome {
    /// The countdown was armed by this request.
    Started,
    /// The clock was already counting; nothing changed.
    AlreadyRunning,
    /// The countdown was frozen.
    Paused,
    /// The clock was forced to the requested value and status.
    Reset,
    /// The clock was torn down for good.
    Ended,
}

/// Response returned by every clock control endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClockActionResponse {
    /// What the request actually did.
    pub outcome: ClockActionOutcome,
    /// The clock after the request settled.
    pub clock: ClockSnapshot,
}

/// Payload forcing a clock to a given value and resting status.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ResetClockRequest {
    /// New remaining seconds.
    pub value: u64,
    /// Status the clock settles into; `running` re-arms the countdown.
    #[serde(default = "default_reset_status")]
    pub status: ClockStatus,
}

fn default_reset_status() -> ClockStatus {
    ClockStatus::Stopped
}

impl Validate for ResetClockRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_clock_value(self.value) {
            errors.add("value", e);
        }
        if let Err(e) = validate_resting_status(self.status) {
            errors.add("status", e);
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_status_defaults_to_stopped() {
        let request: ResetClockRequest = serde_json::from_str(r#"{"value": 40}"#).unwrap();
        assert_eq!(request.status, ClockStatus::Stopped);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn reset_into_stopping_is_rejected() {
        let request: ResetClockRequest =
            serde_json::from_str(r#"{"value": 40, "status": "stopping"}"#).unwrap();
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("status"));
    }

    #[test]
    fn oversized_reset_value_is_rejected() {
        let request: ResetClockRequest =
            serde_json::from_str(r#"{"value": 99999, "status": "paused"}"#).unwrap();
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("value"));
    }
}
