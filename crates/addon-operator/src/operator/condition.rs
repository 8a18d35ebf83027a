//! Condition model shared by every resource reconciler.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reason codes reported on conditions.
pub mod reason {
    pub const SUCCESS: &str = "Success";
    pub const FETCH_FAILED: &str = "FetchFailed";
    pub const CREATE_FAILED: &str = "CreateFailed";
    pub const DELETE_FAILED: &str = "DeleteFailed";
    pub const PRECONDITION_FAILED: &str = "PreconditionFailed";
    pub const NOT_SUPPORTED: &str = "NotSupported";
    pub const DELETED: &str = "Deleted";
    pub const DELETION_PENDING: &str = "DeletionPending";
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
}

/// Kubernetes-style status record describing one managed resource.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,

    pub status: ConditionStatus,

    pub reason: String,

    pub message: String,

    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition stamped with the current time
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    pub fn success(type_: &str, message: impl Into<String>) -> Self {
        Self::new(type_, ConditionStatus::True, reason::SUCCESS, message)
    }

    pub fn failure(type_: &str, reason: &str, message: impl Into<String>) -> Self {
        Self::new(type_, ConditionStatus::False, reason, message)
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = reason.to_string();
        self
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Keeps the previous transition time of conditions whose type and status did not change.
pub fn carry_transition_times(previous: &[Condition], next: Vec<Condition>) -> Vec<Condition> {
    next.into_iter()
        .map(|mut condition| {
            if let Some(prev) = previous
                .iter()
                .find(|p| p.type_ == condition.type_ && p.status == condition.status)
            {
                condition.last_transition_time = prev.last_transition_time;
            }
            condition
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_serializes_with_kubernetes_field_names() {
        let condition = Condition::success("NodeFeatureDiscoveryDeployed", "ok");
        let value = serde_json::to_value(&condition).unwrap();
        assert_eq!(value["type"], "NodeFeatureDiscoveryDeployed");
        assert_eq!(value["status"], "True");
        assert_eq!(value["reason"], "Success");
        assert!(value.get("lastTransitionTime").is_some());
    }

    #[test]
    fn test_carry_transition_times() {
        let then = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut unchanged = Condition::success("A", "ok");
        unchanged.last_transition_time = then;
        let mut flipped = Condition::success("B", "ok");
        flipped.last_transition_time = then;

        let next = vec![
            Condition::success("A", "still ok"),
            Condition::failure("B", reason::CREATE_FAILED, "broken"),
            Condition::success("C", "new"),
        ];
        let merged = carry_transition_times(&[unchanged, flipped], next);

        assert_eq!(merged[0].last_transition_time, then);
        assert_eq!(merged[0].message, "still ok");
        assert_ne!(merged[1].last_transition_time, then);
        assert_ne!(merged[2].last_transition_time, then);
    }
}
