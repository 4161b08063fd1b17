//! Business task payload carried by an instance.
//!
//! [`TaskDetails`] is supplied by the initiating module and never
//! reinterpreted by the engine: it is decoded once at the store boundary,
//! stored with an explicit schema version, and returned verbatim. The only
//! field the engine reads is `task_id`, for business-task correlation, and
//! the sender identity when a step routes back to the sender.

use crate::directory::UserId;
use serde::{Deserialize, Serialize};

/// Schema version written with every persisted payload. Bump when the
/// shape of [`TaskDetails`] changes incompatibly.
pub const TASK_DETAILS_SCHEMA_VERSION: u32 = 1;

/// Opaque business payload attached to an instance at creation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDetails {
    /// Payload schema version
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Correlated business task identifier (e.g. a leave-request id)
    pub task_id: String,
    /// Business task type (e.g. "leave_request")
    pub task_type: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Who submitted the business task
    pub sender: SenderInfo,
}

impl TaskDetails {
    pub fn new(
        task_id: impl Into<String>,
        task_type: impl Into<String>,
        sender: SenderInfo,
    ) -> Self {
        Self {
            schema_version: TASK_DETAILS_SCHEMA_VERSION,
            task_id: task_id.into(),
            task_type: task_type.into(),
            description: String::new(),
            sender,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Identity of the business-task sender
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderInfo {
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub department: String,
}

impl SenderInfo {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            name: name.into(),
            position: String::new(),
            department: String::new(),
        }
    }

    pub fn with_position(mut self, position: impl Into<String>) -> Self {
        self.position = position.into();
        self
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = department.into();
        self
    }
}

fn default_schema_version() -> u32 {
    TASK_DETAILS_SCHEMA_VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_preserves_payload() {
        let details = TaskDetails::new(
            "leave-42",
            "leave_request",
            SenderInfo::new("u-7", "Carol")
                .with_position("Engineer")
                .with_department("R&D"),
        )
        .with_description("Annual leave, 5 days");

        let json = serde_json::to_string(&details).unwrap();
        let decoded: TaskDetails = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, details);
        assert_eq!(decoded.schema_version, TASK_DETAILS_SCHEMA_VERSION);
    }

    #[test]
    fn test_missing_schema_version_defaults() {
        let json = r#"{
            "task_id": "t-1",
            "task_type": "leave_request",
            "sender": { "user_id": "u-1", "name": "Ann" }
        }"#;
        let decoded: TaskDetails = serde_json::from_str(json).unwrap();
        assert_eq!(decoded.schema_version, TASK_DETAILS_SCHEMA_VERSION);
        assert!(decoded.description.is_empty());
    }
}
