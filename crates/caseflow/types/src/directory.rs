//! User directory records.
//!
//! Caseflow does not own user management. The directory types here are the
//! shape the engine consumes through the `UserDirectory` capability:
//! enough to check role membership and apply the assignment policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a user
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role identifier used in step guards (e.g. "manager", "hr_admin")
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleId(pub String);

impl RoleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for RoleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A directory entry for one user
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserRecord {
    /// Unique user identifier
    pub user_id: UserId,
    /// Display name
    pub display_name: String,
    /// Roles this user holds
    pub roles: Vec<RoleId>,
    /// Whether the account is active; inactive users are never assigned
    pub active: bool,
    /// When the account was created (assignment tie-break)
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            display_name: display_name.into(),
            roles: Vec::new(),
            active: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(RoleId::new(role));
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Check whether this user holds any of the given roles
    pub fn holds_any_role(&self, roles: &[RoleId]) -> bool {
        self.roles.iter().any(|r| roles.contains(r))
    }
}
