//! Common type definitions.
//!
//! - [`UserId`]: user account identifier (UUID)
//! - [`Role`]: an opaque role label used by the access control gate
//! - [`abbrev_uuid`]: abbreviate UUIDs to first 8 chars for logging

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type UserId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

/// A role label granting access to role-gated routes.
///
/// Roles are independent of each other: there is no hierarchy, and matching is exact and
/// case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Role {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Role {
    fn from(name: String) -> Self {
        Self(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbrev_uuid() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(abbrev_uuid(&id), "550e8400");
    }

    #[test]
    fn test_role_is_case_sensitive() {
        assert_ne!(Role::from("admin"), Role::from("Admin"));
        assert_eq!(Role::from("admin"), Role::new(String::from("admin")));
    }

    #[test]
    fn test_role_serializes_as_plain_string() {
        let json = serde_json::to_string(&vec![Role::from("admin"), Role::from("editor")]).unwrap();
        assert_eq!(json, r#"["admin","editor"]"#);

        let roles: Vec<Role> = serde_json::from_str(&json).unwrap();
        assert_eq!(roles[1].as_str(), "editor");
    }
}
