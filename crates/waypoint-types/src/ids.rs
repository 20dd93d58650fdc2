//! Validated identifiers and storage key derivation.

use std::fmt;

use serde::{Deserialize, Serialize};
use waypoint_error::{Result, WaypointError};

/// Prefix shared by every page-memory key. Purging and diagnostics scan for it.
pub const DEFAULT_KEY_PREFIX: &str = "waypoint.last_page.";

/// Non-empty identifier of the user owning a record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(WaypointError::internal("user id must not be empty"));
        }
        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Non-empty access class of a user.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    pub fn new(role: impl Into<String>) -> Result<Self> {
        let role = role.into();
        if role.trim().is_empty() {
            return Err(WaypointError::internal("role must not be empty"));
        }
        Ok(Self(role))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-user storage key: a fixed prefix followed by the user id.
///
/// Scoping one record per user keeps an account switch from surfacing the
/// previous account's last page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    #[must_use]
    pub fn for_user(prefix: &str, user_id: &UserId) -> Self {
        Self(format!("{prefix}{}", user_id.as_str()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `key` follows the page-memory naming convention.
    #[must_use]
    pub fn is_tracking_key(prefix: &str, key: &str) -> bool {
        key.len() > prefix.len() && key.starts_with(prefix)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
