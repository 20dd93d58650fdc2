//! Backend trait shared by the durable and volatile tiers.

use serde::Serialize;
use waypoint_error::Result;

/// Which persistence tier a backend belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Survives process restarts.
    Durable,
    /// Lives only as long as the current session.
    Volatile,
}

impl BackendKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Durable => "durable",
            Self::Volatile => "volatile",
        }
    }
}

/// A raw string key/value backend.
///
/// Writes that would push the backend past its capacity must fail with
/// [`waypoint_error::WaypointError::QuotaExceeded`] so the store can purge
/// and retry.
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn read(&self, key: &str) -> Result<Option<String>>;

    fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Returns whether it existed.
    fn delete(&self, key: &str) -> Result<bool>;

    /// Every key currently stored.
    fn keys(&self) -> Result<Vec<String>>;
}
