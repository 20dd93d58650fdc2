//! Error types for the waypoint page-memory subsystem.
//!
//! Every fault the subsystem can hit is a [`WaypointError`]. None of them
//! escape the public surface: components convert them into a fallback value
//! (`false`, `None`, or a dashboard path) and report the matching
//! [`FaultKind`] to the health monitor.

use serde::Serialize;

/// Crate-wide result alias.
pub type Result<T, E = WaypointError> = std::result::Result<T, E>;

/// Fault taxonomy used for telemetry classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// No backend passed its self-test.
    StorageUnavailable,
    /// A write failed, including quota exhaustion after the purge retry.
    StorageWriteFailure,
    /// The active backend could not be read.
    StorageReadFailure,
    /// Undecodable or structurally invalid record.
    CorruptRecord,
    /// Record older than the retention window, or dated in the future.
    ExpiredRecord,
    /// Role cannot access the stored path.
    PermissionDenied,
    /// Sanitizer rejection.
    MalformedPath,
    /// Record belongs to a different user.
    OwnershipMismatch,
    /// Navigation recording paused after repeated write failures.
    RecordingSuspended,
    /// Anything that does not fit the categories above.
    Internal,
}

impl FaultKind {
    /// Stable label used in logs and issue lists.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StorageUnavailable => "storage_unavailable",
            Self::StorageWriteFailure => "storage_write_failure",
            Self::StorageReadFailure => "storage_read_failure",
            Self::CorruptRecord => "corrupt_record",
            Self::ExpiredRecord => "expired_record",
            Self::PermissionDenied => "permission_denied",
            Self::MalformedPath => "malformed_path",
            Self::OwnershipMismatch => "ownership_mismatch",
            Self::RecordingSuspended => "recording_suspended",
            Self::Internal => "internal",
        }
    }

    /// Whether this fault originates in the persistence layer.
    #[must_use]
    pub const fn is_storage(self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable | Self::StorageWriteFailure | Self::StorageReadFailure
        )
    }

    /// Whether this fault is a record/path validation failure.
    #[must_use]
    pub const fn is_validation(self) -> bool {
        matches!(
            self,
            Self::CorruptRecord | Self::ExpiredRecord | Self::MalformedPath | Self::OwnershipMismatch
        )
    }
}

/// Primary error type.
#[derive(Debug, thiserror::Error)]
pub enum WaypointError {
    /// No storage backend is active.
    #[error("storage unavailable: no backend passed its self-test")]
    StorageUnavailable,

    /// Backend refused a write because its byte quota would be exceeded.
    #[error("storage quota exceeded: need {requested} bytes, {available} available")]
    QuotaExceeded { requested: usize, available: usize },

    /// Backend write failed for a reason other than quota.
    #[error("storage write failed for key '{key}': {detail}")]
    StorageWrite { key: String, detail: String },

    /// Record could not be decoded or is structurally invalid.
    #[error("corrupt record: {detail}")]
    CorruptRecord { detail: String },

    /// Record timestamp fell outside the accepted window.
    #[error("expired record: recorded at {timestamp_ms}, now {now_ms}")]
    ExpiredRecord { timestamp_ms: i64, now_ms: i64 },

    /// Role is not allowed to visit the path.
    #[error("role '{role}' may not access '{path}'")]
    PermissionDenied { path: String, role: String },

    /// Path rejected by the sanitizer.
    #[error("malformed path: {reason}")]
    MalformedPath { reason: String },

    /// Record owned by someone other than the requesting user.
    #[error("record owned by '{owner}', requested by '{requester}'")]
    OwnershipMismatch { owner: String, requester: String },

    /// Configuration could not be parsed or failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Authentication collaborator failure.
    #[error("auth provider error: {0}")]
    Auth(String),

    /// File I/O failure in a durable backend.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON encode/decode failure.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Internal logic error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl WaypointError {
    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a corrupt-record error.
    pub fn corrupt(detail: impl Into<String>) -> Self {
        Self::CorruptRecord {
            detail: detail.into(),
        }
    }

    /// Create a malformed-path error.
    pub fn malformed_path(reason: impl Into<String>) -> Self {
        Self::MalformedPath {
            reason: reason.into(),
        }
    }

    /// Classify this error into the telemetry taxonomy.
    #[must_use]
    pub const fn fault_kind(&self) -> FaultKind {
        match self {
            Self::StorageUnavailable => FaultKind::StorageUnavailable,
            Self::QuotaExceeded { .. } | Self::StorageWrite { .. } | Self::Io(_) => {
                FaultKind::StorageWriteFailure
            }
            Self::CorruptRecord { .. } | Self::Serialization(_) => FaultKind::CorruptRecord,
            Self::ExpiredRecord { .. } => FaultKind::ExpiredRecord,
            Self::PermissionDenied { .. } => FaultKind::PermissionDenied,
            Self::MalformedPath { .. } => FaultKind::MalformedPath,
            Self::OwnershipMismatch { .. } => FaultKind::OwnershipMismatch,
            Self::Config(_) | Self::Auth(_) | Self::Internal(_) => FaultKind::Internal,
        }
    }

    /// Whether this is a capacity failure that a purge might resolve.
    #[must_use]
    pub const fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}
