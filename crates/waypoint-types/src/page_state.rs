//! The persisted last-page record.
//!
//! A [`PageState`] can only be obtained through [`PageState::new`] or by
//! decoding JSON through [`PageState::from_value`]; both run the same
//! structural checks, so holding a `PageState` means all four fields are
//! present, typed, and non-empty, and the timestamp is positive. Time-window
//! checks need "now" and are applied separately by
//! [`PageState::check_freshness`].
//!
//! Wire shape (the only format that has to round-trip exactly):
//!
//! ```json
//! {"path":"/app/candidates","timestamp":1718000000000,"role":"admin","userId":"u-1"}
//! ```
//!
//! Unknown fields are ignored on read and never written.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use waypoint_error::WaypointError;

use crate::ids::{Role, UserId};
use crate::{DAY_MS, MINUTE_MS};

/// Records older than this are expired regardless of structure.
pub const DEFAULT_EXPIRY_MS: i64 = 7 * DAY_MS;
/// How far in the future a timestamp may be before it counts as tampered.
pub const FUTURE_TOLERANCE_MS: i64 = 5 * MINUTE_MS;

/// Structural problem found while decoding a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageStateDefect {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("field '{0}' has the wrong type")]
    WrongType(&'static str),
    #[error("field '{0}' is empty")]
    EmptyField(&'static str),
    #[error("timestamp {0} is not positive")]
    NonPositiveTimestamp(i64),
}

impl From<PageStateDefect> for WaypointError {
    fn from(defect: PageStateDefect) -> Self {
        Self::corrupt(defect.to_string())
    }
}

/// Time-window violation found by [`PageState::check_freshness`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// Older than the retention window.
    Expired { age_ms: i64 },
    /// Dated further in the future than the tolerance allows.
    FutureDated { ahead_ms: i64 },
}

/// A user's last tracked location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPageState")]
pub struct PageState {
    path: String,
    timestamp: i64,
    role: Role,
    #[serde(rename = "userId")]
    user_id: UserId,
}

#[derive(Deserialize)]
struct RawPageState {
    #[serde(default)]
    path: Option<Value>,
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(default)]
    role: Option<Value>,
    #[serde(default, rename = "userId")]
    user_id: Option<Value>,
}

fn required_str(field: &'static str, value: Option<Value>) -> Result<String, PageStateDefect> {
    match value {
        None => Err(PageStateDefect::MissingField(field)),
        Some(Value::String(s)) if s.trim().is_empty() => Err(PageStateDefect::EmptyField(field)),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(PageStateDefect::WrongType(field)),
    }
}

impl TryFrom<RawPageState> for PageState {
    type Error = PageStateDefect;

    fn try_from(raw: RawPageState) -> Result<Self, Self::Error> {
        let path = required_str("path", raw.path)?;
        let timestamp = match raw.timestamp {
            None => return Err(PageStateDefect::MissingField("timestamp")),
            Some(v) => v.as_i64().ok_or(PageStateDefect::WrongType("timestamp"))?,
        };
        let role = required_str("role", raw.role)?;
        let user_id = required_str("userId", raw.user_id)?;
        if timestamp <= 0 {
            return Err(PageStateDefect::NonPositiveTimestamp(timestamp));
        }
        // Both strings are already known to be non-empty.
        Ok(Self {
            path,
            timestamp,
            role: Role::new(role).map_err(|_| PageStateDefect::EmptyField("role"))?,
            user_id: UserId::new(user_id).map_err(|_| PageStateDefect::EmptyField("userId"))?,
        })
    }
}

impl PageState {
    pub fn new(
        path: impl Into<String>,
        timestamp: i64,
        role: Role,
        user_id: UserId,
    ) -> Result<Self, PageStateDefect> {
        let path = path.into();
        if path.trim().is_empty() {
            return Err(PageStateDefect::EmptyField("path"));
        }
        if timestamp <= 0 {
            return Err(PageStateDefect::NonPositiveTimestamp(timestamp));
        }
        Ok(Self {
            path,
            timestamp,
            role,
            user_id,
        })
    }

    /// Decode an untyped JSON value read from storage.
    pub fn from_value(value: Value) -> Result<Self, PageStateDefect> {
        if !value.is_object() {
            return Err(PageStateDefect::NotAnObject);
        }
        let raw: RawPageState =
            serde_json::from_value(value).map_err(|_| PageStateDefect::NotAnObject)?;
        Self::try_from(raw)
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub const fn timestamp(&self) -> i64 {
        self.timestamp
    }

    #[must_use]
    pub const fn role(&self) -> &Role {
        &self.role
    }

    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Age of the record relative to `now_ms` (negative when future-dated).
    #[must_use]
    pub const fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.timestamp)
    }

    /// Check the record against the accepted window `[now - max_age, now + tolerance]`.
    pub fn check_freshness(
        &self,
        now_ms: i64,
        max_age_ms: i64,
        future_tolerance_ms: i64,
    ) -> Result<(), Staleness> {
        let age_ms = self.age_ms(now_ms);
        if age_ms < 0 && -age_ms > future_tolerance_ms {
            return Err(Staleness::FutureDated { ahead_ms: -age_ms });
        }
        if age_ms > max_age_ms {
            return Err(Staleness::Expired { age_ms });
        }
        Ok(())
    }

    /// Copy of this record re-stamped for `role` at `now_ms`.
    #[must_use]
    pub fn repaired(&self, role: Role, now_ms: i64) -> Self {
        Self {
            path: self.path.clone(),
            timestamp: now_ms.max(1),
            role,
            user_id: self.user_id.clone(),
        }
    }
}
