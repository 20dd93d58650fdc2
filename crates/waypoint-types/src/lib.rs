//! Core type definitions shared by every waypoint crate.

pub mod auth;
pub mod clock;
pub mod ids;
pub mod page_state;
pub mod telemetry;

pub use auth::{
    AuthProvider, AuthSnapshot, AuthUser, Identity, MockAuthProvider, Navigator, RecordingNavigator,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use ids::{DEFAULT_KEY_PREFIX, Role, StorageKey, UserId};
pub use page_state::{
    DEFAULT_EXPIRY_MS, FUTURE_TOLERANCE_MS, PageState, PageStateDefect, Staleness,
};
pub use telemetry::{
    EventContext, NoOpTelemetry, Operation, TelemetryLog, TelemetryObserver, WaypointEvent,
};

/// Milliseconds in one minute.
pub const MINUTE_MS: i64 = 60 * 1000;
/// Milliseconds in one day.
pub const DAY_MS: i64 = 24 * 60 * MINUTE_MS;
