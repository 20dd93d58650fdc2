//! Telemetry events emitted by every waypoint component.
//!
//! Components report to a [`TelemetryObserver`]. The health monitor is the
//! production observer; [`NoOpTelemetry`] discards events and
//! [`TelemetryLog`] keeps them for assertions.
//!
//! Observers must not block or perform I/O, and must not call back into
//! the component that emitted the event.

use parking_lot::Mutex;
use serde::Serialize;
use waypoint_error::FaultKind;

/// Pipeline step that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Backend self-test at store initialization.
    SelfCheck,
    /// Raw store write.
    StoreWrite,
    /// Raw store read.
    StoreRead,
    /// Old-entry purge.
    Purge,
    /// Navigation write of a page record.
    Record,
    /// Cheap ownership-checked read.
    Fetch,
    /// Validated restoration read.
    Restore,
    /// In-place role repair.
    Repair,
    /// Explicit removal of a record.
    Clear,
    /// Proactive role-change handling.
    RoleChange,
    /// Navigation observer bookkeeping.
    Navigation,
    /// Entry redirect decision.
    Entry,
    /// On-demand diagnostic sweep.
    Diagnostics,
}

impl Operation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SelfCheck => "self_check",
            Self::StoreWrite => "store_write",
            Self::StoreRead => "store_read",
            Self::Purge => "purge",
            Self::Record => "record",
            Self::Fetch => "fetch",
            Self::Restore => "restore",
            Self::Repair => "repair",
            Self::Clear => "clear",
            Self::RoleChange => "role_change",
            Self::Navigation => "navigation",
            Self::Entry => "entry",
            Self::Diagnostics => "diagnostics",
        }
    }
}

/// Where an event happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventContext {
    pub operation: Operation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl EventContext {
    #[must_use]
    pub const fn new(operation: Operation) -> Self {
        Self {
            operation,
            user_id: None,
            path: None,
        }
    }

    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// A single telemetry event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WaypointEvent {
    Success {
        context: EventContext,
        timestamp_ms: i64,
    },
    Fault {
        kind: FaultKind,
        message: String,
        context: EventContext,
        timestamp_ms: i64,
    },
}

impl WaypointEvent {
    #[must_use]
    pub const fn success(context: EventContext, timestamp_ms: i64) -> Self {
        Self::Success {
            context,
            timestamp_ms,
        }
    }

    #[must_use]
    pub fn fault(
        kind: FaultKind,
        message: impl Into<String>,
        context: EventContext,
        timestamp_ms: i64,
    ) -> Self {
        Self::Fault {
            kind,
            message: message.into(),
            context,
            timestamp_ms,
        }
    }

    #[must_use]
    pub const fn timestamp_ms(&self) -> i64 {
        match self {
            Self::Success { timestamp_ms, .. } | Self::Fault { timestamp_ms, .. } => *timestamp_ms,
        }
    }

    #[must_use]
    pub const fn context(&self) -> &EventContext {
        match self {
            Self::Success { context, .. } | Self::Fault { context, .. } => context,
        }
    }

    #[must_use]
    pub const fn fault_kind(&self) -> Option<FaultKind> {
        match self {
            Self::Success { .. } => None,
            Self::Fault { kind, .. } => Some(*kind),
        }
    }
}

/// Receiver of telemetry events.
pub trait TelemetryObserver: Send + Sync {
    fn on_event(&self, event: &WaypointEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpTelemetry;

impl TelemetryObserver for NoOpTelemetry {
    #[inline(always)]
    fn on_event(&self, _event: &WaypointEvent) {}
}

/// Unbounded in-memory event log.
#[derive(Debug, Default)]
pub struct TelemetryLog {
    events: Mutex<Vec<WaypointEvent>>,
}

impl TelemetryLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<WaypointEvent> {
        self.events.lock().clone()
    }

    /// Fault kinds in emission order.
    #[must_use]
    pub fn faults(&self) -> Vec<FaultKind> {
        self.events
            .lock()
            .iter()
            .filter_map(WaypointEvent::fault_kind)
            .collect()
    }

    /// Number of success events recorded for `operation`.
    #[must_use]
    pub fn successes(&self, operation: Operation) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.fault_kind().is_none() && e.context().operation == operation)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl TelemetryObserver for TelemetryLog {
    fn on_event(&self, event: &WaypointEvent) {
        self.events.lock().push(event.clone());
    }
}
