//! Pipeline health tracking for waypoint.
//!
//! [`HealthMonitor`] is a passive [`waypoint_types::TelemetryObserver`]: the
//! store, page memory, navigation observer, and entry redirector all report
//! into one shared instance. It keeps the most recent faults in a capped
//! ring buffer, maintains rolling counters, and derives a
//! healthy/warning/critical status on demand.
//!
//! # Conformance rules
//!
//! 1. Nothing here is persisted; [`HealthMonitor::reset`] returns to zero.
//! 2. Snapshots implement `serde::Serialize` for JSON export.
//! 3. Recording never blocks on I/O and never calls back into reporters.

pub mod monitor;
pub mod ring;

pub use monitor::{
    ErrorRecord, HealthCounters, HealthMonitor, HealthSnapshot, HealthStatus, MonitorConfig,
};
pub use ring::RingBuffer;
