//! The health monitor.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use waypoint_error::FaultKind;
use waypoint_types::{
    Clock, EventContext, MINUTE_MS, Operation, TelemetryObserver, WaypointEvent,
};

use crate::ring::RingBuffer;

/// Thresholds driving [`HealthMonitor::get_health_status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Faults kept in the ring buffer.
    pub capacity: usize,
    /// Look-back window for the recent-error count.
    pub window_ms: i64,
    /// Recent faults above this count mean `warning`.
    pub warning_errors: usize,
    /// Recent faults above this count mean `critical`.
    pub critical_errors: usize,
    /// Restoration success rate below this downgrades the status.
    pub min_restore_success_rate: f64,
    /// Storage faults above this count downgrade the status.
    pub storage_error_threshold: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            window_ms: 5 * MINUTE_MS,
            warning_errors: 5,
            critical_errors: 10,
            min_restore_success_rate: 0.8,
            storage_error_threshold: 5,
        }
    }
}

/// One recorded fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub timestamp_ms: i64,
    pub kind: FaultKind,
    pub message: String,
    pub context: EventContext,
}

/// Rolling counters since construction or the last reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HealthCounters {
    pub total_tracked: u64,
    pub successful_restorations: u64,
    pub failed_restorations: u64,
    pub storage_errors: u64,
    pub validation_errors: u64,
    pub permission_errors: u64,
}

impl HealthCounters {
    /// Fraction of restorations that succeeded, if any were attempted.
    #[must_use]
    pub fn restoration_success_rate(&self) -> Option<f64> {
        let total = self.successful_restorations + self.failed_restorations;
        (total > 0).then(|| self.successful_restorations as f64 / total as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    const fn downgraded(self) -> Self {
        match self {
            Self::Healthy => Self::Warning,
            Self::Warning | Self::Critical => Self::Critical,
        }
    }
}

/// Result of [`HealthMonitor::get_health_status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub issues: Vec<String>,
    pub counters: HealthCounters,
    pub recent_errors: usize,
    pub restoration_success_rate: Option<f64>,
    pub generated_at_ms: i64,
}

#[derive(Debug)]
struct MonitorInner {
    errors: RingBuffer<ErrorRecord>,
    counters: HealthCounters,
}

/// Passive sink computing pipeline health.
pub struct HealthMonitor {
    inner: Mutex<MonitorInner>,
    config: MonitorConfig,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("config", &self.config)
            .field("counters", &self.counters())
            .finish_non_exhaustive()
    }
}

impl HealthMonitor {
    #[must_use]
    pub fn new(config: MonitorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(MonitorInner {
                errors: RingBuffer::new(config.capacity),
                counters: HealthCounters::default(),
            }),
            config,
            clock,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Record a successful step.
    pub fn log_success(&self, context: EventContext) {
        self.record_success(&context);
    }

    /// Record a fault, stamped with the current time.
    pub fn log_error(&self, kind: FaultKind, message: impl Into<String>, context: EventContext) {
        self.record_fault(ErrorRecord {
            timestamp_ms: self.clock.now_ms(),
            kind,
            message: message.into(),
            context,
        });
    }

    fn record_success(&self, context: &EventContext) {
        let mut inner = self.inner.lock();
        match context.operation {
            Operation::Record => inner.counters.total_tracked += 1,
            Operation::Restore => inner.counters.successful_restorations += 1,
            _ => {}
        }
    }

    fn record_fault(&self, record: ErrorRecord) {
        debug!(
            target: "waypoint.observability::monitor",
            kind = record.kind.as_str(),
            operation = record.context.operation.as_str(),
            message = %record.message,
            "fault recorded"
        );
        let mut inner = self.inner.lock();
        let counters = &mut inner.counters;
        if record.kind.is_storage() {
            counters.storage_errors += 1;
        } else if record.kind.is_validation() {
            counters.validation_errors += 1;
        } else if record.kind == FaultKind::PermissionDenied {
            counters.permission_errors += 1;
        }
        if record.context.operation == Operation::Restore {
            counters.failed_restorations += 1;
        }
        inner.errors.push(record);
    }

    /// Counter snapshot.
    #[must_use]
    pub fn counters(&self) -> HealthCounters {
        self.inner.lock().counters
    }

    /// Buffered faults, oldest first.
    #[must_use]
    pub fn recent_errors(&self) -> Vec<ErrorRecord> {
        self.inner.lock().errors.to_vec()
    }

    /// Drop all buffered faults and zero the counters.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.errors.clear();
        inner.counters = HealthCounters::default();
    }

    /// Derive the current status from recent faults, restoration success
    /// rate, and storage-fault count.
    #[must_use]
    pub fn get_health_status(&self) -> HealthSnapshot {
        let now = self.clock.now_ms();
        let (recent_errors, counters) = {
            let inner = self.inner.lock();
            let since = now.saturating_sub(self.config.window_ms);
            let recent = inner
                .errors
                .iter()
                .filter(|e| e.timestamp_ms >= since)
                .count();
            (recent, inner.counters)
        };

        let mut issues = Vec::new();
        let mut status = if recent_errors > self.config.critical_errors {
            issues.push(format!("{recent_errors} errors in the last window"));
            HealthStatus::Critical
        } else if recent_errors > self.config.warning_errors {
            issues.push(format!("{recent_errors} errors in the last window"));
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };

        let rate = counters.restoration_success_rate();
        if let Some(rate) = rate.filter(|r| *r < self.config.min_restore_success_rate) {
            issues.push(format!(
                "restoration success rate {:.0}% below {:.0}%",
                rate * 100.0,
                self.config.min_restore_success_rate * 100.0
            ));
            status = status.downgraded();
        }

        if counters.storage_errors > self.config.storage_error_threshold {
            issues.push(format!("{} storage errors", counters.storage_errors));
            status = status.downgraded();
        }

        if status != HealthStatus::Healthy {
            warn!(
                target: "waypoint.observability::monitor",
                status = status.as_str(),
                issues = issues.len(),
                "pipeline degraded"
            );
        }

        HealthSnapshot {
            status,
            issues,
            counters,
            recent_errors,
            restoration_success_rate: rate,
            generated_at_ms: now,
        }
    }
}

impl TelemetryObserver for HealthMonitor {
    fn on_event(&self, event: &WaypointEvent) {
        match event {
            WaypointEvent::Success { context, .. } => self.record_success(context),
            WaypointEvent::Fault {
                kind,
                message,
                context,
                timestamp_ms,
            } => self.record_fault(ErrorRecord {
                timestamp_ms: *timestamp_ms,
                kind: *kind,
                message: message.clone(),
                context: context.clone(),
            }),
        }
    }
}
