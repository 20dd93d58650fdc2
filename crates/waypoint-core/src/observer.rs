//! Navigation observer.
//!
//! Fed every location change. Records distinct paths through the page
//! memory service and backs off after a burst of storage failures: once
//! more than `error_threshold` failures have accumulated, nothing is
//! recorded until `cooldown_ms` has passed since the last one. The cooldown
//! is a timestamp comparison made on the next event, not a timer.
//!
//! Opening the breaker is reported as a `RecordingSuspended` fault and the
//! resume as a success, both under `Operation::Navigation`.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use waypoint_error::FaultKind;
use waypoint_routes::Untrackable;
use waypoint_types::{Clock, EventContext, Operation, TelemetryObserver, UserId, WaypointEvent};

use crate::config::ObserverSettings;
use crate::service::{PageMemoryService, RecordOutcome, RecordRejection};

/// What the observer did with one navigation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedNavigation {
    Unauthenticated,
    /// Same path as the last one recorded.
    Duplicate,
    /// Circuit breaker open.
    CoolingDown,
    /// Dropped by the cheap namespace pre-filter.
    Filtered(Untrackable),
    Recorded,
    Rejected(RecordRejection),
    Failed(FaultKind),
}

#[derive(Debug, Default)]
struct ObserverState {
    user: Option<UserId>,
    last_path: Option<String>,
    error_count: u32,
    last_error_ms: Option<i64>,
}

pub struct NavigationObserver {
    service: Arc<PageMemoryService>,
    settings: ObserverSettings,
    clock: Arc<dyn Clock>,
    telemetry: Arc<dyn TelemetryObserver>,
    state: Mutex<ObserverState>,
}

impl std::fmt::Debug for NavigationObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationObserver")
            .field("settings", &self.settings)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl NavigationObserver {
    #[must_use]
    pub fn new(
        service: Arc<PageMemoryService>,
        settings: ObserverSettings,
        clock: Arc<dyn Clock>,
        telemetry: Arc<dyn TelemetryObserver>,
    ) -> Self {
        Self {
            service,
            settings,
            clock,
            telemetry,
            state: Mutex::new(ObserverState::default()),
        }
    }

    /// Handle one location change.
    pub fn on_navigate(&self, path: &str) -> ObservedNavigation {
        let Some(identity) = self.service.current_identity() else {
            return ObservedNavigation::Unauthenticated;
        };

        let now = self.clock.now_ms();
        let context = || {
            EventContext::new(Operation::Navigation)
                .with_user(identity.user_id.as_str())
                .with_path(path)
        };
        let resumed = {
            let mut state = self.state.lock();
            if state.user.as_ref() != Some(&identity.user_id) {
                state.user = Some(identity.user_id.clone());
                state.last_path = None;
            }
            if state.last_path.as_deref() == Some(path) {
                return ObservedNavigation::Duplicate;
            }
            if state.error_count > self.settings.error_threshold {
                let since = state.last_error_ms.map_or(i64::MAX, |t| now.saturating_sub(t));
                if since < self.settings.cooldown_ms {
                    debug!(
                        target: "waypoint.core::observer",
                        errors = state.error_count,
                        "recording suspended"
                    );
                    return ObservedNavigation::CoolingDown;
                }
                info!(target: "waypoint.core::observer", "cooldown elapsed; recording resumed");
                state.error_count = 0;
                state.last_error_ms = None;
                true
            } else {
                false
            }
        };
        if resumed {
            self.telemetry.on_event(&WaypointEvent::success(context(), now));
        }

        if let Err(reason) = self.service.tracking().check(path) {
            return ObservedNavigation::Filtered(reason);
        }

        // The lock is released while recording; the service emits telemetry.
        let outcome = self.service.record_page_outcome(path);
        let mut state = self.state.lock();
        match outcome {
            RecordOutcome::Stored => {
                state.last_path = Some(path.to_owned());
                state.error_count = 0;
                state.last_error_ms = None;
                ObservedNavigation::Recorded
            }
            RecordOutcome::Rejected(rejection) => ObservedNavigation::Rejected(rejection),
            RecordOutcome::Failed(kind) => {
                state.error_count = state.error_count.saturating_add(1);
                state.last_error_ms = Some(now);
                let errors = state.error_count;
                drop(state);
                warn!(
                    target: "waypoint.core::observer",
                    path,
                    kind = kind.as_str(),
                    errors,
                    "recording failed"
                );
                if errors == self.settings.error_threshold.saturating_add(1) {
                    let message = format!(
                        "{errors} recording failures; paused for {} ms",
                        self.settings.cooldown_ms
                    );
                    warn!(target: "waypoint.core::observer", %message, "recording suspended");
                    self.telemetry.on_event(&WaypointEvent::fault(
                        FaultKind::RecordingSuspended,
                        message,
                        context(),
                        now,
                    ));
                }
                ObservedNavigation::Failed(kind)
            }
        }
    }

    /// Consecutive recording failures since the last success or reset.
    #[must_use]
    pub fn error_count(&self) -> u32 {
        self.state.lock().error_count
    }

    #[must_use]
    pub fn last_recorded_path(&self) -> Option<String> {
        self.state.lock().last_path.clone()
    }

    /// Forget all in-memory state. Nothing persisted is touched.
    pub fn teardown(&self) {
        *self.state.lock() = ObserverState::default();
    }
}
