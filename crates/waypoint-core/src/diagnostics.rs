//! On-demand diagnostic sweep.

use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;
use waypoint_error::{Result, WaypointError};
use waypoint_observability::{HealthMonitor, HealthSnapshot};
use waypoint_routes::SAMPLE_PATHS;
use waypoint_types::{EventContext, Operation, PageState, Role, Staleness, UserId};

use crate::service::PageMemoryService;

/// Key used for the diagnostic round trip.
pub const DIAGNOSTIC_KEY: &str = "waypoint.__diagnostics__";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageCheck {
    pub available: bool,
    pub backend: Option<&'static str>,
    pub round_trip: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionSample {
    pub path: &'static str,
    pub allowed: bool,
    /// Where the role would be sent instead, when denied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

/// Problem found in the stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum RecordProblem {
    Corrupt { detail: String },
    OwnershipMismatch { owner: String },
    Expired { age_ms: i64 },
    FutureDated { ahead_ms: i64 },
    RoleDrift { recorded: String },
    NotRestorable { detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordCheck {
    pub present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub problems: Vec<RecordProblem>,
}

impl RecordCheck {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Result of [`run_diagnostics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticsReport {
    pub generated_at_ms: i64,
    pub user_id: String,
    pub role: String,
    pub storage: StorageCheck,
    pub permissions: Vec<PermissionSample>,
    pub record: RecordCheck,
    pub health: HealthSnapshot,
}

impl DiagnosticsReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn check_storage(service: &PageMemoryService) -> StorageCheck {
    let store = service.store();
    let sentinel = json!({ "diagnostic": service.now_ms() });
    let round_trip = store.set(DIAGNOSTIC_KEY, &sentinel)
        && store.get::<Value>(DIAGNOSTIC_KEY).as_ref() == Some(&sentinel)
        && store.remove(DIAGNOSTIC_KEY);
    StorageCheck {
        available: store.is_available(),
        backend: store.active_backend().map(|b| b.as_str()),
        round_trip,
    }
}

fn sample_permissions(service: &PageMemoryService, role: &Role) -> Vec<PermissionSample> {
    let table = service.table();
    SAMPLE_PATHS
        .iter()
        .map(|&path| {
            let allowed = table.has_permission(path, role);
            PermissionSample {
                path,
                allowed,
                redirect: (!allowed).then(|| table.redirect_for(path, role)),
            }
        })
        .collect()
}

fn decode(raw: &str) -> Result<PageState> {
    let value: Value = serde_json::from_str(raw)?;
    PageState::from_value(value).map_err(WaypointError::from)
}

/// Inspect the stored record without modifying it.
fn inspect_record(service: &PageMemoryService, user_id: &UserId, role: &Role) -> RecordCheck {
    let key = service.key_for(user_id);
    let Some(raw) = service.store().peek(key.as_str()) else {
        return RecordCheck {
            present: false,
            path: None,
            problems: Vec::new(),
        };
    };

    let state = match decode(&raw) {
        Ok(state) => state,
        Err(err) => {
            return RecordCheck {
                present: true,
                path: None,
                problems: vec![RecordProblem::Corrupt {
                    detail: err.to_string(),
                }],
            };
        }
    };

    let mut problems = Vec::new();
    if state.user_id() != user_id {
        problems.push(RecordProblem::OwnershipMismatch {
            owner: state.user_id().to_string(),
        });
    }
    let retention = service.retention();
    match state.check_freshness(
        service.now_ms(),
        retention.max_age_ms,
        retention.future_tolerance_ms,
    ) {
        Ok(()) => {}
        Err(Staleness::Expired { age_ms }) => problems.push(RecordProblem::Expired { age_ms }),
        Err(Staleness::FutureDated { ahead_ms }) => {
            problems.push(RecordProblem::FutureDated { ahead_ms });
        }
    }
    if let Err(rejection) = service.check_restorable(state.path(), role, Some(state.role())) {
        problems.push(RecordProblem::NotRestorable {
            detail: rejection.describe(),
        });
    } else if state.role() != role {
        problems.push(RecordProblem::RoleDrift {
            recorded: state.role().to_string(),
        });
    }

    RecordCheck {
        present: true,
        path: Some(state.path().to_owned()),
        problems,
    }
}

/// Round-trip the store, check sample permissions for `role`, inspect the stored
/// record for `user_id`, and bundle the current health snapshot.
pub fn run_diagnostics(
    service: &PageMemoryService,
    monitor: &HealthMonitor,
    user_id: &UserId,
    role: &Role,
) -> DiagnosticsReport {
    let storage = check_storage(service);
    let permissions = sample_permissions(service, role);
    let record = inspect_record(service, user_id, role);
    service.emit_success(EventContext::new(Operation::Diagnostics).with_user(user_id.as_str()));
    let health = monitor.get_health_status();

    info!(
        target: "waypoint.core::diagnostics",
        user = user_id.as_str(),
        round_trip = storage.round_trip,
        record_problems = record.problems.len(),
        status = health.status.as_str(),
        "diagnostics complete"
    );

    DiagnosticsReport {
        generated_at_ms: service.now_ms(),
        user_id: user_id.to_string(),
        role: role.to_string(),
        storage,
        permissions,
        record,
        health,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use waypoint_observability::{HealthStatus, MonitorConfig};
    use waypoint_types::{DAY_MS, MockAuthProvider};

    use super::*;
    use crate::service::tests::{Fixture, NOW};

    fn monitor(fx: &Fixture) -> HealthMonitor {
        HealthMonitor::new(MonitorConfig::default(), fx.clock.clone())
    }

    fn ids(user: &str, role: &str) -> (UserId, Role) {
        (UserId::new(user).unwrap(), Role::new(role).unwrap())
    }

    #[test]
    fn clean_sweep() {
        let fx = Fixture::new(MockAuthProvider::signed_in("u-1", "admin"));
        assert!(fx.service.record_page("/app/candidates"));
        let (user, role) = ids("u-1", "admin");

        let report = run_diagnostics(&fx.service, &monitor(&fx), &user, &role);
        assert!(report.storage.available);
        assert!(report.storage.round_trip);
        assert_eq!(report.storage.backend, Some("volatile"));
        assert!(fx.backend.raw(DIAGNOSTIC_KEY).is_none());
        assert_eq!(report.permissions.len(), SAMPLE_PATHS.len());
        assert!(report.permissions.iter().all(|p| p.allowed));
        assert!(report.record.present);
        assert!(report.record.is_clean());
        assert_eq!(report.health.status, HealthStatus::Healthy);
    }

    #[test]
    fn reports_denied_samples_with_redirects() {
        let fx = Fixture::new(MockAuthProvider::signed_in("u-1", "user"));
        let (user, role) = ids("u-1", "user");
        let report = run_diagnostics(&fx.service, &monitor(&fx), &user, &role);
        let team = report.permissions.iter().find(|p| p.path == "/app/team").unwrap();
        assert!(!team.allowed);
        assert_eq!(team.redirect.as_deref(), Some("/app/dashboard"));
        assert!(!report.record.present);
    }

    #[test]
    fn inspects_without_modifying() {
        let fx = Fixture::new(MockAuthProvider::signed_in("u-1", "recruiter"));
        fx.plant("u-1", "/app/settings", NOW - 9 * DAY_MS, "admin");
        let (user, role) = ids("u-1", "recruiter");
        let report = run_diagnostics(&fx.service, &monitor(&fx), &user, &role);
        assert_eq!(
            report.record.problems,
            vec![
                RecordProblem::Expired { age_ms: 9 * DAY_MS },
                RecordProblem::NotRestorable {
                    detail: "stored path is not permitted after a role change".to_owned()
                },
            ]
        );
        assert!(fx.stored("u-1").is_some());
    }

    #[test]
    fn corrupt_and_foreign_records() {
        let fx = Fixture::new(MockAuthProvider::signed_in("u-1", "admin"));
        fx.backend.insert_raw(&Fixture::key("u-1"), "not json");
        let (user, role) = ids("u-1", "admin");
        let report = run_diagnostics(&fx.service, &monitor(&fx), &user, &role);
        assert!(matches!(report.record.problems[..], [RecordProblem::Corrupt { .. }]));
        assert!(fx.backend.raw(&Fixture::key("u-1")).is_some());

        let foreign = json!({"path": "/app/jobs", "timestamp": NOW, "role": "admin", "userId": "u-9"});
        fx.backend.insert_raw(&Fixture::key("u-1"), &foreign.to_string());
        let report = run_diagnostics(&fx.service, &monitor(&fx), &user, &role);
        assert_eq!(
            report.record.problems,
            vec![RecordProblem::OwnershipMismatch { owner: "u-9".to_owned() }]
        );
    }

    #[test]
    fn report_exports_as_json() {
        let fx = Fixture::new(MockAuthProvider::signed_in("u-1", "admin"));
        fx.plant("u-1", "/app/jobs", NOW, "recruiter");
        let (user, role) = ids("u-1", "admin");
        let monitor = Arc::new(monitor(&fx));
        let report = run_diagnostics(&fx.service, &monitor, &user, &role);
        let json: Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["storage"]["round_trip"], true);
        assert_eq!(json["record"]["problems"][0]["problem"], "role_drift");
        assert_eq!(json["health"]["status"], "healthy");
    }
}
