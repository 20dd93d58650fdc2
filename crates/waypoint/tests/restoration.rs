//! End-to-end restoration scenarios through the `Waypoint` facade.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use waypoint::{
    AuthSnapshot, AuthUser, BackendKind, DAY_MS, DEFAULT_KEY_PREFIX, EntryDecision, FaultKind,
    HealthStatus, MINUTE_MS, ManualClock, MemoryBackend, MockAuthProvider, ObservedNavigation,
    RecordingNavigator, Waypoint, WaypointConfig,
};

const NOW: i64 = 1_718_000_000_000;

struct Harness {
    waypoint: Waypoint,
    auth: Arc<MockAuthProvider>,
    clock: Arc<ManualClock>,
    backend: MemoryBackend,
}

impl Harness {
    fn new(auth: MockAuthProvider) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let backend = MemoryBackend::new();
        let auth = Arc::new(auth);
        let clock = Arc::new(ManualClock::new(NOW));
        let waypoint = Waypoint::with_backends(
            WaypointConfig::default(),
            auth.clone(),
            clock.clone(),
            Box::new(backend.clone()),
            None,
        )
        .unwrap();
        Self {
            waypoint,
            auth,
            clock,
            backend,
        }
    }

    fn key(user: &str) -> String {
        format!("{DEFAULT_KEY_PREFIX}{user}")
    }

    fn plant(&self, user: &str, path: &str, timestamp: i64, role: &str) {
        let record = json!({"path": path, "timestamp": timestamp, "role": role, "userId": user});
        self.backend.insert_raw(&Self::key(user), &record.to_string());
    }

    fn stored(&self, user: &str) -> Option<Value> {
        self.backend
            .raw(&Self::key(user))
            .map(|raw| serde_json::from_str(&raw).unwrap())
    }

    fn enter(&self, path: &str, query: &str) -> (EntryDecision, RecordingNavigator) {
        let nav = RecordingNavigator::at(path, query);
        let decision = self.waypoint.enter(&nav);
        (decision, nav)
    }
}

fn redirect(path: &str) -> EntryDecision {
    EntryDecision::Redirect(path.to_owned())
}

#[test]
fn scenario_a_signed_out_root_visit_preserves_page() {
    let h = Harness::new(MockAuthProvider::signed_out());
    h.plant("u-1", "/app/jobs/4", NOW - DAY_MS, "user");

    let (decision, nav) = h.enter("/", "");
    assert_eq!(decision, redirect("/login"));
    assert_eq!(nav.last_redirect().as_deref(), Some("/login"));
    assert_eq!(h.auth.logout_calls(), 1);
    assert_eq!(h.stored("u-1").unwrap()["path"], "/app/jobs/4");
}

#[test]
fn scenario_b_explicit_logout_clears_page() {
    let h = Harness::new(MockAuthProvider::signed_in("u-1", "recruiter"));
    assert_eq!(h.waypoint.on_navigate("/app/candidates/9"), ObservedNavigation::Recorded);
    h.auth.sign_out();

    let (decision, _) = h.enter("/", "?logout=true");
    assert_eq!(decision, redirect("/login"));
    assert!(h.stored("u-1").is_none());
}

#[test]
fn scenario_b_with_user_still_reported() {
    let h = Harness::new(MockAuthProvider::signed_out());
    h.plant("u-7", "/app/reports", NOW, "admin");
    h.auth.set_snapshot(AuthSnapshot {
        is_authenticated: false,
        is_loading: false,
        user: Some(AuthUser::new("u-7", "admin")),
    });
    let (decision, _) = h.enter("/", "logout=true");
    assert_eq!(decision, redirect("/login"));
    assert!(h.stored("u-7").is_none());
}

#[test]
fn scenario_c_admin_returns_to_candidates() {
    let h = Harness::new(MockAuthProvider::signed_in("u-1", "admin"));
    h.plant("u-1", "/app/candidates", NOW - 2 * DAY_MS, "admin");

    let (decision, nav) = h.enter("/", "");
    assert_eq!(decision, redirect("/app/candidates"));
    assert_eq!(nav.redirects(), vec!["/app/candidates".to_owned()]);
    assert_eq!(h.auth.logout_calls(), 0);
    assert_eq!(h.waypoint.monitor().counters().successful_restorations, 1);
}

#[test]
fn scenario_d_traversal_goes_to_dashboard() {
    let h = Harness::new(MockAuthProvider::signed_in("u-1", "user"));
    h.plant("u-1", "/app/jobs/../settings", NOW, "user");

    let (decision, _) = h.enter("/", "");
    assert_eq!(decision, redirect("/app/jobs"));
    assert!(h.stored("u-1").is_none());
    assert_eq!(h.waypoint.monitor().counters().failed_restorations, 1);
}

#[test]
fn loading_auth_defers_the_decision() {
    let h = Harness::new(MockAuthProvider::signed_in("u-1", "admin"));
    h.auth.set_loading(true);
    let (decision, nav) = h.enter("/", "");
    assert_eq!(decision, EntryDecision::Loading);
    assert!(nav.redirects().is_empty());
}

#[test]
fn page_survives_logout_and_login() {
    let h = Harness::new(MockAuthProvider::signed_in("u-1", "recruiter"));
    assert_eq!(h.waypoint.on_navigate("/app/interviews/31"), ObservedNavigation::Recorded);

    h.auth.sign_out();
    assert_eq!(h.enter("/", "").0, redirect("/login"));

    h.auth.sign_in("u-1", "recruiter");
    assert_eq!(h.enter("/", "").0, redirect("/app/interviews/31"));
}

#[test]
fn accounts_do_not_share_pages() {
    let h = Harness::new(MockAuthProvider::signed_in("u-1", "admin"));
    assert!(h.waypoint.record_page("/app/settings/billing"));
    h.auth.sign_in("u-2", "admin");
    assert_eq!(h.waypoint.fetch_page(), None);
    assert_eq!(h.enter("/", "").0, redirect("/app/dashboard"));
}

#[test]
fn utility_name_deeper_in_a_route_is_restored() {
    let h = Harness::new(MockAuthProvider::signed_in("u-1", "recruiter"));
    assert_eq!(h.waypoint.on_navigate("/app/candidates/error"), ObservedNavigation::Recorded);
    assert_eq!(h.enter("/", "").0, redirect("/app/candidates/error"));
}

#[test]
fn expired_record_is_cleared() {
    let h = Harness::new(MockAuthProvider::signed_in("u-1", "admin"));
    h.plant("u-1", "/app/reports", NOW - 8 * DAY_MS, "admin");
    assert_eq!(
        h.waypoint.resolve_restorable_page(None).as_deref(),
        Some("/app/dashboard")
    );
    assert!(h.stored("u-1").is_none());
}

#[test]
fn future_timestamp_is_cleared() {
    let h = Harness::new(MockAuthProvider::signed_in("u-1", "user"));
    h.plant("u-1", "/app/jobs", NOW + 10 * MINUTE_MS, "user");
    assert_eq!(h.waypoint.resolve_restorable_page(None).as_deref(), Some("/app/jobs"));
    assert!(h.stored("u-1").is_none());
}

#[test]
fn role_drift_is_repaired() {
    let h = Harness::new(MockAuthProvider::signed_in("u-1", "recruiter"));
    h.plant("u-1", "/app/reports/pipeline", NOW - DAY_MS, "admin");
    assert_eq!(
        h.waypoint.resolve_restorable_page(None).as_deref(),
        Some("/app/reports/pipeline")
    );
    let stored = h.stored("u-1").unwrap();
    assert_eq!(stored["role"], "recruiter");
    assert_eq!(stored["path"], "/app/reports/pipeline");
    assert_eq!(stored["timestamp"], NOW);
}

#[test]
fn permission_denial_uses_rule_fallback() {
    let h = Harness::new(MockAuthProvider::signed_in("u-1", "user"));
    h.plant("u-1", "/app/team", NOW, "admin");
    let target = h.waypoint.resolve_restorable_page(None);
    // The /app/team rule's fallback, not the user's own dashboard.
    assert_eq!(target.as_deref(), Some("/app/dashboard"));
    assert!(h.stored("u-1").is_none());
    assert_eq!(h.waypoint.monitor().counters().permission_errors, 1);
}

#[test]
fn role_override_is_honoured() {
    let h = Harness::new(MockAuthProvider::signed_in("u-1", "admin"));
    h.plant("u-1", "/app/settings", NOW, "admin");
    assert_eq!(
        h.waypoint.resolve_restorable_page(Some("interviewer")).as_deref(),
        Some("/app/dashboard")
    );
    assert!(h.stored("u-1").is_none());
}

#[test]
fn proactive_role_change() {
    let h = Harness::new(MockAuthProvider::signed_in("u-1", "admin"));
    assert!(h.waypoint.record_page("/app/candidates/2"));
    h.auth.set_role("interviewer");
    h.waypoint.on_role_changed("interviewer", "admin");
    assert_eq!(h.stored("u-1").unwrap()["role"], "interviewer");

    h.auth.set_role("user");
    h.waypoint.on_role_changed("user", "interviewer");
    assert!(h.stored("u-1").is_none());
}

#[test]
fn idempotent_navigation_writes_once() {
    let h = Harness::new(MockAuthProvider::signed_in("u-1", "admin"));
    let before = h.backend.write_attempts();
    assert_eq!(h.waypoint.on_navigate("/app/jobs/1"), ObservedNavigation::Recorded);
    assert_eq!(h.waypoint.on_navigate("/app/jobs/1"), ObservedNavigation::Duplicate);
    assert_eq!(h.backend.write_attempts(), before + 1);
}

#[test]
fn cooldown_after_repeated_failures() {
    let h = Harness::new(MockAuthProvider::signed_in("u-1", "admin"));
    h.backend.set_reject_writes(true);

    for i in 0..11 {
        assert_eq!(
            h.waypoint.on_navigate(&format!("/app/candidates/{i}")),
            ObservedNavigation::Failed(FaultKind::StorageWriteFailure)
        );
    }
    let attempts = h.backend.write_attempts();
    assert_eq!(h.waypoint.on_navigate("/app/candidates/11"), ObservedNavigation::CoolingDown);
    assert_eq!(h.backend.write_attempts(), attempts);

    let health = h.waypoint.get_health_status();
    assert_eq!(health.status, HealthStatus::Critical);
    assert_eq!(health.counters.storage_errors, 11);
    let suspensions = h
        .waypoint
        .monitor()
        .recent_errors()
        .into_iter()
        .filter(|e| e.kind == FaultKind::RecordingSuspended)
        .count();
    assert_eq!(suspensions, 1);

    h.backend.set_reject_writes(false);
    h.clock.advance(Duration::from_secs(5 * 60 + 1));
    assert_eq!(h.waypoint.on_navigate("/app/candidates/12"), ObservedNavigation::Recorded);
    assert_eq!(h.backend.write_attempts(), attempts + 1);
    assert_eq!(h.stored("u-1").unwrap()["path"], "/app/candidates/12");
}

#[test]
fn corrupt_bytes_self_heal() {
    let h = Harness::new(MockAuthProvider::signed_in("u-1", "admin"));
    h.backend.insert_raw(&Harness::key("u-1"), "\u{0}\u{1}garbage");
    assert_eq!(h.waypoint.fetch_page(), None);
    assert!(h.backend.raw(&Harness::key("u-1")).is_none());
    assert_eq!(h.waypoint.monitor().counters().validation_errors, 1);
}

#[test]
fn diagnostics_through_facade() {
    let h = Harness::new(MockAuthProvider::signed_in("u-1", "admin"));
    assert!(h.waypoint.record_page("/app/team"));
    let report = h.waypoint.run_diagnostics("u-1", "user").unwrap();
    assert!(report.storage.round_trip);
    assert_eq!(report.record.path.as_deref(), Some("/app/team"));
    assert!(!report.record.is_clean());
    assert!(h.stored("u-1").is_some());

    assert!(h.waypoint.run_diagnostics("", "user").is_err());
}

#[test]
fn durable_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = WaypointConfig::from_toml_str(&format!(
        "[storage]\ndurable_dir = {:?}\n",
        dir.path().display().to_string()
    ))
    .unwrap();
    let auth = Arc::new(MockAuthProvider::signed_in("u-1", "interviewer"));
    let clock = Arc::new(ManualClock::new(NOW));

    let first = Waypoint::open_with_clock(config.clone(), auth.clone(), clock.clone()).unwrap();
    assert_eq!(first.active_backend(), Some(BackendKind::Durable));
    assert!(first.record_page("/app/calendar/week"));
    drop(first);

    let second = Waypoint::open_with_clock(config, auth, clock).unwrap();
    assert_eq!(
        second.resolve_restorable_page(None).as_deref(),
        Some("/app/calendar/week")
    );
}

#[test]
fn unusable_durable_dir_degrades_to_memory() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();

    let mut config = WaypointConfig::default();
    config.storage.durable_dir = Some(blocker);
    let waypoint = Waypoint::open_with_clock(
        config,
        Arc::new(MockAuthProvider::signed_in("u-1", "admin")),
        Arc::new(ManualClock::new(NOW)),
    )
    .unwrap();

    assert!(waypoint.is_available());
    assert_eq!(waypoint.active_backend(), Some(BackendKind::Volatile));
    assert!(waypoint.record_page("/app/jobs"));
    let errors = waypoint.monitor().recent_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, FaultKind::StorageUnavailable);
}

#[test]
fn invalid_config_is_rejected() {
    let mut config = WaypointConfig::default();
    config.routes.login_path = "login".to_owned();
    let err = Waypoint::open(config, Arc::new(MockAuthProvider::signed_out())).unwrap_err();
    assert!(err.to_string().contains("login_path"));
}
