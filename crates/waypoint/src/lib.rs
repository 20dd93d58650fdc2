//! Waypoint: restore a user's last page after reload or re-login.
//!
//! [`Waypoint`] wires the whole pipeline from a [`WaypointConfig`]:
//!
//! - a [`PersistentStore`] over a durable [`FileBackend`] with a volatile
//!   [`MemoryBackend`] fallback,
//! - the [`RoutePermissionTable`] and [`TrackingPolicy`],
//! - one shared [`HealthMonitor`] receiving every telemetry event,
//! - the [`PageMemoryService`], [`NavigationObserver`], and [`EntryRedirector`].
//!
//! ```ignore
//! let waypoint = Waypoint::open(WaypointConfig::load("waypoint.toml")?, auth)?;
//! waypoint.on_navigate("/app/candidates/42");
//! let decision = waypoint.enter(&navigator);
//! ```

use std::sync::Arc;

use tracing::info;

pub use waypoint_core::{
    DiagnosticsReport, EntryDecision, EntryRedirector, NavigationObserver, ObservedNavigation,
    ObserverSettings, PageMemoryService, RecordOutcome, RecordRejection, RestoreRejection,
    RetentionSettings, RouteSettings, StorageSettings, WaypointConfig, explicit_logout_requested,
};
pub use waypoint_error::{FaultKind, Result, WaypointError};
pub use waypoint_observability::{
    ErrorRecord, HealthCounters, HealthMonitor, HealthSnapshot, HealthStatus, MonitorConfig,
};
pub use waypoint_routes::{
    RoutePermissionTable, RouteTableConfig, TrackingPolicy, UnmatchedRoutePolicy,
};
pub use waypoint_store::{BackendKind, FileBackend, MemoryBackend, PersistentStore, StorageBackend};
pub use waypoint_types::{
    AuthProvider, AuthSnapshot, AuthUser, Clock, DAY_MS, DEFAULT_KEY_PREFIX, MINUTE_MS,
    ManualClock, MockAuthProvider, Navigator, RecordingNavigator, Role, SystemClock, UserId,
};

/// The assembled page-memory pipeline.
pub struct Waypoint {
    config: WaypointConfig,
    monitor: Arc<HealthMonitor>,
    service: Arc<PageMemoryService>,
    observer: NavigationObserver,
    redirector: EntryRedirector,
}

impl std::fmt::Debug for Waypoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waypoint")
            .field("service", &self.service)
            .field("observer", &self.observer)
            .finish_non_exhaustive()
    }
}

type Backends = (Box<dyn StorageBackend>, Option<Box<dyn StorageBackend>>);

fn default_backends(storage: &StorageSettings) -> Backends {
    let memory = || -> Box<dyn StorageBackend> {
        match storage.quota_bytes {
            Some(quota) => Box::new(MemoryBackend::with_quota(
                usize::try_from(quota).unwrap_or(usize::MAX),
            )),
            None => Box::new(MemoryBackend::new()),
        }
    };
    match &storage.durable_dir {
        Some(dir) => {
            let mut file = FileBackend::new(dir.clone());
            if let Some(quota) = storage.quota_bytes {
                file = file.with_quota(quota);
            }
            let durable: Box<dyn StorageBackend> = Box::new(file);
            (durable, Some(memory()))
        }
        None => (memory(), None),
    }
}

impl Waypoint {
    /// Build from `config` using the wall clock.
    pub fn open(config: WaypointConfig, auth: Arc<dyn AuthProvider>) -> Result<Self> {
        Self::open_with_clock(config, auth, Arc::new(SystemClock))
    }

    /// Build from `config` with an explicit clock.
    pub fn open_with_clock(
        config: WaypointConfig,
        auth: Arc<dyn AuthProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let (primary, fallback) = default_backends(&config.storage);
        Self::with_backends(config, auth, clock, primary, fallback)
    }

    /// Build from `config` over caller-supplied backends.
    pub fn with_backends(
        config: WaypointConfig,
        auth: Arc<dyn AuthProvider>,
        clock: Arc<dyn Clock>,
        primary: Box<dyn StorageBackend>,
        fallback: Option<Box<dyn StorageBackend>>,
    ) -> Result<Self> {
        let config = config.validated()?;
        let table = Arc::new(RoutePermissionTable::from_config(config.routes.table.clone())?);
        let tracking = TrackingPolicy::new(config.routes.tracking.clone());
        let monitor = Arc::new(HealthMonitor::new(config.monitor.clone(), clock.clone()));

        let store = Arc::new(PersistentStore::open(
            primary,
            fallback,
            config.storage.store_options(),
            clock.clone(),
            monitor.clone(),
        ));
        let service = Arc::new(PageMemoryService::new(
            store,
            table,
            tracking,
            auth.clone(),
            clock.clone(),
            monitor.clone(),
            config.retention,
        ));
        let observer = NavigationObserver::new(
            service.clone(),
            config.observer,
            clock.clone(),
            monitor.clone(),
        );
        let redirector = EntryRedirector::new(
            service.clone(),
            auth,
            clock,
            monitor.clone(),
            config.routes.login_path.clone(),
        );

        info!(
            target: "waypoint::open",
            backend = service.store().active_backend().map_or("none", BackendKind::as_str),
            "waypoint ready"
        );
        Ok(Self {
            config,
            monitor,
            service,
            observer,
            redirector,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &WaypointConfig {
        &self.config
    }

    #[must_use]
    pub fn service(&self) -> &PageMemoryService {
        &self.service
    }

    #[must_use]
    pub const fn observer(&self) -> &NavigationObserver {
        &self.observer
    }

    #[must_use]
    pub const fn redirector(&self) -> &EntryRedirector {
        &self.redirector
    }

    #[must_use]
    pub fn monitor(&self) -> &HealthMonitor {
        &self.monitor
    }

    pub fn record_page(&self, path: &str) -> bool {
        self.service.record_page(path)
    }

    pub fn fetch_page(&self) -> Option<String> {
        self.service.fetch_page()
    }

    pub fn clear_page(&self) {
        self.service.clear_page();
    }

    /// Validated restoration target; an unusable override is ignored.
    pub fn resolve_restorable_page(&self, role_override: Option<&str>) -> Option<String> {
        let role = role_override.and_then(|r| Role::new(r).ok());
        self.service.resolve_restorable_page(role.as_ref())
    }

    /// Re-check the stored page after a role change. Unusable roles are ignored.
    pub fn on_role_changed(&self, new_role: &str, old_role: &str) {
        if let (Ok(new_role), Ok(old_role)) = (Role::new(new_role), Role::new(old_role)) {
            self.service.on_role_changed(&new_role, &old_role);
        }
    }

    /// Feed one location change to the navigation observer.
    pub fn on_navigate(&self, path: &str) -> ObservedNavigation {
        self.observer.on_navigate(path)
    }

    /// Decide and apply the entry redirect.
    pub fn enter(&self, navigator: &dyn Navigator) -> EntryDecision {
        self.redirector.run(navigator)
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.service.is_available()
    }

    #[must_use]
    pub fn active_backend(&self) -> Option<BackendKind> {
        self.service.store().active_backend()
    }

    pub fn run_diagnostics(&self, user_id: &str, role: &str) -> Result<DiagnosticsReport> {
        let user_id = UserId::new(user_id)?;
        let role = Role::new(role)?;
        Ok(waypoint_core::run_diagnostics(
            &self.service,
            &self.monitor,
            &user_id,
            &role,
        ))
    }

    #[must_use]
    pub fn get_health_status(&self) -> HealthSnapshot {
        self.monitor.get_health_status()
    }

    /// Drop observer memory. Stored pages are untouched.
    pub fn teardown(&self) {
        self.observer.teardown();
    }
}
