//! Per-user page memory.
//!
//! One [`PageState`] per user lives under a [`StorageKey`]. Writes happen
//! on navigation through [`PageMemoryService::record_page`]; reads go
//! through either the cheap ownership-checked [`PageMemoryService::fetch_page`]
//! or the validating [`PageMemoryService::resolve_restorable_page`], which
//! also repairs role drift in place. No public operation returns an error:
//! every fault ends in a fallback value plus a telemetry event.
//!
//! Multiple processes sharing one durable backend may interleave writes to
//! the same user key. The last write wins; the value is advisory.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};
use waypoint_error::{FaultKind, Result, WaypointError};
use waypoint_routes::{
    PathRejection, RoutePermissionTable, SanitizedPath, TrackingPolicy, UnmatchedRoutePolicy,
    Untrackable,
};
use waypoint_store::PersistentStore;
use waypoint_types::{
    AuthProvider, Clock, EventContext, Identity, Operation, PageState, Role, StorageKey,
    TelemetryObserver, UserId, WaypointEvent,
};

use crate::config::RetentionSettings;

/// Why a navigation was not recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordRejection {
    /// No authenticated user with both an id and a role.
    NotAuthenticated,
    MalformedPath(PathRejection),
    Untrackable(Untrackable),
    /// The current role may not visit the path.
    PermissionDenied,
}

/// Result of [`PageMemoryService::record_page_outcome`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Stored,
    Rejected(RecordRejection),
    Failed(FaultKind),
}

impl RecordOutcome {
    #[must_use]
    pub const fn is_stored(&self) -> bool {
        matches!(self, Self::Stored)
    }
}

/// Why a stored path may not be restored for a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreRejection {
    /// Recorded under another role that could see it; the current one cannot.
    RoleMismatch,
    /// Recorded under the current role, which can no longer see it.
    InsufficientPermission,
    MalformedPath(PathRejection),
    /// The path is no longer a known, trackable application route.
    RouteNotFound,
}

impl RestoreRejection {
    #[must_use]
    pub const fn fault_kind(&self) -> FaultKind {
        match self {
            Self::MalformedPath(_) => FaultKind::MalformedPath,
            Self::RoleMismatch | Self::InsufficientPermission | Self::RouteNotFound => {
                FaultKind::PermissionDenied
            }
        }
    }

    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::RoleMismatch => "stored path is not permitted after a role change".to_owned(),
            Self::InsufficientPermission => "role may no longer access stored path".to_owned(),
            Self::MalformedPath(rejection) => format!("stored path rejected: {rejection}"),
            Self::RouteNotFound => "stored path is not a known route".to_owned(),
        }
    }

    /// The error reported when `path` is discarded for `role`.
    #[must_use]
    pub fn to_error(&self, path: &str, role: &Role) -> WaypointError {
        match self {
            Self::MalformedPath(rejection) => rejection.clone().into(),
            Self::RoleMismatch | Self::InsufficientPermission | Self::RouteNotFound => {
                WaypointError::PermissionDenied {
                    path: path.to_owned(),
                    role: role.to_string(),
                }
            }
        }
    }
}

/// Page-memory state machine over a [`PersistentStore`].
pub struct PageMemoryService {
    store: Arc<PersistentStore>,
    table: Arc<RoutePermissionTable>,
    tracking: TrackingPolicy,
    auth: Arc<dyn AuthProvider>,
    clock: Arc<dyn Clock>,
    telemetry: Arc<dyn TelemetryObserver>,
    retention: RetentionSettings,
    last_user: Mutex<Option<UserId>>,
}

impl std::fmt::Debug for PageMemoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageMemoryService")
            .field("store", &self.store)
            .field("tracking", &self.tracking)
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

impl PageMemoryService {
    #[must_use]
    pub fn new(
        store: Arc<PersistentStore>,
        table: Arc<RoutePermissionTable>,
        tracking: TrackingPolicy,
        auth: Arc<dyn AuthProvider>,
        clock: Arc<dyn Clock>,
        telemetry: Arc<dyn TelemetryObserver>,
        retention: RetentionSettings,
    ) -> Self {
        Self {
            store,
            table,
            tracking,
            auth,
            clock,
            telemetry,
            retention,
            last_user: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn store(&self) -> &PersistentStore {
        &self.store
    }

    #[must_use]
    pub fn table(&self) -> &RoutePermissionTable {
        &self.table
    }

    #[must_use]
    pub const fn tracking(&self) -> &TrackingPolicy {
        &self.tracking
    }

    #[must_use]
    pub const fn retention(&self) -> &RetentionSettings {
        &self.retention
    }

    #[must_use]
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.store.is_available()
    }

    /// Identity of the authenticated user, if complete.
    #[must_use]
    pub fn current_identity(&self) -> Option<Identity> {
        self.auth.snapshot().identity()
    }

    fn current_user_id(&self) -> Option<UserId> {
        let snapshot = self.auth.snapshot();
        if !snapshot.is_authenticated {
            return None;
        }
        snapshot.user.and_then(|u| UserId::new(u.user_id).ok())
    }

    /// The user whose record a logout should clear: the one the auth
    /// provider still reports, else the last user this service served.
    #[must_use]
    pub fn last_known_user(&self) -> Option<UserId> {
        self.auth
            .snapshot()
            .user
            .and_then(|u| UserId::new(u.user_id).ok())
            .or_else(|| self.last_user.lock().clone())
    }

    fn remember(&self, user_id: &UserId) {
        let mut last = self.last_user.lock();
        if last.as_ref() != Some(user_id) {
            *last = Some(user_id.clone());
        }
    }

    #[must_use]
    pub fn key_for(&self, user_id: &UserId) -> StorageKey {
        StorageKey::for_user(&self.store.options().key_prefix, user_id)
    }

    pub(crate) fn emit_success(&self, context: EventContext) {
        self.telemetry
            .on_event(&WaypointEvent::success(context, self.clock.now_ms()));
    }

    fn emit_fault(&self, kind: FaultKind, message: impl Into<String>, context: EventContext) {
        self.telemetry.on_event(&WaypointEvent::fault(
            kind,
            message,
            context,
            self.clock.now_ms(),
        ));
    }

    /// Record `path` as the current user's last page.
    pub fn record_page(&self, path: &str) -> bool {
        self.record_page_outcome(path).is_stored()
    }

    /// Record `path`, reporting exactly why it was or was not stored.
    pub fn record_page_outcome(&self, path: &str) -> RecordOutcome {
        let Some(Identity { user_id, role }) = self.current_identity() else {
            debug!(target: "waypoint.core::record", path, "no authenticated identity");
            return RecordOutcome::Rejected(RecordRejection::NotAuthenticated);
        };
        self.remember(&user_id);
        let context = || {
            EventContext::new(Operation::Record)
                .with_user(user_id.as_str())
                .with_path(path)
        };

        let sanitized = match self.table.sanitize(path, &role) {
            Ok(sanitized) => sanitized,
            Err(rejection) => {
                debug!(target: "waypoint.core::record", path, %rejection, "path rejected");
                let err = WaypointError::from(rejection.clone());
                self.emit_fault(err.fault_kind(), err.to_string(), context());
                return RecordOutcome::Rejected(RecordRejection::MalformedPath(rejection));
            }
        };
        if let Err(reason) = self.tracking.check(sanitized.as_str()) {
            debug!(target: "waypoint.core::record", path, ?reason, "path not tracked");
            return RecordOutcome::Rejected(RecordRejection::Untrackable(reason));
        }
        if !self.table.has_permission(sanitized.as_str(), &role) {
            return RecordOutcome::Rejected(RecordRejection::PermissionDenied);
        }

        let now = self.clock.now_ms();
        let state = match PageState::new(sanitized.into_string(), now, role, user_id.clone()) {
            Ok(state) => state,
            Err(defect) => {
                self.emit_fault(FaultKind::CorruptRecord, defect.to_string(), context());
                return RecordOutcome::Failed(FaultKind::CorruptRecord);
            }
        };

        let key = self.key_for(&user_id);
        if self.store.set(key.as_str(), &state) {
            debug!(
                target: "waypoint.core::record",
                user = user_id.as_str(),
                path = state.path(),
                "page recorded"
            );
            self.emit_success(context());
            RecordOutcome::Stored
        } else if self.store.is_available() {
            RecordOutcome::Failed(FaultKind::StorageWriteFailure)
        } else {
            RecordOutcome::Failed(FaultKind::StorageUnavailable)
        }
    }

    /// Decode the record stored for `user_id`, checking ownership.
    fn load_record(&self, user_id: &UserId) -> Result<Option<PageState>> {
        let key = self.key_for(user_id);
        let Some(value) = self.store.get::<Value>(key.as_str()) else {
            return Ok(None);
        };
        let state = PageState::from_value(value)?;
        if state.user_id() != user_id {
            return Err(WaypointError::OwnershipMismatch {
                owner: state.user_id().to_string(),
                requester: user_id.to_string(),
            });
        }
        Ok(Some(state))
    }

    fn discard(
        &self,
        user_id: &UserId,
        operation: Operation,
        kind: FaultKind,
        message: String,
        path: Option<&str>,
    ) {
        warn!(
            target: "waypoint.core::restore",
            user = user_id.as_str(),
            operation = operation.as_str(),
            kind = kind.as_str(),
            %message,
            "stored page discarded"
        );
        self.store.remove(self.key_for(user_id).as_str());
        let mut context = EventContext::new(operation).with_user(user_id.as_str());
        if let Some(path) = path {
            context = context.with_path(path);
        }
        self.emit_fault(kind, message, context);
    }

    fn discard_rejection(
        &self,
        user_id: &UserId,
        operation: Operation,
        rejection: &RestoreRejection,
        path: &str,
        role: &Role,
    ) {
        debug!(target: "waypoint.core::restore", path, reason = %rejection.describe(), "not restorable");
        let err = rejection.to_error(path, role);
        self.discard(user_id, operation, err.fault_kind(), err.to_string(), Some(path));
    }

    fn discard_error(&self, user_id: &UserId, operation: Operation, err: &WaypointError) {
        self.discard(user_id, operation, err.fault_kind(), err.to_string(), None);
    }

    /// Stored path for the current user, without role validation.
    ///
    /// A record owned by another user, or one that does not decode, is
    /// deleted and `None` returned.
    pub fn fetch_page(&self) -> Option<String> {
        let user_id = self.current_user_id()?;
        self.remember(&user_id);
        match self.load_record(&user_id) {
            Ok(state) => state.map(|s| s.path().to_owned()),
            Err(err) => {
                self.discard_error(&user_id, Operation::Fetch, &err);
                None
            }
        }
    }

    /// Delete the current user's record.
    pub fn clear_page(&self) {
        if let Some(user_id) = self.current_user_id() {
            self.clear_page_for(&user_id);
        }
    }

    /// Delete the record stored for `user_id`.
    pub fn clear_page_for(&self, user_id: &UserId) -> bool {
        let removed = self.store.remove(self.key_for(user_id).as_str());
        if removed {
            debug!(target: "waypoint.core::clear", user = user_id.as_str(), "page cleared");
            self.emit_success(EventContext::new(Operation::Clear).with_user(user_id.as_str()));
        }
        removed
    }

    /// Decide whether `path` may be restored for `role`.
    ///
    /// `recorded_role` is the role stored with the path, used to tell a role
    /// change apart from a permission change.
    pub fn check_restorable(
        &self,
        path: &str,
        role: &Role,
        recorded_role: Option<&Role>,
    ) -> std::result::Result<SanitizedPath, RestoreRejection> {
        let sanitized = self
            .table
            .sanitize(path, role)
            .map_err(RestoreRejection::MalformedPath)?;
        if self.tracking.check(sanitized.as_str()).is_err() {
            return Err(RestoreRejection::RouteNotFound);
        }
        if self.table.unmatched_policy() == UnmatchedRoutePolicy::Deny
            && !self.table.is_known_route(sanitized.as_str())
        {
            return Err(RestoreRejection::RouteNotFound);
        }
        if !self.table.has_permission(sanitized.as_str(), role) {
            return Err(if recorded_role.is_some_and(|r| r != role) {
                RestoreRejection::RoleMismatch
            } else {
                RestoreRejection::InsufficientPermission
            });
        }
        Ok(sanitized)
    }

    /// Where to send `role` when `path` was rejected for `rejection`.
    #[must_use]
    pub fn rejection_target(&self, rejection: &RestoreRejection, path: &str, role: &Role) -> String {
        match rejection {
            RestoreRejection::RoleMismatch | RestoreRejection::InsufficientPermission => {
                self.table.redirect_for(path, role)
            }
            RestoreRejection::MalformedPath(_) | RestoreRejection::RouteNotFound => {
                self.default_dashboard_for(role)
            }
        }
    }

    #[must_use]
    pub fn default_dashboard_for(&self, role: &Role) -> String {
        self.table.default_dashboard_for(role).to_owned()
    }

    /// Validated restoration target for the current user.
    ///
    /// Returns `None` when there is no usable role or nothing is stored.
    /// Any invalid record is deleted and replaced by a redirect: the rule
    /// fallback for permission problems, the role's dashboard otherwise.
    pub fn resolve_restorable_page(&self, role_override: Option<&Role>) -> Option<String> {
        let snapshot = self.auth.snapshot();
        if !snapshot.is_authenticated {
            return None;
        }
        let user = snapshot.user?;
        let user_id = UserId::new(user.user_id).ok()?;
        let role = match role_override {
            Some(role) => role.clone(),
            None => Role::new(user.role).ok()?,
        };
        self.remember(&user_id);

        match self.try_restore(&user_id, &role) {
            Ok(target) => target,
            Err(err) => {
                self.discard_error(&user_id, Operation::Restore, &err);
                Some(self.default_dashboard_for(&role))
            }
        }
    }

    fn try_restore(&self, user_id: &UserId, role: &Role) -> Result<Option<String>> {
        let state = match self.load_record(user_id) {
            Ok(Some(state)) => state,
            Ok(None) => return Ok(None),
            Err(err @ WaypointError::OwnershipMismatch { .. }) => {
                self.discard_error(user_id, Operation::Restore, &err);
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let now = self.clock.now_ms();
        if let Err(staleness) = state.check_freshness(
            now,
            self.retention.max_age_ms,
            self.retention.future_tolerance_ms,
        ) {
            debug!(target: "waypoint.core::restore", ?staleness, "stored page out of window");
            return Err(WaypointError::ExpiredRecord {
                timestamp_ms: state.timestamp(),
                now_ms: now,
            });
        }

        let sanitized = match self.check_restorable(state.path(), role, Some(state.role())) {
            Ok(sanitized) => sanitized,
            Err(rejection) => {
                let target = self.rejection_target(&rejection, state.path(), role);
                self.discard_rejection(user_id, Operation::Restore, &rejection, state.path(), role);
                return Ok(Some(target));
            }
        };

        if state.role() != role {
            self.repair(&state, role, now);
        }

        info!(
            target: "waypoint.core::restore",
            user = user_id.as_str(),
            path = sanitized.as_str(),
            "page restored"
        );
        self.emit_success(
            EventContext::new(Operation::Restore)
                .with_user(user_id.as_str())
                .with_path(sanitized.as_str()),
        );
        Ok(Some(sanitized.into_string()))
    }

    /// Rewrite `state` under `role` with a fresh timestamp.
    fn repair(&self, state: &PageState, role: &Role, now: i64) {
        let user_id = state.user_id();
        let repaired = state.repaired(role.clone(), now);
        let context = EventContext::new(Operation::Repair)
            .with_user(user_id.as_str())
            .with_path(state.path());
        if self.store.set(self.key_for(user_id).as_str(), &repaired) {
            info!(
                target: "waypoint.core::repair",
                user = user_id.as_str(),
                from = state.role().as_str(),
                to = role.as_str(),
                "stored role repaired"
            );
            self.emit_success(context);
        } else {
            warn!(
                target: "waypoint.core::repair",
                user = user_id.as_str(),
                "role repair write failed"
            );
        }
    }

    /// Re-check the stored page after the current user's role changed.
    ///
    /// A path the new role may not visit is cleared; otherwise the record
    /// is rewritten under the new role.
    pub fn on_role_changed(&self, new_role: &Role, old_role: &Role) {
        if new_role == old_role {
            return;
        }
        let Some(user_id) = self.current_user_id() else {
            return;
        };
        let state = match self.load_record(&user_id) {
            Ok(Some(state)) => state,
            Ok(None) => return,
            Err(err) => {
                self.discard_error(&user_id, Operation::RoleChange, &err);
                return;
            }
        };

        match self.check_restorable(state.path(), new_role, Some(state.role())) {
            Ok(_) => {
                if state.role() != new_role {
                    self.repair(&state, new_role, self.clock.now_ms());
                }
                self.emit_success(
                    EventContext::new(Operation::RoleChange).with_user(user_id.as_str()),
                );
            }
            Err(rejection) => self.discard_rejection(
                &user_id,
                Operation::RoleChange,
                &rejection,
                state.path(),
                new_role,
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use serde_json::json;
    use waypoint_routes::RouteTableConfig;
    use waypoint_store::{MemoryBackend, StoreOptions};
    use waypoint_types::{DAY_MS, DEFAULT_KEY_PREFIX, ManualClock, MockAuthProvider, TelemetryLog};

    use super::*;

    pub(crate) const NOW: i64 = 1_718_000_000_000;

    pub(crate) struct Fixture {
        pub backend: MemoryBackend,
        pub clock: Arc<ManualClock>,
        pub auth: Arc<MockAuthProvider>,
        pub log: Arc<TelemetryLog>,
        pub service: Arc<PageMemoryService>,
    }

    impl Fixture {
        pub(crate) fn new(auth: MockAuthProvider) -> Self {
            Self::with_table(auth, RoutePermissionTable::standard())
        }

        pub(crate) fn with_table(auth: MockAuthProvider, table: RoutePermissionTable) -> Self {
            let _ = tracing_subscriber::fmt().with_test_writer().try_init();
            let backend = MemoryBackend::new();
            let clock = Arc::new(ManualClock::new(NOW));
            let auth = Arc::new(auth);
            let log = Arc::new(TelemetryLog::new());
            let store = PersistentStore::open(
                Box::new(backend.clone()),
                None,
                StoreOptions::default(),
                clock.clone(),
                log.clone(),
            );
            let service = Arc::new(PageMemoryService::new(
                Arc::new(store),
                Arc::new(table),
                TrackingPolicy::default(),
                auth.clone(),
                clock.clone(),
                log.clone(),
                RetentionSettings::default(),
            ));
            Self {
                backend,
                clock,
                auth,
                log,
                service,
            }
        }

        pub(crate) fn key(user: &str) -> String {
            format!("{DEFAULT_KEY_PREFIX}{user}")
        }

        pub(crate) fn plant(&self, user: &str, path: &str, timestamp: i64, role: &str) {
            let record = json!({"path": path, "timestamp": timestamp, "role": role, "userId": user});
            self.backend.insert_raw(&Self::key(user), &record.to_string());
        }

        pub(crate) fn stored(&self, user: &str) -> Option<Value> {
            self.backend
                .raw(&Self::key(user))
                .map(|raw| serde_json::from_str(&raw).unwrap())
        }
    }

    fn role(name: &str) -> Role {
        Role::new(name).unwrap()
    }

    #[test]
    fn records_trackable_path() {
        let fx = Fixture::new(MockAuthProvider::signed_in("u-1", "admin"));
        assert!(fx.service.record_page("/app/candidates/7?tab=notes"));
        assert_eq!(
            fx.stored("u-1").unwrap(),
            json!({
                "path": "/app/candidates/7?tab=notes",
                "timestamp": NOW,
                "role": "admin",
                "userId": "u-1"
            })
        );
        assert_eq!(fx.log.successes(Operation::Record), 1);
    }

    #[test]
    fn record_rejections_write_nothing() {
        let fx = Fixture::new(MockAuthProvider::signed_in("u-1", "user"));
        let cases = [
            ("/app/../team", RecordOutcome::Rejected(RecordRejection::MalformedPath(PathRejection::TraversalSegment))),
            ("/login", RecordOutcome::Rejected(RecordRejection::Untrackable(Untrackable::AuthRoute))),
            ("/", RecordOutcome::Rejected(RecordRejection::Untrackable(Untrackable::Root))),
            ("/app/not-found", RecordOutcome::Rejected(RecordRejection::Untrackable(Untrackable::UtilityRoute))),
            ("/pricing", RecordOutcome::Rejected(RecordRejection::Untrackable(Untrackable::OutsideNamespace))),
            ("/app/team", RecordOutcome::Rejected(RecordRejection::PermissionDenied)),
        ];
        for (path, expected) in cases {
            assert_eq!(fx.service.record_page_outcome(path), expected, "{path}");
        }
        assert!(fx.stored("u-1").is_none());
        // Only the sanitizer rejection is reported as a fault.
        assert_eq!(fx.log.faults(), vec![FaultKind::MalformedPath]);
    }

    #[test]
    fn record_requires_complete_identity() {
        let fx = Fixture::new(MockAuthProvider::signed_out());
        assert_eq!(
            fx.service.record_page_outcome("/app/jobs"),
            RecordOutcome::Rejected(RecordRejection::NotAuthenticated)
        );
        fx.auth.sign_in("u-1", "");
        assert!(!fx.service.record_page("/app/jobs"));
        assert!(fx.backend.is_empty());
    }

    #[test]
    fn record_reports_storage_failure() {
        let fx = Fixture::new(MockAuthProvider::signed_in("u-1", "user"));
        fx.backend.set_reject_writes(true);
        assert_eq!(
            fx.service.record_page_outcome("/app/jobs"),
            RecordOutcome::Failed(FaultKind::StorageWriteFailure)
        );
        assert_eq!(fx.log.faults(), vec![FaultKind::StorageWriteFailure]);
    }

    #[test]
    fn fetch_returns_stored_path_without_role_checks() {
        let fx = Fixture::new(MockAuthProvider::signed_in("u-1", "user"));
        fx.plant("u-1", "/app/team", NOW - 30 * DAY_MS, "admin");
        assert_eq!(fx.service.fetch_page().as_deref(), Some("/app/team"));
        assert!(fx.stored("u-1").is_some());
    }

    #[test]
    fn fetch_discards_foreign_record() {
        let fx = Fixture::new(MockAuthProvider::signed_in("u-1", "admin"));
        let record = json!({"path": "/app/jobs", "timestamp": NOW, "role": "admin", "userId": "u-2"});
        fx.backend.insert_raw(&Fixture::key("u-1"), &record.to_string());

        assert_eq!(fx.service.fetch_page(), None);
        assert!(fx.stored("u-1").is_none());
        assert_eq!(fx.log.faults(), vec![FaultKind::OwnershipMismatch]);
    }

    #[test]
    fn clear_page_removes_record() {
        let fx = Fixture::new(MockAuthProvider::signed_in("u-1", "admin"));
        assert!(fx.service.record_page("/app/jobs"));
        fx.service.clear_page();
        assert!(fx.stored("u-1").is_none());
        assert_eq!(fx.service.fetch_page(), None);
    }

    #[test]
    fn resolve_with_nothing_stored_is_none() {
        let fx = Fixture::new(MockAuthProvider::signed_in("u-1", "admin"));
        assert_eq!(fx.service.resolve_restorable_page(None), None);
        assert!(fx.log.faults().is_empty());
    }

    #[test]
    fn resolve_without_usable_role_is_none() {
        let fx = Fixture::new(MockAuthProvider::signed_in("u-1", " "));
        fx.plant("u-1", "/app/jobs", NOW, "user");
        assert_eq!(fx.service.resolve_restorable_page(None), None);
        // The override supplies the missing role.
        assert_eq!(
            fx.service.resolve_restorable_page(Some(&role("user"))).as_deref(),
            Some("/app/jobs")
        );
    }

    #[test]
    fn resolve_returns_fresh_permitted_page() {
        let fx = Fixture::new(MockAuthProvider::signed_in("u-1", "admin"));
        fx.plant("u-1", "/app/candidates", NOW - DAY_MS, "admin");
        assert_eq!(
            fx.service.resolve_restorable_page(None).as_deref(),
            Some("/app/candidates")
        );
        assert_eq!(fx.log.successes(Operation::Restore), 1);
        assert_eq!(fx.stored("u-1").unwrap()["timestamp"], NOW - DAY_MS);
    }

    #[test]
    fn record_with_utility_name_below_a_route_is_restored() {
        let fx = Fixture::new(MockAuthProvider::signed_in("u-1", "user"));
        assert!(fx.service.record_page("/app/jobs/404"));
        assert_eq!(
            fx.service.resolve_restorable_page(None).as_deref(),
            Some("/app/jobs/404")
        );
        assert!(fx.log.faults().is_empty());
    }

    #[test]
    fn expired_record_falls_back_to_dashboard() {
        let fx = Fixture::new(MockAuthProvider::signed_in("u-1", "user"));
        fx.plant("u-1", "/app/jobs/3", NOW - 8 * DAY_MS, "user");
        assert_eq!(fx.service.resolve_restorable_page(None).as_deref(), Some("/app/jobs"));
        assert!(fx.stored("u-1").is_none());
        assert_eq!(fx.log.faults(), vec![FaultKind::ExpiredRecord]);
    }

    #[test]
    fn future_dated_record_is_cleared() {
        let fx = Fixture::new(MockAuthProvider::signed_in("u-1", "interviewer"));
        fx.plant("u-1", "/app/calendar", NOW + 10 * 60 * 1000, "interviewer");
        assert_eq!(
            fx.service.resolve_restorable_page(None).as_deref(),
            Some("/app/interviews")
        );
        assert!(fx.stored("u-1").is_none());

        // Small skew inside the tolerance is accepted.
        fx.plant("u-1", "/app/calendar", NOW + 4 * 60 * 1000, "interviewer");
        assert_eq!(
            fx.service.resolve_restorable_page(None).as_deref(),
            Some("/app/calendar")
        );
    }

    #[test]
    fn structurally_invalid_record_is_cleared() {
        let fx = Fixture::new(MockAuthProvider::signed_in("u-1", "admin"));
        fx.backend
            .insert_raw(&Fixture::key("u-1"), r#"{"path":"/app/jobs","timestamp":1}"#);
        assert_eq!(
            fx.service.resolve_restorable_page(None).as_deref(),
            Some("/app/dashboard")
        );
        assert!(fx.stored("u-1").is_none());
        assert_eq!(fx.log.faults(), vec![FaultKind::CorruptRecord]);
    }

    #[test]
    fn role_drift_is_repaired_in_place() {
        let fx = Fixture::new(MockAuthProvider::signed_in("u-1", "recruiter"));
        fx.plant("u-1", "/app/candidates/5", NOW - DAY_MS, "admin");
        fx.clock.advance(Duration::from_secs(1));

        assert_eq!(
            fx.service.resolve_restorable_page(None).as_deref(),
            Some("/app/candidates/5")
        );
        let stored = fx.stored("u-1").unwrap();
        assert_eq!(stored["role"], "recruiter");
        assert_eq!(stored["timestamp"], NOW + 1000);
        assert_eq!(fx.log.successes(Operation::Repair), 1);
    }

    #[test]
    fn role_change_denial_uses_rule_fallback() {
        let fx = Fixture::new(MockAuthProvider::signed_in("u-1", "user"));
        fx.plant("u-1", "/app/team", NOW, "admin");
        // The rule's fallback, not the user's own dashboard (/app/jobs).
        assert_eq!(
            fx.service.resolve_restorable_page(None).as_deref(),
            Some("/app/dashboard")
        );
        assert!(fx.stored("u-1").is_none());
        assert_eq!(fx.log.faults(), vec![FaultKind::PermissionDenied]);
    }

    #[test]
    fn discarded_records_report_typed_errors() {
        let fx = Fixture::new(MockAuthProvider::signed_in("u-1", "user"));
        fx.plant("u-1", "/app/team", NOW, "admin");
        assert_eq!(
            fx.service.resolve_restorable_page(None).as_deref(),
            Some("/app/dashboard")
        );
        fx.plant("u-1", "/app/%3Cx%3E", NOW, "user");
        fx.service.resolve_restorable_page(None);

        let faults: Vec<(FaultKind, String)> = fx
            .log
            .events()
            .into_iter()
            .filter_map(|event| match event {
                WaypointEvent::Fault { kind, message, .. } => Some((kind, message)),
                WaypointEvent::Success { .. } => None,
            })
            .collect();
        assert_eq!(
            faults,
            vec![
                (
                    FaultKind::PermissionDenied,
                    "role 'user' may not access '/app/team'".to_owned()
                ),
                (
                    FaultKind::MalformedPath,
                    "malformed path: path contains an encoded angle bracket".to_owned()
                ),
            ]
        );
    }

    #[test]
    fn rejection_reasons_map_to_targets() {
        let fx = Fixture::new(MockAuthProvider::signed_in("u-1", "recruiter"));
        let recruiter = role("recruiter");
        let admin = role("admin");

        let err = fx
            .service
            .check_restorable("/app/candidates/import", &recruiter, Some(&admin))
            .unwrap_err();
        assert_eq!(err, RestoreRejection::RoleMismatch);
        assert_eq!(
            fx.service.rejection_target(&err, "/app/candidates/import", &recruiter),
            "/app/candidates"
        );

        let err = fx
            .service
            .check_restorable("/app/settings", &recruiter, Some(&recruiter))
            .unwrap_err();
        assert_eq!(err, RestoreRejection::InsufficientPermission);

        let err = fx.service.check_restorable("/login", &recruiter, None).unwrap_err();
        assert_eq!(err, RestoreRejection::RouteNotFound);
        assert_eq!(
            fx.service.rejection_target(&err, "/login", &recruiter),
            "/app/dashboard"
        );

        let err = fx
            .service
            .check_restorable("/app/%3Cscript%3E", &recruiter, None)
            .unwrap_err();
        assert_eq!(
            err,
            RestoreRejection::MalformedPath(PathRejection::EncodedAngleBracket)
        );
    }

    #[test]
    fn traversal_in_stored_path_goes_to_dashboard() {
        let fx = Fixture::new(MockAuthProvider::signed_in("u-1", "user"));
        fx.plant("u-1", "/app/jobs/../team", NOW, "user");
        assert_eq!(fx.service.resolve_restorable_page(None).as_deref(), Some("/app/jobs"));
        assert!(fx.stored("u-1").is_none());
        assert_eq!(fx.log.faults(), vec![FaultKind::MalformedPath]);
    }

    #[test]
    fn deny_policy_rejects_unknown_routes() {
        let table = RoutePermissionTable::from_config(RouteTableConfig {
            unmatched: UnmatchedRoutePolicy::Deny,
            ..RouteTableConfig::standard()
        })
        .unwrap();
        let fx = Fixture::with_table(MockAuthProvider::signed_in("u-1", "admin"), table);
        fx.plant("u-1", "/app/retired-feature", NOW, "admin");
        assert_eq!(
            fx.service.resolve_restorable_page(None).as_deref(),
            Some("/app/dashboard")
        );
        assert!(fx.stored("u-1").is_none());
    }

    #[test]
    fn role_change_rewrites_or_clears() {
        let fx = Fixture::new(MockAuthProvider::signed_in("u-1", "admin"));
        assert!(fx.service.record_page("/app/reports/q3"));

        fx.service.on_role_changed(&role("admin"), &role("admin"));
        assert_eq!(fx.stored("u-1").unwrap()["role"], "admin");

        fx.auth.set_role("recruiter");
        fx.service.on_role_changed(&role("recruiter"), &role("admin"));
        assert_eq!(fx.stored("u-1").unwrap()["role"], "recruiter");

        fx.auth.set_role("interviewer");
        fx.service.on_role_changed(&role("interviewer"), &role("recruiter"));
        assert!(fx.stored("u-1").is_none());
        assert_eq!(fx.log.successes(Operation::RoleChange), 1);
    }

    #[test]
    fn last_known_user_survives_sign_out() {
        let fx = Fixture::new(MockAuthProvider::signed_in("u-1", "admin"));
        assert!(fx.service.record_page("/app/jobs"));
        fx.auth.sign_out();
        assert_eq!(fx.service.last_known_user().unwrap().as_str(), "u-1");
        assert!(fx.service.clear_page_for(&UserId::new("u-1").unwrap()));
        assert!(fx.stored("u-1").is_none());
    }
}
