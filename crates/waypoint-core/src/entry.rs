//! Entry-point redirect decision.
//!
//! Runs once per mount or auth-state change and turns the authentication
//! state, the `logout=true` signal, and page memory into one target:
//!
//! | authenticated | explicit logout | outcome |
//! |---|---|---|
//! | yes | any | context restore, else stored page, else role dashboard |
//! | no | yes | force logout, clear stored page, go to login |
//! | no | no | force logout, keep stored page, go to login |
//!
//! A failure anywhere forces logout and goes to login, clearing the stored
//! page only when the logout was explicit.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use url::form_urlencoded;
use waypoint_error::Result;
use waypoint_types::{
    AuthProvider, AuthSnapshot, Clock, EventContext, Navigator, Operation, TelemetryObserver,
    UserId, WaypointEvent,
};

use crate::service::PageMemoryService;

/// Outcome of [`EntryRedirector::decide`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryDecision {
    /// Authentication is still resolving; show a loading indicator.
    Loading,
    Redirect(String),
}

/// Whether `query` carries `logout=true`. A leading `?` is optional.
#[must_use]
pub fn explicit_logout_requested(query: &str) -> bool {
    let query = query.strip_prefix('?').unwrap_or(query);
    form_urlencoded::parse(query.as_bytes()).any(|(key, value)| key == "logout" && value == "true")
}

pub struct EntryRedirector {
    service: Arc<PageMemoryService>,
    auth: Arc<dyn AuthProvider>,
    clock: Arc<dyn Clock>,
    telemetry: Arc<dyn TelemetryObserver>,
    login_path: String,
}

impl std::fmt::Debug for EntryRedirector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryRedirector")
            .field("login_path", &self.login_path)
            .finish_non_exhaustive()
    }
}

impl EntryRedirector {
    #[must_use]
    pub fn new(
        service: Arc<PageMemoryService>,
        auth: Arc<dyn AuthProvider>,
        clock: Arc<dyn Clock>,
        telemetry: Arc<dyn TelemetryObserver>,
        login_path: impl Into<String>,
    ) -> Self {
        Self {
            service,
            auth,
            clock,
            telemetry,
            login_path: login_path.into(),
        }
    }

    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Decide where the entry point should send the user.
    pub fn decide(&self, query: &str) -> EntryDecision {
        let snapshot = self.auth.snapshot();
        if snapshot.is_loading {
            return EntryDecision::Loading;
        }
        let explicit = explicit_logout_requested(query);

        let outcome = if snapshot.is_authenticated {
            self.authenticated_target(&snapshot)
        } else {
            self.deauthenticate(&snapshot, explicit)
        };
        match outcome {
            Ok(target) => {
                info!(
                    target: "waypoint.core::entry",
                    authenticated = snapshot.is_authenticated,
                    explicit_logout = explicit,
                    %target,
                    "entry redirect"
                );
                self.telemetry.on_event(&WaypointEvent::success(
                    EventContext::new(Operation::Entry).with_path(target.as_str()),
                    self.clock.now_ms(),
                ));
                EntryDecision::Redirect(target)
            }
            Err(err) => {
                error!(
                    target: "waypoint.core::entry",
                    error = %err,
                    explicit_logout = explicit,
                    "entry decision failed; sending to login"
                );
                self.telemetry.on_event(&WaypointEvent::fault(
                    err.fault_kind(),
                    err.to_string(),
                    EventContext::new(Operation::Entry),
                    self.clock.now_ms(),
                ));
                // The unauthenticated path has already attempted the logout.
                if snapshot.is_authenticated {
                    if let Err(logout_err) = self.auth.force_logout() {
                        warn!(target: "waypoint.core::entry", error = %logout_err, "forced logout failed");
                    }
                }
                if explicit {
                    self.clear_for_logout(&snapshot);
                }
                EntryDecision::Redirect(self.login_path.clone())
            }
        }
    }

    /// Decide using the navigator's query string and apply the redirect.
    pub fn run(&self, navigator: &dyn Navigator) -> EntryDecision {
        let decision = self.decide(&navigator.query());
        if let EntryDecision::Redirect(target) = &decision {
            navigator.redirect(target);
        }
        decision
    }

    fn deauthenticate(&self, snapshot: &AuthSnapshot, explicit: bool) -> Result<String> {
        self.auth.force_logout()?;
        if explicit {
            self.clear_for_logout(snapshot);
        }
        Ok(self.login_path.clone())
    }

    fn authenticated_target(&self, snapshot: &AuthSnapshot) -> Result<String> {
        let Some(identity) = snapshot.identity() else {
            warn!(target: "waypoint.core::entry", "authenticated user lacks id or role");
            return Ok(self.service.table().fallback_dashboard().to_owned());
        };

        if let Some(path) = self.auth.restore_last_page()? {
            match self.service.check_restorable(&path, &identity.role, None) {
                Ok(sanitized) => return Ok(sanitized.into_string()),
                Err(rejection) => debug!(
                    target: "waypoint.core::entry",
                    %path,
                    ?rejection,
                    "context restore rejected"
                ),
            }
        }

        Ok(self
            .service
            .resolve_restorable_page(Some(&identity.role))
            .unwrap_or_else(|| self.service.default_dashboard_for(&identity.role)))
    }

    fn clear_for_logout(&self, snapshot: &AuthSnapshot) {
        let subject = snapshot
            .user
            .as_ref()
            .and_then(|u| UserId::new(u.user_id.clone()).ok())
            .or_else(|| self.service.last_known_user());
        match subject {
            Some(user_id) => {
                self.service.clear_page_for(&user_id);
            }
            None => debug!(target: "waypoint.core::entry", "no known user to clear"),
        }
    }
}
