//! Which paths are worth remembering.
//!
//! Only application-internal routes are tracked. The root, the
//! authentication flow, and utility pages (error, not-found, maintenance,
//! loading) are never stored, since restoring to them would be useless or
//! would loop through login.

use serde::{Deserialize, Serialize};

use crate::sanitize::route_part;

/// Reason a path is not tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Untrackable {
    Root,
    AuthRoute,
    UtilityRoute,
    OutsideNamespace,
}

/// Serializable tracking settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Prefix every tracked path must start with.
    pub tracked_prefix: String,
    /// Authentication-flow routes (matched with their sub-paths).
    pub auth_paths: Vec<String>,
    /// Utility routes (matched with their sub-paths).
    pub utility_paths: Vec<String>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            tracked_prefix: "/app/".to_owned(),
            auth_paths: ["/login", "/logout", "/register", "/forgot-password", "/reset-password", "/auth"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            utility_paths: ["error", "404", "not-found", "maintenance", "loading", "unauthorized"]
                .into_iter()
                .flat_map(|name| [format!("/{name}"), format!("/app/{name}")])
                .collect(),
        }
    }
}

/// `route` equals one of `routes` or sits below one.
fn matches_any(route: &str, routes: &[String]) -> bool {
    routes.iter().any(|base| {
        route == base
            || route
                .strip_prefix(base.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

/// Trackability check built from a [`TrackingConfig`].
#[derive(Debug, Clone, Default)]
pub struct TrackingPolicy {
    config: TrackingConfig,
}

impl TrackingPolicy {
    #[must_use]
    pub const fn new(config: TrackingConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn tracked_prefix(&self) -> &str {
        &self.config.tracked_prefix
    }

    /// Whether `path` is an authentication-flow route.
    #[must_use]
    pub fn is_auth_route(&self, path: &str) -> bool {
        matches_any(route_part(path), &self.config.auth_paths)
    }

    /// Whether `path` is a utility route.
    #[must_use]
    pub fn is_utility_route(&self, path: &str) -> bool {
        matches_any(route_part(path), &self.config.utility_paths)
    }

    /// `Ok(())` when `path` may be recorded.
    pub fn check(&self, path: &str) -> Result<(), Untrackable> {
        let route = route_part(path);
        if route.is_empty() || route == "/" {
            return Err(Untrackable::Root);
        }
        if self.is_auth_route(route) {
            return Err(Untrackable::AuthRoute);
        }
        if self.is_utility_route(route) {
            return Err(Untrackable::UtilityRoute);
        }
        if !route.starts_with(self.config.tracked_prefix.as_str()) {
            return Err(Untrackable::OutsideNamespace);
        }
        Ok(())
    }

    #[must_use]
    pub fn is_trackable(&self, path: &str) -> bool {
        self.check(path).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_untracked_paths() {
        let policy = TrackingPolicy::default();
        let cases = [
            ("/", Untrackable::Root),
            ("/?logout=true", Untrackable::Root),
            ("/login", Untrackable::AuthRoute),
            ("/auth/callback?code=1", Untrackable::AuthRoute),
            ("/app/error", Untrackable::UtilityRoute),
            ("/not-found", Untrackable::UtilityRoute),
            ("/app/maintenance/window", Untrackable::UtilityRoute),
            ("/public/pricing", Untrackable::OutsideNamespace),
            ("/application", Untrackable::OutsideNamespace),
        ];
        for (path, expected) in cases {
            assert_eq!(policy.check(path), Err(expected), "{path}");
        }
    }

    #[test]
    fn app_routes_are_trackable() {
        let policy = TrackingPolicy::default();
        assert!(policy.is_trackable("/app/candidates"));
        assert!(policy.is_trackable("/app/jobs/12?tab=pipeline"));
        // Only exact auth routes or their children are excluded.
        assert!(!policy.is_auth_route("/loginhelp"));
    }

    #[test]
    fn utility_names_deeper_in_a_route_are_trackable() {
        let policy = TrackingPolicy::default();
        for path in ["/app/jobs/404", "/app/candidates/error", "/app/reports/loading"] {
            assert!(policy.is_trackable(path), "{path}");
        }
        assert!(!policy.is_utility_route("/app/errors"));
        assert!(policy.is_utility_route("/app/loading?next=/app/jobs"));
    }

    #[test]
    fn custom_prefix() {
        let policy = TrackingPolicy::new(TrackingConfig {
            tracked_prefix: "/portal/".to_owned(),
            ..TrackingConfig::default()
        });
        assert!(policy.is_trackable("/portal/home"));
        assert_eq!(policy.check("/app/home"), Err(Untrackable::OutsideNamespace));
    }
}
