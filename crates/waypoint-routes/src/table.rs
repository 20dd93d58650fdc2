//! Static role-based permission table.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;
use waypoint_error::{Result, WaypointError};
use waypoint_types::Role;

use crate::sanitize::{PathRejection, SanitizedPath, route_part, sanitize_path};

/// Representative paths checked by the diagnostics sweep.
pub const SAMPLE_PATHS: &[&str] = &[
    "/app/dashboard",
    "/app/candidates",
    "/app/jobs",
    "/app/interviews",
    "/app/calendar",
    "/app/reports",
    "/app/team",
    "/app/settings",
];

/// Exact path, or a prefix written as `/base/*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RoutePattern {
    Exact(String),
    Prefix(String),
}

impl RoutePattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        if !pattern.starts_with('/') {
            return Err(WaypointError::Config(format!(
                "route pattern must start with '/': {pattern}"
            )));
        }
        match pattern.strip_suffix("/*") {
            Some(base) => Ok(Self::Prefix(base.to_owned())),
            None => Ok(Self::Exact(pattern.trim_end_matches('/').to_owned())),
        }
    }

    /// Whether `route` (no query or fragment) falls under this pattern.
    #[must_use]
    pub fn matches(&self, route: &str) -> bool {
        let route = if route.len() > 1 {
            route.trim_end_matches('/')
        } else {
            route
        };
        match self {
            Self::Exact(p) => route == p,
            Self::Prefix(base) => {
                route == base
                    || route
                        .strip_prefix(base.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
        }
    }

    /// Ordering key: exact beats prefix, longer beats shorter.
    fn specificity(&self) -> (u8, usize) {
        match self {
            Self::Exact(p) => (1, p.len()),
            Self::Prefix(base) => (0, base.len()),
        }
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(p) => f.write_str(p),
            Self::Prefix(base) => write!(f, "{base}/*"),
        }
    }
}

impl TryFrom<String> for RoutePattern {
    type Error = WaypointError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<RoutePattern> for String {
    fn from(pattern: RoutePattern) -> Self {
        pattern.to_string()
    }
}

/// Roles allowed on a pattern, and where to send everyone else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRule {
    pub pattern: RoutePattern,
    pub allowed_roles: BTreeSet<String>,
    pub fallback_path: String,
}

impl PermissionRule {
    pub fn new(pattern: &str, allowed_roles: &[&str], fallback_path: &str) -> Result<Self> {
        Ok(Self {
            pattern: RoutePattern::parse(pattern)?,
            allowed_roles: allowed_roles.iter().map(|r| (*r).to_owned()).collect(),
            fallback_path: fallback_path.to_owned(),
        })
    }

    #[must_use]
    pub fn allows(&self, role: &Role) -> bool {
        self.allowed_roles.contains(role.as_str())
    }
}

/// What to do with a path no rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedRoutePolicy {
    /// Untracked routes stay reachable.
    #[default]
    Allow,
    /// Anything without a rule is refused.
    Deny,
}

/// Declarative table definition, loadable from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteTableConfig {
    pub rules: Vec<PermissionRule>,
    pub dashboards: BTreeMap<String, String>,
    pub fallback_dashboard: String,
    pub unmatched: UnmatchedRoutePolicy,
}

impl Default for RouteTableConfig {
    fn default() -> Self {
        Self::standard()
    }
}

fn rule(pattern: &str, roles: &[&str], fallback: &str) -> PermissionRule {
    PermissionRule {
        pattern: match pattern.strip_suffix("/*") {
            Some(base) => RoutePattern::Prefix(base.to_owned()),
            None => RoutePattern::Exact(pattern.to_owned()),
        },
        allowed_roles: roles.iter().map(|r| (*r).to_owned()).collect(),
        fallback_path: fallback.to_owned(),
    }
}

impl RouteTableConfig {
    /// The built-in table for the recruiting application.
    #[must_use]
    pub fn standard() -> Self {
        const ALL: &[&str] = &["admin", "recruiter", "interviewer", "user"];
        const HOME: &str = "/app/dashboard";
        Self {
            rules: vec![
                rule("/app/dashboard", ALL, "/app/jobs"),
                rule("/app/profile/*", ALL, HOME),
                rule("/app/calendar/*", ALL, HOME),
                rule("/app/candidates/*", &["admin", "recruiter", "interviewer"], HOME),
                rule("/app/candidates/import", &["admin"], "/app/candidates"),
                rule("/app/jobs/*", &["admin", "recruiter", "user"], HOME),
                rule("/app/interviews/*", &["admin", "recruiter", "interviewer"], HOME),
                rule("/app/reports/*", &["admin", "recruiter"], HOME),
                rule("/app/team/*", &["admin"], HOME),
                rule("/app/settings/*", &["admin"], HOME),
            ],
            dashboards: [
                ("admin", HOME),
                ("recruiter", HOME),
                ("interviewer", "/app/interviews"),
                ("user", "/app/jobs"),
            ]
            .into_iter()
            .map(|(role, path)| (role.to_owned(), path.to_owned()))
            .collect(),
            fallback_dashboard: HOME.to_owned(),
            unmatched: UnmatchedRoutePolicy::Allow,
        }
    }
}

/// Permission table used by page memory and the entry redirector.
#[derive(Debug, Clone)]
pub struct RoutePermissionTable {
    rules: Vec<PermissionRule>,
    dashboards: BTreeMap<String, String>,
    fallback_dashboard: String,
    unmatched: UnmatchedRoutePolicy,
}

impl Default for RoutePermissionTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl RoutePermissionTable {
    #[must_use]
    pub fn standard() -> Self {
        let config = RouteTableConfig::standard();
        Self {
            rules: config.rules,
            dashboards: config.dashboards,
            fallback_dashboard: config.fallback_dashboard,
            unmatched: config.unmatched,
        }
    }

    /// Build a table, rejecting fallbacks and dashboards that are not absolute paths.
    pub fn from_config(config: RouteTableConfig) -> Result<Self> {
        for rule in &config.rules {
            if !rule.fallback_path.starts_with('/') {
                return Err(WaypointError::Config(format!(
                    "fallback for {} must be an absolute path",
                    rule.pattern
                )));
            }
        }
        let bad_dashboard = config
            .dashboards
            .iter()
            .find(|(_, path)| !path.starts_with('/'))
            .map(|(role, _)| role.clone());
        if let Some(role) = bad_dashboard {
            return Err(WaypointError::Config(format!(
                "dashboard for role '{role}' must be an absolute path"
            )));
        }
        if !config.fallback_dashboard.starts_with('/') {
            return Err(WaypointError::Config(
                "fallback dashboard must be an absolute path".to_owned(),
            ));
        }
        Ok(Self {
            rules: config.rules,
            dashboards: config.dashboards,
            fallback_dashboard: config.fallback_dashboard,
            unmatched: config.unmatched,
        })
    }

    #[must_use]
    pub const fn unmatched_policy(&self) -> UnmatchedRoutePolicy {
        self.unmatched
    }

    /// Dashboard for roles without an entry of their own.
    #[must_use]
    pub fn fallback_dashboard(&self) -> &str {
        &self.fallback_dashboard
    }

    #[must_use]
    pub fn rules(&self) -> &[PermissionRule] {
        &self.rules
    }

    /// Most specific rule covering `path`, if any.
    #[must_use]
    pub fn matching_rule(&self, path: &str) -> Option<&PermissionRule> {
        let route = route_part(path);
        self.rules
            .iter()
            .filter(|rule| rule.pattern.matches(route))
            .max_by_key(|rule| rule.pattern.specificity())
    }

    /// Whether some rule covers `path`.
    #[must_use]
    pub fn is_known_route(&self, path: &str) -> bool {
        self.matching_rule(path).is_some()
    }

    /// Whether `role` may visit `path`.
    #[must_use]
    pub fn has_permission(&self, path: &str, role: &Role) -> bool {
        let allowed = match self.matching_rule(path) {
            Some(rule) => rule.allows(role),
            None => self.unmatched == UnmatchedRoutePolicy::Allow,
        };
        if !allowed {
            debug!(
                target: "waypoint.routes::permission",
                path,
                role = role.as_str(),
                "access denied"
            );
        }
        allowed
    }

    /// Where to send `role` instead of `path`: the matching rule's fallback
    /// when `role` may visit it, otherwise the role's dashboard.
    #[must_use]
    pub fn redirect_for(&self, path: &str, role: &Role) -> String {
        match self.matching_rule(path) {
            Some(rule) if self.has_permission(&rule.fallback_path, role) => {
                rule.fallback_path.clone()
            }
            _ => self.default_dashboard_for(role).to_owned(),
        }
    }

    /// Home page for `role`.
    #[must_use]
    pub fn default_dashboard_for(&self, role: &Role) -> &str {
        self.dashboards
            .get(role.as_str())
            .map_or(self.fallback_dashboard.as_str(), String::as_str)
    }

    /// Run the path sanitizer for `role`.
    pub fn sanitize(&self, path: &str, role: &Role) -> std::result::Result<SanitizedPath, PathRejection> {
        sanitize_path(path, role.as_str())
    }
}
