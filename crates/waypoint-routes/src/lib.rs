//! Route permissions for waypoint.
//!
//! [`RoutePermissionTable`] maps path patterns to the roles allowed to visit
//! them, answers "may this role see this path" and "where should this role
//! go instead", and owns the per-role default dashboards.
//! [`sanitize_path`] rejects paths that must never be stored or restored,
//! and [`TrackingPolicy`] decides which paths are worth remembering at all.

pub mod sanitize;
pub mod table;
pub mod tracking;

pub use sanitize::{
    MAX_PATH_DEPTH, MAX_PATH_LEN, PathRejection, SanitizedPath, route_part, sanitize_path,
};
pub use table::{
    PermissionRule, RoutePattern, RoutePermissionTable, RouteTableConfig, SAMPLE_PATHS,
    UnmatchedRoutePolicy,
};
pub use tracking::{TrackingConfig, TrackingPolicy, Untrackable};
