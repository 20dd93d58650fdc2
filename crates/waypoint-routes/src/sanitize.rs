//! Path sanitizer.
//!
//! Blocks specific characters and sequences rather than allowlisting; paths
//! that pass are returned unchanged.

use waypoint_error::WaypointError;

/// Longest accepted path, in characters.
pub const MAX_PATH_LEN: usize = 500;
/// Most `/`-separated segments accepted in the route part of a path.
pub const MAX_PATH_DEPTH: usize = 10;

/// Why a path was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathRejection {
    #[error("path is empty")]
    Empty,
    #[error("no role supplied")]
    MissingRole,
    #[error("path does not start with '/'")]
    NotAbsolute,
    #[error("path is {len} characters long (max {MAX_PATH_LEN})")]
    TooLong { len: usize },
    #[error("path has {depth} segments (max {MAX_PATH_DEPTH})")]
    TooDeep { depth: usize },
    #[error("path contains a control character")]
    ControlCharacter,
    #[error("path contains a '..' segment")]
    TraversalSegment,
    #[error("path contains an encoded angle bracket")]
    EncodedAngleBracket,
}

impl From<PathRejection> for WaypointError {
    fn from(rejection: PathRejection) -> Self {
        Self::malformed_path(rejection.to_string())
    }
}

/// A path that passed [`sanitize_path`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SanitizedPath(String);

impl SanitizedPath {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for SanitizedPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The part of `path` before any query string or fragment.
#[must_use]
pub fn route_part(path: &str) -> &str {
    path.find(['?', '#']).map_or(path, |idx| &path[..idx])
}

fn is_traversal(segment: &str) -> bool {
    segment == ".." || segment.eq_ignore_ascii_case("%2e%2e")
}

/// Validate `path` for storage or restoration under `role`.
pub fn sanitize_path(path: &str, role: &str) -> Result<SanitizedPath, PathRejection> {
    if path.is_empty() {
        return Err(PathRejection::Empty);
    }
    if role.trim().is_empty() {
        return Err(PathRejection::MissingRole);
    }
    let len = path.chars().count();
    if len > MAX_PATH_LEN {
        return Err(PathRejection::TooLong { len });
    }
    if path.chars().any(char::is_control) {
        return Err(PathRejection::ControlCharacter);
    }
    if !path.starts_with('/') {
        return Err(PathRejection::NotAbsolute);
    }

    let lower = path.to_ascii_lowercase();
    if lower.contains("%3c") || lower.contains("%3e") {
        return Err(PathRejection::EncodedAngleBracket);
    }

    let route = route_part(path);
    let mut depth = 0_usize;
    for segment in route.split('/').filter(|s| !s.is_empty()) {
        if is_traversal(segment) {
            return Err(PathRejection::TraversalSegment);
        }
        depth += 1;
    }
    if depth > MAX_PATH_DEPTH {
        return Err(PathRejection::TooDeep { depth });
    }

    Ok(SanitizedPath(path.to_owned()))
}
