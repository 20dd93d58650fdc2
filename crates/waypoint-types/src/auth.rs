//! Interfaces to the authentication provider and the navigation runtime.
//!
//! Waypoint consumes these collaborators but never implements login,
//! token handling, or rendering. [`MockAuthProvider`] and
//! [`RecordingNavigator`] are in-memory doubles for tests and demos.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use waypoint_error::{Result, WaypointError};

use crate::ids::{Role, UserId};

/// User as reported by the auth provider; fields may be missing or blank.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthUser {
    pub user_id: String,
    pub role: String,
}

impl AuthUser {
    pub fn new(user_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: role.into(),
        }
    }

    /// Validated identity, or `None` when the id or role is unusable.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        Some(Identity {
            user_id: UserId::new(self.user_id.clone()).ok()?,
            role: Role::new(self.role.clone()).ok()?,
        })
    }
}

/// A user with both a usable id and a usable role.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
}

/// Point-in-time view of the authentication state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthSnapshot {
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub user: Option<AuthUser>,
}

impl AuthSnapshot {
    /// Identity of the signed-in user, if authenticated and complete.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        if !self.is_authenticated {
            return None;
        }
        self.user.as_ref().and_then(AuthUser::identity)
    }
}

/// Authentication collaborator.
pub trait AuthProvider: Send + Sync {
    fn snapshot(&self) -> AuthSnapshot;

    /// Drop the local session (auth tokens only).
    fn force_logout(&self) -> Result<()>;

    /// Optional restore shortcut owned by the auth layer.
    fn restore_last_page(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Navigation runtime: current location and redirect capability.
pub trait Navigator {
    fn current_path(&self) -> String;

    /// Raw query string, with or without the leading `?`.
    fn query(&self) -> String;

    /// Replace the current location with `path`.
    fn redirect(&self, path: &str);
}

/// Scriptable auth provider.
#[derive(Debug, Default)]
pub struct MockAuthProvider {
    state: Mutex<AuthSnapshot>,
    restore: Mutex<Option<std::result::Result<Option<String>, String>>>,
    fail_logout: Mutex<bool>,
    logout_calls: AtomicUsize,
}

impl MockAuthProvider {
    #[must_use]
    pub fn signed_out() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn signed_in(user_id: &str, role: &str) -> Self {
        let mock = Self::default();
        mock.sign_in(user_id, role);
        mock
    }

    pub fn sign_in(&self, user_id: &str, role: &str) {
        *self.state.lock() = AuthSnapshot {
            is_authenticated: true,
            is_loading: false,
            user: Some(AuthUser::new(user_id, role)),
        };
    }

    pub fn sign_out(&self) {
        *self.state.lock() = AuthSnapshot::default();
    }

    pub fn set_loading(&self, loading: bool) {
        self.state.lock().is_loading = loading;
    }

    pub fn set_role(&self, role: &str) {
        if let Some(user) = self.state.lock().user.as_mut() {
            user.role = role.to_owned();
        }
    }

    /// Replace the whole snapshot, including partial users.
    pub fn set_snapshot(&self, snapshot: AuthSnapshot) {
        *self.state.lock() = snapshot;
    }

    /// Script the result of [`AuthProvider::restore_last_page`].
    pub fn set_restore_result(&self, result: std::result::Result<Option<String>, String>) {
        *self.restore.lock() = Some(result);
    }

    pub fn set_fail_logout(&self, fail: bool) {
        *self.fail_logout.lock() = fail;
    }

    #[must_use]
    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::Relaxed)
    }
}

impl AuthProvider for MockAuthProvider {
    fn snapshot(&self) -> AuthSnapshot {
        self.state.lock().clone()
    }

    fn force_logout(&self) -> Result<()> {
        self.logout_calls.fetch_add(1, Ordering::Relaxed);
        if *self.fail_logout.lock() {
            return Err(WaypointError::Auth("logout rejected".to_owned()));
        }
        let mut state = self.state.lock();
        state.is_authenticated = false;
        state.user = None;
        Ok(())
    }

    fn restore_last_page(&self) -> Result<Option<String>> {
        match self.restore.lock().clone() {
            None => Ok(None),
            Some(Ok(path)) => Ok(path),
            Some(Err(msg)) => Err(WaypointError::Auth(msg)),
        }
    }
}

/// Navigator that records redirects instead of performing them.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    path: Mutex<String>,
    query: Mutex<String>,
    redirects: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    #[must_use]
    pub fn at(path: &str, query: &str) -> Self {
        Self {
            path: Mutex::new(path.to_owned()),
            query: Mutex::new(query.to_owned()),
            redirects: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn redirects(&self) -> Vec<String> {
        self.redirects.lock().clone()
    }

    #[must_use]
    pub fn last_redirect(&self) -> Option<String> {
        self.redirects.lock().last().cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn current_path(&self) -> String {
        self.path.lock().clone()
    }

    fn query(&self) -> String {
        self.query.lock().clone()
    }

    fn redirect(&self, path: &str) {
        self.redirects.lock().push(path.to_owned());
        *self.path.lock() = path.to_owned();
        self.query.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_requires_id_and_role() {
        assert!(AuthUser::new("u-1", "admin").identity().is_some());
        assert!(AuthUser::new("", "admin").identity().is_none());
        assert!(AuthUser::new("u-1", " ").identity().is_none());

        let snapshot = AuthSnapshot {
            is_authenticated: false,
            is_loading: false,
            user: Some(AuthUser::new("u-1", "admin")),
        };
        assert!(snapshot.identity().is_none());
    }

    #[test]
    fn mock_logout_clears_session() {
        let auth = MockAuthProvider::signed_in("u-1", "admin");
        assert!(auth.snapshot().identity().is_some());
        auth.force_logout().unwrap();
        assert_eq!(auth.logout_calls(), 1);
        assert!(!auth.snapshot().is_authenticated);

        auth.set_fail_logout(true);
        assert!(auth.force_logout().is_err());
        assert_eq!(auth.logout_calls(), 2);
    }

    #[test]
    fn recording_navigator_tracks_redirects() {
        let nav = RecordingNavigator::at("/", "?logout=true");
        nav.redirect("/login");
        assert_eq!(nav.current_path(), "/login");
        assert_eq!(nav.query(), "");
        assert_eq!(nav.redirects(), vec!["/login".to_owned()]);
    }
}
