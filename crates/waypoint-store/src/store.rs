//! The store facade: backend selection, typed get/set, self-heal, purge.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use waypoint_error::{FaultKind, WaypointError};
use waypoint_types::{
    Clock, DAY_MS, DEFAULT_KEY_PREFIX, EventContext, Operation, StorageKey, TelemetryObserver,
    WaypointEvent,
};

use crate::backend::{BackendKind, StorageBackend};

/// Sentinel written and deleted by the startup self-test.
pub const SENTINEL_KEY: &str = "waypoint.__sentinel__";
const SENTINEL_VALUE: &str = "\"sentinel\"";

/// Tracking entries older than this are removed by [`PersistentStore::clear_old_entries`].
pub const PURGE_AGE_MS: i64 = 30 * DAY_MS;

/// Tunables for a [`PersistentStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Prefix identifying page-memory keys.
    pub key_prefix: String,
    /// Age beyond which tracking entries are purged.
    pub purge_age_ms: i64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_owned(),
            purge_age_ms: PURGE_AGE_MS,
        }
    }
}

/// Key/JSON store over the first backend that passed its self-test.
pub struct PersistentStore {
    active: Option<Box<dyn StorageBackend>>,
    options: StoreOptions,
    clock: Arc<dyn Clock>,
    telemetry: Arc<dyn TelemetryObserver>,
}

impl std::fmt::Debug for PersistentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentStore")
            .field("active", &self.active_backend())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn self_check(backend: &dyn StorageBackend) -> waypoint_error::Result<()> {
    backend.write(SENTINEL_KEY, SENTINEL_VALUE)?;
    let read_back = backend.read(SENTINEL_KEY)?;
    backend.delete(SENTINEL_KEY)?;
    if read_back.as_deref() != Some(SENTINEL_VALUE) {
        return Err(WaypointError::internal("sentinel value did not read back"));
    }
    Ok(())
}

impl PersistentStore {
    /// Check `primary`, then `fallback`, and keep the first that passes.
    pub fn open(
        primary: Box<dyn StorageBackend>,
        fallback: Option<Box<dyn StorageBackend>>,
        options: StoreOptions,
        clock: Arc<dyn Clock>,
        telemetry: Arc<dyn TelemetryObserver>,
    ) -> Self {
        let mut store = Self {
            active: None,
            options,
            clock,
            telemetry,
        };

        for backend in std::iter::once(primary).chain(fallback) {
            let kind = backend.kind();
            match self_check(&*backend) {
                Ok(()) => {
                    info!(
                        target: "waypoint.store::self_check",
                        backend = kind.as_str(),
                        "storage backend selected"
                    );
                    store.active = Some(backend);
                    break;
                }
                Err(err) => {
                    warn!(
                        target: "waypoint.store::self_check",
                        backend = kind.as_str(),
                        error = %err,
                        "storage backend failed self-test"
                    );
                    store.emit_fault(
                        FaultKind::StorageUnavailable,
                        format!("{} backend failed self-test: {err}", kind.as_str()),
                        EventContext::new(Operation::SelfCheck),
                    );
                }
            }
        }

        if store.active.is_none() {
            error!(
                target: "waypoint.store::self_check",
                "no storage backend available; persistence disabled"
            );
        }
        store
    }

    /// True iff a backend passed its self-test.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.active.is_some()
    }

    /// Tier of the active backend.
    #[must_use]
    pub fn active_backend(&self) -> Option<BackendKind> {
        self.active.as_ref().map(|b| b.kind())
    }

    #[must_use]
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    fn emit_fault(&self, kind: FaultKind, message: String, context: EventContext) {
        let event = WaypointEvent::fault(kind, message, context, self.clock.now_ms());
        self.telemetry.on_event(&event);
    }

    fn backend_or_report(&self, operation: Operation, key: &str) -> Option<&dyn StorageBackend> {
        let backend = self.active.as_deref();
        if backend.is_none() {
            let err = WaypointError::StorageUnavailable;
            self.emit_fault(
                err.fault_kind(),
                err.to_string(),
                EventContext::new(operation).with_path(key),
            );
        }
        backend
    }

    /// Serialize `value` and write it under `key`.
    ///
    /// A quota failure triggers one purge and exactly one retry. Returns
    /// `false` if the write did not land.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        let Some(backend) = self.backend_or_report(Operation::StoreWrite, key) else {
            return false;
        };
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(err) => {
                self.report_write_failure(key, &WaypointError::from(err));
                return false;
            }
        };

        match backend.write(key, &payload) {
            Ok(()) => true,
            Err(err) if err.is_quota_exceeded() => {
                warn!(
                    target: "waypoint.store::write",
                    key,
                    error = %err,
                    "quota exceeded; purging old entries before retry"
                );
                let purged = self.clear_old_entries();
                match backend.write(key, &payload) {
                    Ok(()) => {
                        debug!(target: "waypoint.store::write", key, purged, "retry succeeded");
                        true
                    }
                    Err(retry_err) => {
                        self.report_write_failure(key, &retry_err);
                        false
                    }
                }
            }
            Err(err) => {
                self.report_write_failure(key, &err);
                false
            }
        }
    }

    fn report_write_failure(&self, key: &str, err: &WaypointError) {
        warn!(target: "waypoint.store::write", key, error = %err, "write failed");
        self.emit_fault(
            FaultKind::StorageWriteFailure,
            err.to_string(),
            EventContext::new(Operation::StoreWrite).with_path(key),
        );
    }

    /// Read and decode `key`. Undecodable entries are deleted.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_validated(key, |_: &T| true)
    }

    /// Read, decode, and validate `key`.
    ///
    /// An entry that fails to decode or that `validator` rejects is deleted
    /// and `None` is returned, so corruption never propagates to callers.
    pub fn get_validated<T, F>(&self, key: &str, validator: F) -> Option<T>
    where
        T: DeserializeOwned,
        F: FnOnce(&T) -> bool,
    {
        let backend = self.backend_or_report(Operation::StoreRead, key)?;
        let raw = match backend.read(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(target: "waypoint.store::read", key, error = %err, "read failed");
                self.emit_fault(
                    FaultKind::StorageReadFailure,
                    err.to_string(),
                    EventContext::new(Operation::StoreRead).with_path(key),
                );
                return None;
            }
        };

        match serde_json::from_str::<T>(&raw) {
            Ok(value) if validator(&value) => Some(value),
            Ok(_) => {
                self.discard_corrupt(backend, key, "validator rejected stored value");
                None
            }
            Err(err) => {
                self.discard_corrupt(backend, key, &format!("undecodable payload: {err}"));
                None
            }
        }
    }

    fn discard_corrupt(&self, backend: &dyn StorageBackend, key: &str, detail: &str) {
        warn!(
            target: "waypoint.store::read",
            key,
            detail,
            "corrupt entry removed"
        );
        if let Err(err) = backend.delete(key) {
            warn!(target: "waypoint.store::read", key, error = %err, "failed to remove corrupt entry");
        }
        self.emit_fault(
            FaultKind::CorruptRecord,
            detail.to_owned(),
            EventContext::new(Operation::StoreRead).with_path(key),
        );
    }

    /// Delete `key`. Returns `false` only when the backend failed.
    pub fn remove(&self, key: &str) -> bool {
        let Some(backend) = self.backend_or_report(Operation::Clear, key) else {
            return false;
        };
        match backend.delete(key) {
            Ok(_) => true,
            Err(err) => {
                warn!(target: "waypoint.store::remove", key, error = %err, "delete failed");
                self.emit_fault(
                    err.fault_kind(),
                    err.to_string(),
                    EventContext::new(Operation::Clear).with_path(key),
                );
                false
            }
        }
    }

    /// Raw stored text for `key`, without decoding or self-heal.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<String> {
        self.active.as_deref().and_then(|b| b.read(key).ok().flatten())
    }

    /// Whether `key` currently holds any bytes.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.active
            .as_deref()
            .is_some_and(|b| matches!(b.read(key), Ok(Some(_))))
    }

    /// Remove tracking entries older than the purge age or that do not
    /// decode to an object with an integer `timestamp`. Returns the number
    /// of entries removed.
    pub fn clear_old_entries(&self) -> usize {
        let Some(backend) = self.active.as_deref() else {
            return 0;
        };
        let keys = match backend.keys() {
            Ok(keys) => keys,
            Err(err) => {
                warn!(target: "waypoint.store::purge", error = %err, "key scan failed");
                return 0;
            }
        };

        let now = self.clock.now_ms();
        let mut removed = 0_usize;
        for key in keys
            .iter()
            .filter(|k| StorageKey::is_tracking_key(&self.options.key_prefix, k))
        {
            let stale = match backend.read(key) {
                Ok(Some(raw)) => serde_json::from_str::<Value>(&raw)
                    .ok()
                    .and_then(|v| v.get("timestamp").and_then(Value::as_i64))
                    .is_none_or(|ts| now.saturating_sub(ts) > self.options.purge_age_ms),
                Ok(None) | Err(_) => false,
            };
            if stale && matches!(backend.delete(key), Ok(true)) {
                removed += 1;
            }
        }

        if removed > 0 {
            info!(target: "waypoint.store::purge", removed, "old entries purged");
            self.telemetry.on_event(&WaypointEvent::success(
                EventContext::new(Operation::Purge),
                now,
            ));
        }
        removed
    }
}
