//! Volatile in-memory backend.
//!
//! Clones share the same underlying map, so a test can keep a handle and
//! tamper with stored bytes behind the store's back.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use waypoint_error::{Result, WaypointError};

use crate::backend::{BackendKind, StorageBackend};

#[derive(Debug, Default)]
struct MemoryInner {
    entries: BTreeMap<String, String>,
    quota_bytes: Option<usize>,
    reject_writes: bool,
    write_attempts: usize,
}

impl MemoryInner {
    fn used_bytes_excluding(&self, key: &str) -> usize {
        self.entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

/// Session-scoped backend keeping every entry in a map.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryBackend {
    /// Unbounded backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend refusing writes once keys plus values exceed `quota_bytes`.
    #[must_use]
    pub fn with_quota(quota_bytes: usize) -> Self {
        let backend = Self::default();
        backend.inner.lock().quota_bytes = Some(quota_bytes);
        backend
    }

    /// Make every subsequent write fail, as a disabled storage area does.
    pub fn set_reject_writes(&self, reject: bool) {
        self.inner.lock().reject_writes = reject;
    }

    /// Write bytes directly, bypassing quota and rejection.
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.inner
            .lock()
            .entries
            .insert(key.to_owned(), value.to_owned());
    }

    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.inner.lock().entries.get(key).cloned()
    }

    /// Writes attempted through [`StorageBackend::write`], including refused ones.
    #[must_use]
    pub fn write_attempts(&self) -> usize {
        self.inner.lock().write_attempts
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Volatile
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.lock().entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.write_attempts += 1;
        if inner.reject_writes {
            return Err(WaypointError::StorageWrite {
                key: key.to_owned(),
                detail: "memory backend is rejecting writes".to_owned(),
            });
        }
        if let Some(quota) = inner.quota_bytes {
            let used = inner.used_bytes_excluding(key);
            let requested = key.len() + value.len();
            if used + requested > quota {
                return Err(WaypointError::QuotaExceeded {
                    requested,
                    available: quota.saturating_sub(used),
                });
            }
        }
        inner.entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.inner.lock().entries.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.inner.lock().entries.keys().cloned().collect())
    }
}
