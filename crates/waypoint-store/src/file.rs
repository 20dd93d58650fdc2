//! Durable backend: one file per key inside a directory.
//!
//! File names are the hex-encoded key plus `.json`, so any key is a valid
//! file name. Writes go to a sibling `.tmp` file that is renamed into place;
//! a crash mid-write leaves either the old value or the new one.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;
use waypoint_error::{Result, WaypointError};

use crate::backend::{BackendKind, StorageBackend};

const ENTRY_SUFFIX: &str = ".json";
const TMP_SUFFIX: &str = ".tmp";

fn encode_key(key: &str) -> String {
    format!("{}{ENTRY_SUFFIX}", hex::encode(key))
}

fn decode_key(file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(ENTRY_SUFFIX)?;
    String::from_utf8(hex::decode(stem).ok()?).ok()
}

/// File-per-key backend rooted at a directory.
#[derive(Debug)]
pub struct FileBackend {
    root: PathBuf,
    quota_bytes: Option<u64>,
    // Serializes read-modify-write of the quota check with the rename.
    write_lock: Mutex<()>,
}

impl FileBackend {
    /// Backend rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            quota_bytes: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Limit the total size of stored values.
    #[must_use]
    pub fn with_quota(mut self, quota_bytes: u64) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(encode_key(key))
    }

    fn used_bytes_excluding(&self, skip: &Path) -> Result<u64> {
        let mut total = 0_u64;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if path == skip {
                continue;
            }
            let is_entry = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(ENTRY_SUFFIX));
            if is_entry {
                total = total.saturating_add(entry.metadata()?.len());
            }
        }
        Ok(total)
    }
}

impl StorageBackend for FileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Durable
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        match fs::read(self.entry_path(key)) {
            // Invalid UTF-8 surfaces as undecodable text, not as an I/O fault.
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        fs::create_dir_all(&self.root)?;
        let target = self.entry_path(key);

        if let Some(quota) = self.quota_bytes {
            let used = self.used_bytes_excluding(&target)?;
            let requested = value.len() as u64;
            if used.saturating_add(requested) > quota {
                return Err(WaypointError::QuotaExceeded {
                    requested: value.len(),
                    available: quota.saturating_sub(used) as usize,
                });
            }
        }

        let mut tmp_name = target.clone().into_os_string();
        tmp_name.push(TMP_SUFFIX);
        let tmp = PathBuf::from(tmp_name);
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &target)?;
        debug!(
            target: "waypoint.store::file",
            key,
            bytes = value.len(),
            "entry written"
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let _guard = self.write_lock.lock();
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry?;
            if let Some(key) = entry.file_name().to_str().and_then(decode_key) {
                keys.push(key);
            }
        }
        keys.sort_unstable();
        Ok(keys)
    }
}
