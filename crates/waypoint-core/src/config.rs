//! Waypoint configuration, loaded from TOML.
//!
//! Every field has a default, so an empty document is a valid
//! configuration:
//!
//! ```toml
//! [storage]
//! durable_dir = "/var/lib/app/waypoint"
//! quota_bytes = 5242880
//!
//! [routes]
//! tracked_prefix = "/app/"
//! unmatched = "deny"
//!
//! [observer]
//! error_threshold = 10
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use waypoint_error::{Result, WaypointError};
use waypoint_observability::MonitorConfig;
use waypoint_routes::{RouteTableConfig, TrackingConfig};
use waypoint_store::{PURGE_AGE_MS, StoreOptions};
use waypoint_types::{DEFAULT_EXPIRY_MS, DEFAULT_KEY_PREFIX, FUTURE_TOLERANCE_MS, MINUTE_MS};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WaypointConfig {
    pub storage: StorageSettings,
    pub retention: RetentionSettings,
    pub observer: ObserverSettings,
    pub routes: RouteSettings,
    pub monitor: MonitorConfig,
}

/// Persistence settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory for the durable file backend. Without one only the
    /// volatile tier is used.
    pub durable_dir: Option<PathBuf>,
    /// Prefix of every page-memory key.
    pub key_prefix: String,
    /// Byte quota applied to each backend.
    pub quota_bytes: Option<u64>,
    /// Tracking entries older than this are purged on quota pressure.
    pub purge_age_ms: i64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            durable_dir: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_owned(),
            quota_bytes: None,
            purge_age_ms: PURGE_AGE_MS,
        }
    }
}

impl StorageSettings {
    #[must_use]
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            key_prefix: self.key_prefix.clone(),
            purge_age_ms: self.purge_age_ms,
        }
    }
}

/// Freshness window for restoration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSettings {
    pub max_age_ms: i64,
    pub future_tolerance_ms: i64,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            max_age_ms: DEFAULT_EXPIRY_MS,
            future_tolerance_ms: FUTURE_TOLERANCE_MS,
        }
    }
}

/// Navigation observer circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverSettings {
    /// Recording stops once more than this many failures accumulate.
    pub error_threshold: u32,
    /// Quiet period after the last failure before recording resumes.
    pub cooldown_ms: i64,
}

impl Default for ObserverSettings {
    fn default() -> Self {
        Self {
            error_threshold: 10,
            cooldown_ms: 5 * MINUTE_MS,
        }
    }
}

/// Route table, tracking policy, and the login target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteSettings {
    pub login_path: String,
    #[serde(flatten)]
    pub tracking: TrackingConfig,
    #[serde(flatten)]
    pub table: RouteTableConfig,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            login_path: "/login".to_owned(),
            tracking: TrackingConfig::default(),
            table: RouteTableConfig::standard(),
        }
    }
}

impl WaypointConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|err| WaypointError::Config(err.to_string()))?;
        config.validated()
    }

    /// Read, parse, and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Every problem found, empty when the configuration is usable.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.storage.key_prefix.trim().is_empty() {
            errors.push("storage.key_prefix must not be empty".to_owned());
        }
        if self.storage.purge_age_ms <= 0 {
            errors.push("storage.purge_age_ms must be > 0".to_owned());
        }
        if self.storage.quota_bytes == Some(0) {
            errors.push("storage.quota_bytes must be > 0 when set".to_owned());
        }
        if self.retention.max_age_ms <= 0 {
            errors.push("retention.max_age_ms must be > 0".to_owned());
        }
        if self.retention.future_tolerance_ms < 0 {
            errors.push("retention.future_tolerance_ms must not be negative".to_owned());
        }
        if self.storage.purge_age_ms < self.retention.max_age_ms {
            errors.push(format!(
                "storage.purge_age_ms ({}) < retention.max_age_ms ({})",
                self.storage.purge_age_ms, self.retention.max_age_ms
            ));
        }
        if self.observer.cooldown_ms < 0 {
            errors.push("observer.cooldown_ms must not be negative".to_owned());
        }

        let prefix = &self.routes.tracking.tracked_prefix;
        if prefix.is_empty() {
            errors.push("routes.tracked_prefix must not be empty".to_owned());
        } else if !prefix.starts_with('/') {
            errors.push(format!("routes.tracked_prefix must start with '/': {prefix}"));
        }
        if !self.routes.login_path.starts_with('/') {
            errors.push(format!(
                "routes.login_path must start with '/': {}",
                self.routes.login_path
            ));
        }

        if self.monitor.capacity == 0 {
            errors.push("monitor.capacity must be > 0".to_owned());
        }
        if self.monitor.window_ms <= 0 {
            errors.push("monitor.window_ms must be > 0".to_owned());
        }
        if self.monitor.warning_errors > self.monitor.critical_errors {
            errors.push(format!(
                "monitor.warning_errors ({}) > monitor.critical_errors ({})",
                self.monitor.warning_errors, self.monitor.critical_errors
            ));
        }
        if !(0.0..=1.0).contains(&self.monitor.min_restore_success_rate) {
            errors.push("monitor.min_restore_success_rate must be within [0, 1]".to_owned());
        }

        errors
    }

    /// `self` when [`validate`](Self::validate) finds nothing.
    pub fn validated(self) -> Result<Self> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(WaypointError::Config(errors.join("; ")))
        }
    }
}
