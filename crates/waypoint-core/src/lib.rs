//! Page memory for waypoint.
//!
//! [`PageMemoryService`] writes the user's last page on navigation and
//! validates it on restoration. [`NavigationObserver`] feeds it location
//! changes, [`EntryRedirector`] turns auth state plus stored page into one
//! redirect, and [`run_diagnostics`] sweeps the whole pipeline on demand.

pub mod config;
pub mod diagnostics;
pub mod entry;
pub mod observer;
pub mod service;

pub use config::{
    ObserverSettings, RetentionSettings, RouteSettings, StorageSettings, WaypointConfig,
};
pub use diagnostics::{
    DIAGNOSTIC_KEY, DiagnosticsReport, PermissionSample, RecordCheck, RecordProblem, StorageCheck,
    run_diagnostics,
};
pub use entry::{EntryDecision, EntryRedirector, explicit_logout_requested};
pub use observer::{NavigationObserver, ObservedNavigation};
pub use service::{
    PageMemoryService, RecordOutcome, RecordRejection, RestoreRejection,
};
