//! dem-readiness - OBD readiness completion tracking
//!
//! Tracks per-group monitor completion across a driving cycle and
//! coordinates global diagnostic state:
//!
//! - [`tracker`] - per-group completion flags and deferred recalculation
//! - [`global_diag`] - confirmed-DTC counter and status-transition routing

pub mod global_diag;
pub mod tracker;

pub use global_diag::GlobalDiagnostics;
pub use tracker::ReadinessTracker;
