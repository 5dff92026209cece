//! dem-core - Core types for the diagnostic event manager
//!
//! Shared building blocks used by the readiness tracker and the
//! time-series memory engine:
//!
//! - [`types`] - identifier aliases and sentinels
//! - [`status`] - ISO 14229 DTC status bits and storage triggers
//! - [`readiness`] - OBD readiness-group taxonomy
//! - [`bitfield`] - fixed 256-bit flag vector
//! - [`config`] - generated configuration tables (read-only oracle)
//! - [`error`] - common error types

pub mod bitfield;
pub mod config;
pub mod error;
pub mod readiness;
pub mod status;
pub mod types;

pub use bitfield::BitField256;
pub use config::DemConfig;
pub use error::{DemError, DemResult};
pub use readiness::ReadinessGroup;
pub use status::StorageTrigger;
pub use types::{
    EntryIndex, EventId, NvBlockId, SeriesId, SetId, ENTRY_INVALID, EVENT_INVALID,
};
