//! Common error types for the event manager crates

use thiserror::Error;

use crate::types::{EntryIndex, EventId};

/// Result type for event-manager operations
pub type DemResult<T> = Result<T, DemError>;

/// Errors surfaced to immediate callers
#[derive(Debug, Error)]
pub enum DemError {
    /// Event id out of configured range
    #[error("Unknown event: {0}")]
    UnknownEvent(EventId),

    /// Series id out of range for the event
    #[error("Unknown series {series} for event {event}")]
    UnknownSeries { event: EventId, series: u8 },

    /// Entry slot index out of range or unoccupied
    #[error("No entry at slot {0}")]
    NoEntry(EntryIndex),

    /// Entry is locked by a diagnostic readout client
    #[error("Entry {0} is locked for readout")]
    Locked(EntryIndex),

    /// Release requested for an entry that holds no readout lock
    #[error("Entry {0} is not locked")]
    NotLocked(EntryIndex),

    /// Time-series storage is disabled by configuration
    #[error("Time-series storage is disabled")]
    TimeSeriesDisabled,

    /// Configuration table inconsistency
    #[error("Configuration inconsistency: {0}")]
    ConfigInconsistency(String),

    /// Configuration file could not be loaded
    #[error("Failed to load configuration: {0}")]
    ConfigLoad(String),
}
