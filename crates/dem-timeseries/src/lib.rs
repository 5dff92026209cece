//! dem-timeseries - Time-series snapshot memory engine
//!
//! Stores per-event snapshot sets (past + future samples copied from a
//! ring-buffer sampler) in a displaceable entry table, persists them via
//! an NvM block abstraction, and exposes a record-number readout surface
//! for diagnostic services.
//!
//! # Modules
//!
//! - [`entry`] - persisted entry and sample-set storage
//! - [`fifo`] - snapshot-set FIFO cursor management
//! - [`companion`] - transient readout-lock and fill-state metadata
//! - [`traits`] - interfaces to external collaborators
//! - [`memory`] - the memory context and its public operations
//! - [`alloc`] - entry allocation and displacement
//! - [`storage`] - past/future sample storage
//! - [`restore`] - restore-on-init reconciliation
//! - [`iterator`] - record-number readout cursor
//! - [`testing`] - hand-rolled collaborator doubles

pub mod alloc;
pub mod companion;
pub mod entry;
pub mod fifo;
pub mod iterator;
pub mod memory;
pub mod restore;
pub mod storage;
pub mod testing;
pub mod traits;

pub use alloc::PriorityDisplacement;
pub use companion::{EntryCompanion, ReadoutState};
pub use entry::{SampleSet, SeriesHeader, TimeSeriesEntry};
pub use iterator::{RecordIterator, SequentialInfo};
pub use memory::TimeSeriesMemory;
pub use traits::{
    DisplacementPolicy, NullNvHandler, NullUpdateListener, NvBlockHandler, NvBlockState,
    OccupiedEntry, RingBufferReader, UpdateListener,
};
