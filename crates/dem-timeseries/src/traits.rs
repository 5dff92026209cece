//! Interfaces to external collaborators
//!
//! The engine consumes these seams; production implementations live with
//! the surrounding basic-software stack. Reference and test doubles are
//! provided under [`crate::testing`] and by the simulator.

use dem_core::{DemConfig, EntryIndex, EventId, NvBlockId};

/// Persistence marking for one NvM block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NvBlockState {
    /// Write back with the next regular NvM cycle
    Dirty,
    /// Write back as soon as possible
    DirtyImmediate,
}

/// NvM adapter surface. Block layout and write scheduling are owned by
/// the adapter; the engine only marks blocks.
pub trait NvBlockHandler {
    fn set_block_state(&self, block: NvBlockId, state: NvBlockState);
}

/// NvM handler that drops all markings (time-series persistence disabled)
pub struct NullNvHandler;

impl NvBlockHandler for NullNvHandler {
    fn set_block_state(&self, _block: NvBlockId, _state: NvBlockState) {}
}

/// Ring-buffer sampler readout, per sampling profile.
///
/// Chronological indices run oldest to newest; index `sample_count - 1`
/// is the most recent sample.
pub trait RingBufferReader {
    /// Samples currently held for a profile
    fn sample_count(&self, profile: usize) -> u8;

    /// Sample payload at chronological position `index` (0 = oldest)
    fn read_slot_chronological(&self, profile: usize, index: u8) -> Option<Vec<u8>>;

    /// Monotonic id of the most recent sample
    fn most_recent_sample_id(&self, profile: usize) -> u32;

    /// Sampler ticks since the most recent sample was taken
    fn time_since_last_sample(&self, profile: usize) -> u16;

    /// TRUE once per freshly collected sample; the flag is consumed by
    /// the call. The engine is the only consumer.
    fn new_sample_available(&self, profile: usize) -> bool;
}

/// Victim selection when a memory is full
pub trait DisplacementPolicy {
    /// Pick the entry to displace in favour of `incoming`, or None to
    /// refuse storage
    fn select_victim(
        &self,
        occupied: &[OccupiedEntry],
        config: &DemConfig,
        incoming: EventId,
    ) -> Option<EntryIndex>;
}

/// Occupied-slot descriptor handed to the displacement policy, in
/// chronological order (oldest first)
#[derive(Debug, Clone, Copy)]
pub struct OccupiedEntry {
    pub index: EntryIndex,
    pub event: EventId,
    pub timestamp: u32,
}

/// Notification pair emitted around destructive entry updates so
/// dependent subsystems observe a consistent entry table
pub trait UpdateListener {
    fn on_update_start(&self, event: EventId);
    fn on_update_finish(&self, event: EventId);
}

/// Listener that ignores all notifications
pub struct NullUpdateListener;

impl UpdateListener for NullUpdateListener {
    fn on_update_start(&self, _event: EventId) {}
    fn on_update_finish(&self, _event: EventId) {}
}
