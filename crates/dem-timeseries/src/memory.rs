//! Time-series memory context
//!
//! [`TimeSeriesMemory`] owns the entry slot table, the companions, the
//! chronology array and the monotonic timestamp of one translated memory
//! region, plus handles to the external collaborators. All mutating
//! operations run synchronously in the calling context; the periodic
//! [`TimeSeriesMemory::main_function`] performs future-sample catch-up
//! and deferred cleanup.

use std::sync::Arc;

use dem_core::{BitField256, DemConfig, DemError, DemResult, EntryIndex, EventId, NvBlockId};
use tracing::{debug, info};

use crate::companion::{EntryCompanion, ReadoutState};
use crate::entry::TimeSeriesEntry;
use crate::traits::{DisplacementPolicy, NvBlockHandler, NvBlockState, RingBufferReader, UpdateListener};

/// Entry table, chronology and counters of one time-series memory region
pub struct TimeSeriesMemory {
    pub(crate) config: Arc<DemConfig>,
    pub(crate) memory_id: usize,
    pub(crate) entries: Vec<Option<TimeSeriesEntry>>,
    pub(crate) companions: Vec<EntryCompanion>,
    /// Occupied entry indices, oldest first
    pub(crate) chronology: Vec<EntryIndex>,
    /// Next creation timestamp
    pub(crate) current_timestamp: u32,
    pub(crate) nv: Arc<dyn NvBlockHandler>,
    pub(crate) displacement: Arc<dyn DisplacementPolicy>,
    pub(crate) listener: Arc<dyn UpdateListener>,
}

impl TimeSeriesMemory {
    /// Fresh, empty memory region
    pub fn new(
        config: Arc<DemConfig>,
        memory_id: usize,
        nv: Arc<dyn NvBlockHandler>,
        displacement: Arc<dyn DisplacementPolicy>,
        listener: Arc<dyn UpdateListener>,
    ) -> DemResult<Self> {
        let slots = config
            .memories
            .get(memory_id)
            .ok_or_else(|| {
                DemError::ConfigInconsistency(format!("unknown memory region {}", memory_id))
            })?
            .entry_slots;
        Ok(Self {
            config,
            memory_id,
            entries: vec![None; slots],
            companions: vec![EntryCompanion::default(); slots],
            chronology: Vec::with_capacity(slots),
            current_timestamp: 0,
            nv,
            displacement,
            listener,
        })
    }

    /// Rebuild a memory region from NvM-restored entry slots.
    ///
    /// [`TimeSeriesMemory::reconcile`] must run before normal operation;
    /// until then chronology and companions are unpopulated.
    pub fn from_persisted(
        config: Arc<DemConfig>,
        memory_id: usize,
        restored: Vec<Option<TimeSeriesEntry>>,
        nv: Arc<dyn NvBlockHandler>,
        displacement: Arc<dyn DisplacementPolicy>,
        listener: Arc<dyn UpdateListener>,
    ) -> DemResult<Self> {
        let mut memory = Self::new(config, memory_id, nv, displacement, listener)?;
        for (slot, entry) in restored.into_iter().enumerate() {
            if slot >= memory.entries.len() {
                break;
            }
            memory.entries[slot] = entry;
        }
        Ok(memory)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Index of this region in the configuration
    pub fn memory_id(&self) -> usize {
        self.memory_id
    }

    /// Number of entry slots
    pub fn entry_slots(&self) -> usize {
        self.entries.len()
    }

    /// Number of occupied entry slots
    pub fn current_size(&self) -> usize {
        self.chronology.len()
    }

    /// Next creation timestamp
    pub fn current_timestamp(&self) -> u32 {
        self.current_timestamp
    }

    /// Occupied entry indices, oldest first
    pub fn chronology(&self) -> &[EntryIndex] {
        &self.chronology
    }

    /// Entry at a slot, if occupied
    pub fn entry(&self, index: EntryIndex) -> Option<&TimeSeriesEntry> {
        self.entries.get(index).and_then(Option::as_ref)
    }

    /// Readout-lock state of a slot
    pub fn companion_state(&self, index: EntryIndex) -> ReadoutState {
        self.companions
            .get(index)
            .map(EntryCompanion::state)
            .unwrap_or_default()
    }

    /// Slot of the entry owned by an event, if one exists
    pub fn find_entry_index(&self, event: EventId) -> Option<EntryIndex> {
        self.entries
            .iter()
            .position(|e| e.as_ref().is_some_and(|e| e.event_id == event))
    }

    /// Slot of another entry owned by the same event, excluding `slot`
    pub(crate) fn find_other_entry_of_event(
        &self,
        event: EventId,
        slot: EntryIndex,
    ) -> Option<EntryIndex> {
        self.entries.iter().enumerate().position(|(i, e)| {
            i != slot && e.as_ref().is_some_and(|e| e.event_id == event)
        })
    }

    /// FIFO depth of this region
    pub(crate) fn max_sets(&self) -> u8 {
        self.config.memories[self.memory_id].max_sets
    }

    /// NvM block backing a slot
    pub(crate) fn nv_block_of(&self, index: EntryIndex) -> NvBlockId {
        self.config.nv_block(self.memory_id, index)
    }

    // =========================================================================
    // Storage operations
    // =========================================================================

    /// Store (or update) the time-series entry of an event.
    ///
    /// Called synchronously from event status processing when a storage
    /// trigger newly holds. `trigger_mask` carries one bit per triggered
    /// series. Returns the entry slot, or None when storage was skipped
    /// (no trigger, time series disabled, or no slot available).
    pub fn store_entry(
        &mut self,
        event: EventId,
        trigger_mask: &BitField256,
        ring: &dyn RingBufferReader,
    ) -> DemResult<Option<EntryIndex>> {
        if !self.config.capabilities.time_series_enabled {
            return Ok(None);
        }
        let master = self.config.master_event(event);
        let cfg = self.config.event(master)?;
        if cfg.memory != self.memory_id {
            return Err(DemError::ConfigInconsistency(format!(
                "event {} is not stored in memory {}",
                master, self.memory_id
            )));
        }
        if trigger_mask.is_empty() {
            return Ok(None);
        }

        let index = match self.find_entry_index(master) {
            Some(index) => index,
            None => match self.allocate_entry(master) {
                Some(index) => index,
                None => {
                    // Storage refused, retried naturally on the next trigger
                    debug!(event = master, "no time-series slot available, trigger skipped");
                    return Ok(None);
                }
            },
        };

        self.store_past_samples(index, trigger_mask, ring);
        Ok(Some(index))
    }

    /// Periodic task: future-sample catch-up first, deferred cleanup
    /// second. The ordering guarantees a release request never races a
    /// still-in-progress fill within the same cycle.
    pub fn main_function(&mut self, ring: &dyn RingBufferReader) {
        if !self.config.capabilities.time_series_enabled {
            return;
        }
        self.process_future_samples(ring);
        self.process_pending_cleanup();
    }

    /// Remove the entry of an event, typically on DTC clear. While a
    /// readout lock is held the removal is deferred until release.
    pub fn invalidate_entry_of_event(
        &mut self,
        event: EventId,
        block_state: NvBlockState,
    ) -> DemResult<()> {
        let master = self.config.master_event(event);
        self.config.event(master)?;
        let Some(index) = self.find_entry_index(master) else {
            return Ok(());
        };
        if self.companions[index].is_locked() {
            debug!(event = master, slot = index, "entry locked, removal deferred");
            self.companions[index].defer_cleanup(block_state);
        } else {
            info!(event = master, slot = index, "time-series entry invalidated");
            self.free_slot(index, block_state);
        }
        Ok(())
    }

    // =========================================================================
    // Readout locking
    // =========================================================================

    /// Acquire the readout lock of an entry for a diagnostic client
    pub fn lock_entry_for_readout(&mut self, index: EntryIndex) -> DemResult<()> {
        if self.entry(index).is_none() {
            return Err(DemError::NoEntry(index));
        }
        self.companions[index]
            .try_lock()
            .map_err(|_| DemError::Locked(index))
    }

    /// Release the readout lock after the client finished reading. A
    /// removal requested under the lock is performed by the next periodic
    /// task.
    pub fn release_entry(&mut self, index: EntryIndex) -> DemResult<()> {
        let companion = self
            .companions
            .get_mut(index)
            .ok_or(DemError::NoEntry(index))?;
        companion.release().map_err(|_| DemError::NotLocked(index))
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    /// Free a slot: drop the entry, reset the companion, clear the
    /// chronology position and mark the backing NvM block
    pub(crate) fn free_slot(&mut self, index: EntryIndex, state: NvBlockState) {
        self.entries[index] = None;
        self.companions[index].reset();
        self.chronology.retain(|&slot| slot != index);
        self.nv.set_block_state(self.nv_block_of(index), state);
    }

    fn process_pending_cleanup(&mut self) {
        for index in 0..self.companions.len() {
            if let Some(state) = self.companions[index].take_pending_cleanup() {
                info!(slot = index, "deferred time-series cleanup");
                self.free_slot(index, state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, MockRingBuffer, RecordingNvHandler};
    use crate::{NullUpdateListener, PriorityDisplacement};

    fn memory_with_nv() -> (TimeSeriesMemory, Arc<RecordingNvHandler>, MockRingBuffer) {
        let config = Arc::new(test_config());
        let nv = Arc::new(RecordingNvHandler::new());
        let memory = TimeSeriesMemory::new(
            config.clone(),
            0,
            nv.clone(),
            Arc::new(PriorityDisplacement),
            Arc::new(NullUpdateListener),
        )
        .unwrap();
        let ring = MockRingBuffer::new(config.sampling_profiles.len(), 8);
        (memory, nv, ring)
    }

    fn full_mask() -> BitField256 {
        let mut mask = BitField256::new();
        mask.set_all();
        mask
    }

    #[test]
    fn test_store_entry_requires_known_event() {
        let (mut memory, _nv, ring) = memory_with_nv();
        assert!(memory.store_entry(99, &full_mask(), &ring).is_err());
        assert!(memory.store_entry(0, &full_mask(), &ring).is_err());
    }

    #[test]
    fn test_store_entry_skips_on_empty_mask() {
        let (mut memory, _nv, ring) = memory_with_nv();
        let result = memory.store_entry(1, &BitField256::new(), &ring).unwrap();
        assert_eq!(result, None);
        assert_eq!(memory.current_size(), 0);
    }

    #[test]
    fn test_store_entry_resolves_master_event() {
        let (mut memory, _nv, ring) = memory_with_nv();
        ring.push_sample(0, vec![1, 2, 3, 4]);
        // Event 3 is a sub-event of event 1
        let index = memory.store_entry(3, &full_mask(), &ring).unwrap().unwrap();
        assert_eq!(memory.entry(index).unwrap().event_id, 1);
        assert_eq!(memory.find_entry_index(1), Some(index));
        assert_eq!(memory.find_entry_index(3), None);
    }

    #[test]
    fn test_disabled_time_series_is_a_noop() {
        let mut config = test_config();
        config.capabilities.time_series_enabled = false;
        let nv = Arc::new(RecordingNvHandler::new());
        let mut memory = TimeSeriesMemory::new(
            Arc::new(config),
            0,
            nv.clone(),
            Arc::new(PriorityDisplacement),
            Arc::new(NullUpdateListener),
        )
        .unwrap();
        let ring = MockRingBuffer::new(2, 8);
        assert_eq!(memory.store_entry(1, &full_mask(), &ring).unwrap(), None);
        memory.main_function(&ring);
        assert!(nv.calls().is_empty());
    }

    #[test]
    fn test_invalidate_removes_entry_and_marks_block() {
        let (mut memory, nv, ring) = memory_with_nv();
        ring.push_sample(0, vec![1, 2, 3, 4]);
        let index = memory.store_entry(1, &full_mask(), &ring).unwrap().unwrap();
        nv.clear();

        memory
            .invalidate_entry_of_event(1, NvBlockState::DirtyImmediate)
            .unwrap();
        assert_eq!(memory.entry(index), None);
        assert_eq!(memory.current_size(), 0);
        assert_eq!(
            nv.last(),
            Some((memory.nv_block_of(index), NvBlockState::DirtyImmediate))
        );
        // Invalidating again is harmless
        memory
            .invalidate_entry_of_event(1, NvBlockState::Dirty)
            .unwrap();
    }

    #[test]
    fn test_invalidate_is_deferred_while_locked() {
        let (mut memory, _nv, ring) = memory_with_nv();
        ring.push_sample(0, vec![1, 2, 3, 4]);
        let index = memory.store_entry(1, &full_mask(), &ring).unwrap().unwrap();

        memory.lock_entry_for_readout(index).unwrap();
        memory
            .invalidate_entry_of_event(1, NvBlockState::Dirty)
            .unwrap();
        // Entry survives while the readout client holds the buffer
        assert!(memory.entry(index).is_some());
        memory.main_function(&ring);
        assert!(memory.entry(index).is_some());

        memory.release_entry(index).unwrap();
        assert!(memory.entry(index).is_some());
        memory.main_function(&ring);
        assert_eq!(memory.entry(index), None);
        assert_eq!(memory.companion_state(index), ReadoutState::Unused);
    }

    #[test]
    fn test_lock_and_release_errors() {
        let (mut memory, _nv, ring) = memory_with_nv();
        assert!(matches!(
            memory.lock_entry_for_readout(0),
            Err(DemError::NoEntry(0))
        ));
        assert!(matches!(
            memory.release_entry(42),
            Err(DemError::NoEntry(42))
        ));

        ring.push_sample(0, vec![1, 2, 3, 4]);
        let index = memory.store_entry(1, &full_mask(), &ring).unwrap().unwrap();
        assert!(matches!(
            memory.release_entry(index),
            Err(DemError::NotLocked(_))
        ));

        memory.lock_entry_for_readout(index).unwrap();
        assert!(matches!(
            memory.lock_entry_for_readout(index),
            Err(DemError::Locked(_))
        ));
    }
}
