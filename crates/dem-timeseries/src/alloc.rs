//! Entry allocation and displacement
//!
//! A new entry takes any free slot. When the memory is full the
//! displacement policy picks a victim; if it refuses, storage is skipped
//! for this trigger without raising an error.

use dem_core::{DemConfig, EntryIndex, EventId, EVENT_INVALID};
use tracing::debug;

use crate::entry::TimeSeriesEntry;
use crate::memory::TimeSeriesMemory;
use crate::traits::{DisplacementPolicy, NvBlockState, OccupiedEntry};

impl TimeSeriesMemory {
    /// Resolve a slot for a new entry of `event` (already the
    /// representative of its combination), displacing a victim when the
    /// memory is full. Registers the entry at the end of the chronology
    /// with the current timestamp.
    pub(crate) fn allocate_entry(&mut self, event: EventId) -> Option<EntryIndex> {
        let index = if self.current_size() < self.entry_slots() {
            self.entries.iter().position(Option::is_none)?
        } else {
            let occupied: Vec<OccupiedEntry> = self
                .chronology
                .iter()
                .filter_map(|&slot| {
                    self.entries[slot].as_ref().map(|entry| OccupiedEntry {
                        index: slot,
                        event: entry.event_id,
                        timestamp: entry.timestamp,
                    })
                })
                .collect();
            let victim = self
                .displacement
                .select_victim(&occupied, &self.config, event)?;
            let victim_event = self
                .entry(victim)
                .map(|entry| entry.event_id)
                .unwrap_or(EVENT_INVALID);
            debug!(victim_slot = victim, victim_event, incoming = event, "displacing entry");

            // Dependent subsystems observe the removal as one update
            self.listener.on_update_start(victim_event);
            self.free_slot(victim, NvBlockState::Dirty);
            self.listener.on_update_finish(victim_event);
            victim
        };

        let series_count = self.config.series_count(event) as usize;
        let max_sets = self.max_sets();
        self.entries[index] = Some(TimeSeriesEntry::new(
            event,
            self.current_timestamp,
            series_count,
            max_sets,
        ));
        self.current_timestamp = self.current_timestamp.wrapping_add(1);
        self.companions[index].activate(series_count, max_sets);
        self.chronology.push(index);
        Some(index)
    }
}

/// Priority-based displacement: evicts the least important occupied entry
/// (highest priority value) that is strictly less important than the
/// incoming event; ties fall to the oldest entry. Refuses displacement
/// when every stored entry is at least as important as the incoming one.
pub struct PriorityDisplacement;

impl DisplacementPolicy for PriorityDisplacement {
    fn select_victim(
        &self,
        occupied: &[OccupiedEntry],
        config: &DemConfig,
        incoming: EventId,
    ) -> Option<EntryIndex> {
        let incoming_priority = config.event(incoming).ok()?.priority;
        let mut victim: Option<(EntryIndex, u8)> = None;
        for slot in occupied {
            let priority = config
                .event(slot.event)
                .map(|cfg| cfg.priority)
                .unwrap_or(u8::MAX);
            if priority <= incoming_priority {
                continue;
            }
            // Chronological scan: the first hit at a priority is the oldest
            if victim.map_or(true, |(_, best)| priority > best) {
                victim = Some((slot.index, priority));
            }
        }
        victim.map(|(index, _)| index)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dem_core::BitField256;

    use super::*;
    use crate::memory::TimeSeriesMemory;
    use crate::testing::{
        test_config, FixedVictimPolicy, MockRingBuffer, RecordingUpdateListener, UpdateCall,
    };
    use crate::traits::{NullNvHandler, NullUpdateListener};

    fn full_mask() -> BitField256 {
        let mut mask = BitField256::new();
        mask.set_all();
        mask
    }

    fn memory_with(
        displacement: Arc<dyn DisplacementPolicy>,
        listener: Arc<dyn crate::traits::UpdateListener>,
    ) -> (TimeSeriesMemory, MockRingBuffer) {
        let config = Arc::new(test_config());
        let memory = TimeSeriesMemory::new(
            config.clone(),
            0,
            Arc::new(NullNvHandler),
            displacement,
            listener,
        )
        .unwrap();
        let ring = MockRingBuffer::new(config.sampling_profiles.len(), 8);
        ring.push_sample(0, vec![1, 2, 3, 4]);
        ring.push_sample(1, vec![5, 6]);
        (memory, ring)
    }

    #[test]
    fn test_second_trigger_reuses_entry() {
        let (mut memory, ring) = memory_with(
            Arc::new(PriorityDisplacement),
            Arc::new(NullUpdateListener),
        );
        let first = memory.store_entry(1, &full_mask(), &ring).unwrap().unwrap();
        let second = memory.store_entry(1, &full_mask(), &ring).unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(memory.current_size(), 1);
    }

    #[test]
    fn test_timestamps_are_monotonic() {
        let (mut memory, ring) = memory_with(
            Arc::new(PriorityDisplacement),
            Arc::new(NullUpdateListener),
        );
        let e1 = memory.store_entry(1, &full_mask(), &ring).unwrap().unwrap();
        let e2 = memory.store_entry(2, &full_mask(), &ring).unwrap().unwrap();
        let t1 = memory.entry(e1).unwrap().timestamp;
        let t2 = memory.entry(e2).unwrap().timestamp;
        assert!(t2 > t1);
        assert_eq!(memory.chronology(), &[e1, e2]);
    }

    #[test]
    fn test_displacement_evicts_lower_priority() {
        let (mut memory, ring) = memory_with(
            Arc::new(PriorityDisplacement),
            Arc::new(NullUpdateListener),
        );
        // Fill both slots: event 1 (priority 10), event 2 (priority 20)
        let e1 = memory.store_entry(1, &full_mask(), &ring).unwrap().unwrap();
        let e2 = memory.store_entry(2, &full_mask(), &ring).unwrap().unwrap();

        // Event 4 (priority 5) displaces the least important entry
        let e4 = memory.store_entry(4, &full_mask(), &ring).unwrap().unwrap();
        assert_eq!(e4, e2);
        assert_eq!(memory.find_entry_index(2), None);
        assert_eq!(memory.find_entry_index(1), Some(e1));
        assert_eq!(memory.current_size(), 2);
    }

    #[test]
    fn test_storage_refused_when_no_victim() {
        let (mut memory, ring) = memory_with(
            Arc::new(PriorityDisplacement),
            Arc::new(NullUpdateListener),
        );
        // Fill with event 4 (priority 5) and event 1 (priority 10)
        memory.store_entry(4, &full_mask(), &ring).unwrap().unwrap();
        memory.store_entry(1, &full_mask(), &ring).unwrap().unwrap();

        // Event 2 (priority 20) is less important than both: refused
        assert_eq!(memory.store_entry(2, &full_mask(), &ring).unwrap(), None);
        assert_eq!(memory.current_size(), 2);
        assert_eq!(memory.find_entry_index(2), None);
    }

    #[test]
    fn test_policy_choice_is_honoured() {
        // A policy that always picks slot 0, regardless of priority
        let (mut memory, ring) = memory_with(
            Arc::new(FixedVictimPolicy(Some(0))),
            Arc::new(NullUpdateListener),
        );
        let e1 = memory.store_entry(1, &full_mask(), &ring).unwrap().unwrap();
        memory.store_entry(2, &full_mask(), &ring).unwrap().unwrap();
        assert_eq!(e1, 0);

        let e4 = memory.store_entry(4, &full_mask(), &ring).unwrap().unwrap();
        assert_eq!(e4, 0);
        assert_eq!(memory.find_entry_index(1), None);
    }

    #[test]
    fn test_displacement_notifies_update_pair() {
        let listener = Arc::new(RecordingUpdateListener::new());
        let (mut memory, ring) = memory_with(Arc::new(PriorityDisplacement), listener.clone());
        memory.store_entry(1, &full_mask(), &ring).unwrap();
        memory.store_entry(2, &full_mask(), &ring).unwrap();
        assert!(listener.calls().is_empty());

        memory.store_entry(4, &full_mask(), &ring).unwrap();
        assert_eq!(
            listener.calls(),
            vec![UpdateCall::Start(2), UpdateCall::Finish(2)]
        );
    }

    #[test]
    fn test_priority_tie_falls_to_oldest() {
        let mut config = test_config();
        // Make events 1 and 2 equally unimportant
        config.events[0].priority = 20;
        config.events[1].priority = 20;
        let config = Arc::new(config);
        let mut memory = TimeSeriesMemory::new(
            config.clone(),
            0,
            Arc::new(NullNvHandler),
            Arc::new(PriorityDisplacement),
            Arc::new(NullUpdateListener),
        )
        .unwrap();
        let ring = MockRingBuffer::new(config.sampling_profiles.len(), 8);
        ring.push_sample(0, vec![1, 2, 3, 4]);
        ring.push_sample(1, vec![5, 6]);

        let e1 = memory.store_entry(1, &full_mask(), &ring).unwrap().unwrap();
        memory.store_entry(2, &full_mask(), &ring).unwrap().unwrap();

        // Event 4 (priority 5) displaces the oldest of the equal-priority pair
        let e4 = memory.store_entry(4, &full_mask(), &ring).unwrap().unwrap();
        assert_eq!(e4, e1);
        assert_eq!(memory.find_entry_index(1), None);
        assert!(memory.find_entry_index(2).is_some());
    }
}
