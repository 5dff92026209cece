//! Restore-on-init reconciliation
//!
//! Runs once at startup after the NvM content was read back, before
//! normal operation. Every persisted slot is validated against the
//! current configuration and the current DTC status; inconsistent slots
//! are repaired by eviction, never by aborting boot.

use dem_core::{EventId, SeriesId};
use tracing::{error, info};

use crate::memory::TimeSeriesMemory;
use crate::traits::NvBlockState;

impl TimeSeriesMemory {
    /// Walk all persisted slots: evict orphans and duplicate losers,
    /// reinitialize series whose storage trigger no longer holds, clear
    /// readout locks, and rebuild the chronology in timestamp order.
    ///
    /// `status_of` yields the currently stored DTC status byte of an
    /// event. The pass is idempotent: a second run evicts nothing and
    /// leaves the chronology ordering unchanged.
    pub fn reconcile(&mut self, status_of: &dyn Fn(EventId) -> u8) {
        let config = self.config.clone();
        let max_sets = self.max_sets();
        self.chronology.clear();

        for index in 0..self.entries.len() {
            // Companion state never survives a reboot
            self.companions[index].reset();
            let Some((event, timestamp, series_len)) = self
                .entry(index)
                .map(|e| (e.event_id, e.timestamp, e.series.len()))
            else {
                continue;
            };

            // An entry that no longer maps to this memory, is not the
            // representative of its combination, or disagrees with the
            // series table indicates a configuration change without a
            // prior NvM clear
            let orphaned = !config.is_valid_event(event)
                || config
                    .event(event)
                    .map(|cfg| cfg.memory != self.memory_id)
                    .unwrap_or(true)
                || !config.is_master_event(event)
                || series_len != config.series_count(event) as usize;
            if orphaned {
                error!(event, slot = index, "restored entry inconsistent with configuration, evicting");
                self.free_slot(index, NvBlockState::DirtyImmediate);
                continue;
            }

            if let Some(other) = self.find_other_entry_of_event(event, index) {
                let other_timestamp = self
                    .entry(other)
                    .map(|e| e.timestamp)
                    .unwrap_or(0);
                if other_timestamp >= timestamp {
                    error!(event, slot = index, kept = other, "duplicate entry, evicting older");
                    self.free_slot(index, NvBlockState::DirtyImmediate);
                    continue;
                }
                error!(event, slot = other, kept = index, "duplicate entry, evicting older");
                self.free_slot(other, NvBlockState::DirtyImmediate);
            }

            // A series stored for a trigger that no longer holds (e.g.
            // confirmed entry for a DTC that is no longer confirmed) is
            // restarted; an entry with no surviving series is dropped
            let status = status_of(event);
            let series_count = config.series_count(event);
            let mut reinitialized = 0u8;
            {
                let Some(entry) = self.entries[index].as_mut() else {
                    continue;
                };
                for sid in 0..series_count {
                    let Ok(series_cfg) = config.series_of(event, sid as SeriesId) else {
                        continue;
                    };
                    if !series_cfg.trigger.still_holds(status) {
                        entry.reinit_series(sid, max_sets);
                        reinitialized += 1;
                    }
                }
            }
            if series_count > 0 && reinitialized == series_count {
                error!(event, slot = index, "storage trigger no longer holds, evicting entry");
                self.free_slot(index, NvBlockState::DirtyImmediate);
                continue;
            }

            // Readout locks are virtual-buffer state and never persist
            self.companions[index].activate(series_count as usize, max_sets);

            // Chronology reinsertion by timestamp, stable for equal stamps
            let position = self
                .chronology
                .iter()
                .position(|&slot| {
                    self.entry(slot)
                        .map(|e| e.timestamp > timestamp)
                        .unwrap_or(false)
                })
                .unwrap_or(self.chronology.len());
            self.chronology.insert(position, index);
            if self.current_timestamp < timestamp {
                self.current_timestamp = timestamp;
            }
        }

        // Separates restore-time insertions from post-boot insertions
        self.current_timestamp = self.current_timestamp.wrapping_add(1);
        info!(
            memory = self.memory_id,
            entries = self.chronology.len(),
            timestamp = self.current_timestamp,
            "time-series memory reconciled"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dem_core::status::status_bit;
    use dem_core::DemConfig;

    use super::*;
    use crate::companion::ReadoutState;
    use crate::entry::TimeSeriesEntry;
    use crate::memory::TimeSeriesMemory;
    use crate::testing::{test_config, RecordingNvHandler};
    use crate::{NullUpdateListener, PriorityDisplacement};

    const CONFIRMED: u8 = status_bit::CONFIRMED_DTC;

    fn persisted_memory(
        config: DemConfig,
        restored: Vec<Option<TimeSeriesEntry>>,
    ) -> (TimeSeriesMemory, Arc<RecordingNvHandler>) {
        let nv = Arc::new(RecordingNvHandler::new());
        let memory = TimeSeriesMemory::from_persisted(
            Arc::new(config),
            0,
            restored,
            nv.clone(),
            Arc::new(PriorityDisplacement),
            Arc::new(NullUpdateListener),
        )
        .unwrap();
        (memory, nv)
    }

    fn stored_entry(event: u16, timestamp: u32, series_count: usize) -> TimeSeriesEntry {
        let mut entry = TimeSeriesEntry::new(event, timestamp, series_count, 2);
        for header in &mut entry.series {
            header.get_and_update_set_id(2);
            header.sets[0].samples = vec![Some(vec![0xAB]); 3];
        }
        entry
    }

    #[test]
    fn test_valid_entries_survive_and_sort_chronologically() {
        let restored = vec![
            Some(stored_entry(2, 9, 2)),
            Some(stored_entry(1, 4, 1)),
        ];
        let (mut memory, nv) = persisted_memory(test_config(), restored);
        memory.reconcile(&|event| if event == 2 { status_bit::TEST_FAILED } else { CONFIRMED });

        assert_eq!(memory.current_size(), 2);
        // Oldest first: slot 1 (timestamp 4) before slot 0 (timestamp 9)
        assert_eq!(memory.chronology(), &[1, 0]);
        assert_eq!(memory.current_timestamp(), 10);
        assert_eq!(memory.companion_state(0), ReadoutState::Unlocked);
        assert!(nv.calls().is_empty());
    }

    #[test]
    fn test_orphaned_event_is_evicted() {
        // Event 99 is not configured at all
        let restored = vec![Some(stored_entry(99, 3, 1)), None];
        let (mut memory, nv) = persisted_memory(test_config(), restored);
        memory.reconcile(&|_| CONFIRMED);

        assert_eq!(memory.current_size(), 0);
        assert_eq!(memory.entry(0), None);
        assert_eq!(nv.last(), Some((10, NvBlockState::DirtyImmediate)));
    }

    #[test]
    fn test_non_master_event_is_evicted() {
        // Event 3 is a sub-event of event 1 and must never own an entry
        let restored = vec![Some(stored_entry(3, 3, 1)), None];
        let (mut memory, _nv) = persisted_memory(test_config(), restored);
        memory.reconcile(&|_| CONFIRMED);
        assert_eq!(memory.current_size(), 0);
    }

    #[test]
    fn test_series_shape_mismatch_is_evicted() {
        // Event 2 has two series configured, entry restored with one
        let restored = vec![Some(stored_entry(2, 3, 1)), None];
        let (mut memory, _nv) = persisted_memory(test_config(), restored);
        memory.reconcile(&|_| status_bit::TEST_FAILED);
        assert_eq!(memory.current_size(), 0);
    }

    #[test]
    fn test_duplicate_keeps_larger_timestamp() {
        let restored = vec![
            Some(stored_entry(1, 3, 1)),
            Some(stored_entry(1, 8, 1)),
        ];
        let (mut memory, _nv) = persisted_memory(test_config(), restored);
        memory.reconcile(&|_| CONFIRMED);

        assert_eq!(memory.current_size(), 1);
        assert_eq!(memory.entry(0), None);
        assert_eq!(memory.entry(1).map(|e| e.timestamp), Some(8));
        assert_eq!(memory.find_entry_index(1), Some(1));
    }

    #[test]
    fn test_duplicate_winner_seen_first_still_validated() {
        // The winner sits in the earlier slot; the loser is evicted when
        // the winner is processed, and the winner passes the remaining
        // checks in the same iteration
        let restored = vec![
            Some(stored_entry(1, 8, 1)),
            Some(stored_entry(1, 3, 1)),
        ];
        let (mut memory, _nv) = persisted_memory(test_config(), restored);
        memory.reconcile(&|_| CONFIRMED);

        assert_eq!(memory.current_size(), 1);
        assert_eq!(memory.find_entry_index(1), Some(0));
        assert_eq!(memory.chronology(), &[0]);
    }

    #[test]
    fn test_stale_trigger_evicts_entry() {
        // Entry stored on the confirmed trigger, DTC no longer confirmed
        let restored = vec![Some(stored_entry(1, 3, 1)), None];
        let (mut memory, nv) = persisted_memory(test_config(), restored);
        memory.reconcile(&|_| 0x00);

        assert_eq!(memory.current_size(), 0);
        assert_eq!(nv.last(), Some((10, NvBlockState::DirtyImmediate)));
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let restored = vec![
            Some(stored_entry(2, 9, 2)),
            Some(stored_entry(1, 4, 1)),
        ];
        let (mut memory, nv) = persisted_memory(test_config(), restored);
        let status = |event: EventId| {
            if event == 2 {
                status_bit::TEST_FAILED
            } else {
                CONFIRMED
            }
        };
        memory.reconcile(&status);
        let chronology = memory.chronology().to_vec();
        let entries: Vec<_> = (0..2).map(|i| memory.entry(i).cloned()).collect();
        nv.clear();

        memory.reconcile(&status);
        assert_eq!(memory.chronology(), &chronology[..]);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(memory.entry(i), entry.as_ref());
        }
        // Second pass repairs nothing, so no NvM traffic
        assert!(nv.calls().is_empty());
    }

    #[test]
    fn test_timestamp_advances_past_restored_entries() {
        let restored = vec![Some(stored_entry(1, 41, 1)), None];
        let (mut memory, _nv) = persisted_memory(test_config(), restored);
        memory.reconcile(&|_| CONFIRMED);
        assert_eq!(memory.current_timestamp(), 42);
    }
}
