//! OBD readiness completion tracking
//!
//! Tracks, per readiness group, whether every monitor of the group
//! completed its test this driving cycle. Status transitions mark groups
//! for recalculation; the deferred queue is drained from the periodic
//! task so completion state settles once per cycle instead of once per
//! event report.

use std::sync::Arc;

use dem_core::status::test_completed_this_cycle;
use dem_core::{DemConfig, EventId, ReadinessGroup};
use tracing::debug;

/// Aggregate completion state per readiness group
pub struct ReadinessTracker {
    config: Arc<DemConfig>,
    /// Completion flag per group, indexed by reporting position
    completed: [bool; ReadinessGroup::COUNT],
    /// Groups marked for deferred recalculation
    pending_recalc: [bool; ReadinessGroup::COUNT],
    /// Groups with at least one configured event
    supported: [bool; ReadinessGroup::COUNT],
}

impl ReadinessTracker {
    /// Build a tracker; supported groups are derived from the event table
    pub fn new(config: Arc<DemConfig>) -> Self {
        let mut supported = [false; ReadinessGroup::COUNT];
        for event in &config.events {
            if let Some(group) = event.readiness_group {
                supported[group.index()] = true;
            }
        }
        Self {
            config,
            completed: [false; ReadinessGroup::COUNT],
            pending_recalc: [false; ReadinessGroup::COUNT],
            supported,
        }
    }

    /// TRUE if at least one configured event belongs to the group
    pub fn is_supported(&self, group: ReadinessGroup) -> bool {
        self.supported[group.index()]
    }

    /// TRUE if every monitor of the group completed this driving cycle
    pub fn is_completed(&self, group: ReadinessGroup) -> bool {
        self.completed[group.index()]
    }

    /// Readiness group of an event, if it participates in readiness
    pub fn group_of(&self, event: EventId) -> Option<ReadinessGroup> {
        self.config.event(event).ok().and_then(|cfg| cfg.readiness_group)
    }

    /// Directly set a group's completion state
    pub fn update_completion_status(&mut self, group: ReadinessGroup, completed: bool) {
        let slot = &mut self.completed[group.index()];
        if *slot != completed {
            debug!(%group, completed, "readiness completion changed");
            *slot = completed;
        }
    }

    /// Mark a group for recalculation on the next periodic task
    pub fn trigger_recalculation(&mut self, group: ReadinessGroup) {
        self.pending_recalc[group.index()] = true;
    }

    /// Recompute every marked group. `status_of` yields the current DTC
    /// status byte of an event; a group completes when every one of its
    /// events reports a completed test this operation cycle.
    pub fn process_deferred(&mut self, status_of: &dyn Fn(EventId) -> u8) {
        for group in ReadinessGroup::ALL {
            let index = group.index();
            if !self.pending_recalc[index] {
                continue;
            }
            self.pending_recalc[index] = false;

            let mut completed = self.supported[index];
            for (idx, event) in self.config.events.iter().enumerate() {
                if event.readiness_group != Some(group) {
                    continue;
                }
                let event_id = (idx + 1) as EventId;
                if !test_completed_this_cycle(status_of(event_id)) {
                    completed = false;
                    break;
                }
            }
            self.update_completion_status(group, completed);
        }
    }

    /// Start a new driving cycle: completion restarts for every supported
    /// group and is recalculated on the next periodic task
    pub fn begin_operation_cycle(&mut self) {
        for group in ReadinessGroup::ALL {
            let index = group.index();
            if self.supported[index] {
                self.completed[index] = false;
                self.pending_recalc[index] = true;
            }
        }
        debug!("operation cycle restarted, readiness reset");
    }

    /// Completion bitmask readout; bit n corresponds to group position n
    pub fn completed_mask(&self) -> u16 {
        mask_of(&self.completed)
    }

    /// Supported-group bitmask readout; bit n corresponds to group
    /// position n
    pub fn supported_mask(&self) -> u16 {
        mask_of(&self.supported)
    }
}

fn mask_of(flags: &[bool; ReadinessGroup::COUNT]) -> u16 {
    flags
        .iter()
        .enumerate()
        .filter(|(_, &set)| set)
        .fold(0u16, |mask, (i, _)| mask | (1 << i))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dem_core::config::{
        Capabilities, EventConfig, MemoryConfig, SamplingProfileConfig, SeriesConfig,
    };
    use dem_core::status::status_bit;
    use dem_core::StorageTrigger;

    fn config_with_groups() -> Arc<DemConfig> {
        let event = |group: Option<ReadinessGroup>| EventConfig {
            memory: 0,
            priority: 100,
            master_event: None,
            immediate_nv: false,
            readiness_group: group,
            series: vec![0],
        };
        Arc::new(DemConfig {
            capabilities: Capabilities::default(),
            sampling_profiles: vec![SamplingProfileConfig {
                past_samples: 1,
                future_samples: 0,
                cycle_time_ms: 100,
                sample_len: 2,
            }],
            memories: vec![MemoryConfig {
                entry_slots: 1,
                max_sets: 1,
                record_number_stride: 0x10,
                nv_blocks: vec![],
            }],
            series: vec![SeriesConfig {
                profile: 0,
                first_record_number: 0x10,
                last_record_number: 0x10,
                trigger: StorageTrigger::Confirmed,
                updatable: false,
            }],
            events: vec![
                event(Some(ReadinessGroup::Catalyst)),
                event(Some(ReadinessGroup::Catalyst)),
                event(Some(ReadinessGroup::Egr)),
                event(None),
            ],
        })
    }

    #[test]
    fn test_supported_groups_from_config() {
        let tracker = ReadinessTracker::new(config_with_groups());
        assert!(tracker.is_supported(ReadinessGroup::Catalyst));
        assert!(tracker.is_supported(ReadinessGroup::Egr));
        assert!(!tracker.is_supported(ReadinessGroup::Misfire));
        assert_eq!(
            tracker.supported_mask(),
            (1 << ReadinessGroup::Catalyst.index()) | (1 << ReadinessGroup::Egr.index())
        );
    }

    #[test]
    fn test_group_completes_when_all_events_tested() {
        let mut tracker = ReadinessTracker::new(config_with_groups());
        tracker.trigger_recalculation(ReadinessGroup::Catalyst);

        // Event 2 has not completed its test yet
        tracker.process_deferred(&|event| {
            if event == 2 {
                status_bit::TEST_NOT_COMPLETED_THIS_OPERATION_CYCLE
            } else {
                0x00
            }
        });
        assert!(!tracker.is_completed(ReadinessGroup::Catalyst));

        tracker.trigger_recalculation(ReadinessGroup::Catalyst);
        tracker.process_deferred(&|_| 0x00);
        assert!(tracker.is_completed(ReadinessGroup::Catalyst));
    }

    #[test]
    fn test_recalculation_is_deferred() {
        let mut tracker = ReadinessTracker::new(config_with_groups());
        tracker.trigger_recalculation(ReadinessGroup::Egr);
        assert!(!tracker.is_completed(ReadinessGroup::Egr));

        tracker.process_deferred(&|_| 0x00);
        assert!(tracker.is_completed(ReadinessGroup::Egr));

        // Not marked again: a later recompute pass leaves state untouched
        tracker.process_deferred(&|_| {
            status_bit::TEST_NOT_COMPLETED_THIS_OPERATION_CYCLE
        });
        assert!(tracker.is_completed(ReadinessGroup::Egr));
    }

    #[test]
    fn test_operation_cycle_resets_completion() {
        let mut tracker = ReadinessTracker::new(config_with_groups());
        tracker.update_completion_status(ReadinessGroup::Catalyst, true);
        assert_eq!(
            tracker.completed_mask(),
            1 << ReadinessGroup::Catalyst.index()
        );

        tracker.begin_operation_cycle();
        assert_eq!(tracker.completed_mask(), 0);

        // Recalculation was queued for all supported groups
        tracker.process_deferred(&|_| 0x00);
        assert!(tracker.is_completed(ReadinessGroup::Catalyst));
        assert!(tracker.is_completed(ReadinessGroup::Egr));
    }
}
