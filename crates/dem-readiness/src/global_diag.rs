//! Global diagnostics coordination
//!
//! Routes DTC status transitions into the readiness tracker, maintains
//! the confirmed-DTC counter, and derives the storage triggers that newly
//! hold with a transition. The returned triggers feed time-series
//! storage; the coordinator itself never touches the snapshot memory.

use std::sync::Arc;

use dem_core::status::{confirmed_cleared, confirmed_set, newly_holding_triggers};
use dem_core::{DemConfig, DemResult, EventId, StorageTrigger};
use tracing::{debug, info};

use crate::tracker::ReadinessTracker;

/// Confirmed-DTC counter plus readiness coordination
pub struct GlobalDiagnostics {
    config: Arc<DemConfig>,
    readiness: ReadinessTracker,
    /// Events whose confirmed bit is currently set
    confirmed_events: u16,
}

impl GlobalDiagnostics {
    pub fn new(config: Arc<DemConfig>) -> Self {
        let readiness = ReadinessTracker::new(config.clone());
        Self {
            config,
            readiness,
            confirmed_events: 0,
        }
    }

    /// Readiness tracker readout
    pub fn readiness(&self) -> &ReadinessTracker {
        &self.readiness
    }

    /// Mutable readiness tracker access for cycle management
    pub fn readiness_mut(&mut self) -> &mut ReadinessTracker {
        &mut self.readiness
    }

    /// Number of events with a currently confirmed DTC
    pub fn confirmed_count(&self) -> u16 {
        self.confirmed_events
    }

    /// Process one event status transition.
    ///
    /// Updates the confirmed counter on confirmed-bit edges, queues the
    /// event's readiness group for recalculation, and returns the storage
    /// triggers that newly hold with this transition.
    pub fn on_status_transition(
        &mut self,
        event: EventId,
        old_status: u8,
        new_status: u8,
    ) -> DemResult<Vec<StorageTrigger>> {
        let cfg = self.config.event(event)?;

        if confirmed_set(old_status, new_status) {
            self.confirmed_events = self.confirmed_events.saturating_add(1);
            info!(event, confirmed = self.confirmed_events, "DTC confirmed");
        } else if confirmed_cleared(old_status, new_status) {
            self.confirmed_events = self.confirmed_events.saturating_sub(1);
            info!(event, confirmed = self.confirmed_events, "DTC no longer confirmed");
        }

        if let Some(group) = cfg.readiness_group {
            self.readiness.trigger_recalculation(group);
        }

        let triggers = newly_holding_triggers(old_status, new_status);
        if !triggers.is_empty() {
            debug!(event, ?triggers, "storage triggers newly hold");
        }
        Ok(triggers)
    }

    /// FDC threshold crossings are reported out of band by the monitor;
    /// they map to the FDC storage trigger directly.
    pub fn on_fdc_threshold_crossed(&self, event: EventId) -> DemResult<Vec<StorageTrigger>> {
        self.config.event(event)?;
        Ok(vec![StorageTrigger::FdcThreshold])
    }

    /// Drain deferred readiness recalculations; called from the periodic
    /// task with a view of the current event statuses
    pub fn process_deferred(&mut self, status_of: &dyn Fn(EventId) -> u8) {
        self.readiness.process_deferred(status_of);
    }

    /// Start a new driving cycle
    pub fn begin_operation_cycle(&mut self) {
        self.readiness.begin_operation_cycle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dem_core::config::{
        Capabilities, EventConfig, MemoryConfig, SamplingProfileConfig, SeriesConfig,
    };
    use dem_core::status::status_bit;
    use dem_core::ReadinessGroup;

    fn coordinator() -> GlobalDiagnostics {
        let config = Arc::new(DemConfig {
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
            events: vec![EventConfig {
                memory: 0,
                priority: 100,
                master_event: None,
                immediate_nv: false,
                readiness_group: Some(ReadinessGroup::O2Sensor),
                series: vec![0],
            }],
        });
        GlobalDiagnostics::new(config)
    }

    #[test]
    fn test_confirmed_counter_follows_edges() {
        let mut diag = coordinator();
        assert_eq!(diag.confirmed_count(), 0);

        let triggers = diag
            .on_status_transition(1, 0x00, status_bit::CONFIRMED_DTC)
            .unwrap();
        assert_eq!(diag.confirmed_count(), 1);
        assert!(triggers.contains(&StorageTrigger::Confirmed));

        // No edge, no change
        diag.on_status_transition(1, status_bit::CONFIRMED_DTC, status_bit::CONFIRMED_DTC)
            .unwrap();
        assert_eq!(diag.confirmed_count(), 1);

        diag.on_status_transition(1, status_bit::CONFIRMED_DTC, 0x00)
            .unwrap();
        assert_eq!(diag.confirmed_count(), 0);

        // Counter never wraps below zero
        diag.on_status_transition(1, status_bit::CONFIRMED_DTC, 0x00)
            .unwrap();
        assert_eq!(diag.confirmed_count(), 0);
    }

    #[test]
    fn test_transition_queues_readiness_recalculation() {
        let mut diag = coordinator();
        diag.on_status_transition(1, 0x40, 0x00).unwrap();
        diag.process_deferred(&|_| 0x00);
        assert!(diag.readiness().is_completed(ReadinessGroup::O2Sensor));
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let mut diag = coordinator();
        assert!(diag.on_status_transition(99, 0x00, 0x01).is_err());
        assert!(diag.on_fdc_threshold_crossed(0).is_err());
    }

    #[test]
    fn test_fdc_crossing_maps_to_trigger() {
        let diag = coordinator();
        assert_eq!(
            diag.on_fdc_threshold_crossed(1).unwrap(),
            vec![StorageTrigger::FdcThreshold]
        );
    }
}
