//! Hand-rolled collaborator doubles
//!
//! Used by the unit and integration tests and by bench tooling. The
//! doubles record every interaction so tests can assert on NvM traffic
//! and update notifications.

use std::collections::VecDeque;

use dem_core::config::{
    Capabilities, DemConfig, EventConfig, MemoryConfig, SamplingProfileConfig, SeriesConfig,
};
use dem_core::{EntryIndex, EventId, NvBlockId, ReadinessGroup, StorageTrigger};
use parking_lot::Mutex;

use crate::traits::{
    DisplacementPolicy, NvBlockHandler, NvBlockState, OccupiedEntry, RingBufferReader,
    UpdateListener,
};

// =============================================================================
// Ring Buffer
// =============================================================================

struct ProfileRing {
    capacity: usize,
    samples: VecDeque<Vec<u8>>,
    last_sample_id: u32,
    fresh: bool,
    time_since: u16,
}

/// Scriptable ring-buffer sampler: tests push samples, the engine reads
/// them back chronologically
pub struct MockRingBuffer {
    profiles: Mutex<Vec<ProfileRing>>,
}

impl MockRingBuffer {
    pub fn new(profile_count: usize, capacity: usize) -> Self {
        let profiles = (0..profile_count)
            .map(|_| ProfileRing {
                capacity,
                samples: VecDeque::new(),
                last_sample_id: 0,
                fresh: false,
                time_since: 0,
            })
            .collect();
        Self {
            profiles: Mutex::new(profiles),
        }
    }

    /// Append a sample, evicting the oldest once the capacity is reached
    pub fn push_sample(&self, profile: usize, data: Vec<u8>) {
        let mut profiles = self.profiles.lock();
        if let Some(ring) = profiles.get_mut(profile) {
            if ring.samples.len() == ring.capacity {
                ring.samples.pop_front();
            }
            ring.samples.push_back(data);
            ring.last_sample_id = ring.last_sample_id.wrapping_add(1);
            ring.fresh = true;
            ring.time_since = 0;
        }
    }

    pub fn set_time_since_last_sample(&self, profile: usize, ticks: u16) {
        if let Some(ring) = self.profiles.lock().get_mut(profile) {
            ring.time_since = ticks;
        }
    }
}

impl RingBufferReader for MockRingBuffer {
    fn sample_count(&self, profile: usize) -> u8 {
        self.profiles
            .lock()
            .get(profile)
            .map(|ring| ring.samples.len() as u8)
            .unwrap_or(0)
    }

    fn read_slot_chronological(&self, profile: usize, index: u8) -> Option<Vec<u8>> {
        self.profiles
            .lock()
            .get(profile)
            .and_then(|ring| ring.samples.get(index as usize).cloned())
    }

    fn most_recent_sample_id(&self, profile: usize) -> u32 {
        self.profiles
            .lock()
            .get(profile)
            .map(|ring| ring.last_sample_id)
            .unwrap_or(0)
    }

    fn time_since_last_sample(&self, profile: usize) -> u16 {
        self.profiles
            .lock()
            .get(profile)
            .map(|ring| ring.time_since)
            .unwrap_or(0)
    }

    fn new_sample_available(&self, profile: usize) -> bool {
        self.profiles
            .lock()
            .get_mut(profile)
            .map(|ring| std::mem::replace(&mut ring.fresh, false))
            .unwrap_or(false)
    }
}

// =============================================================================
// NvM and Update Listener
// =============================================================================

/// NvM handler recording every block marking
pub struct RecordingNvHandler {
    calls: Mutex<Vec<(NvBlockId, NvBlockState)>>,
}

impl RecordingNvHandler {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(NvBlockId, NvBlockState)> {
        self.calls.lock().clone()
    }

    pub fn last(&self) -> Option<(NvBlockId, NvBlockState)> {
        self.calls.lock().last().copied()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

impl Default for RecordingNvHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl NvBlockHandler for RecordingNvHandler {
    fn set_block_state(&self, block: NvBlockId, state: NvBlockState) {
        self.calls.lock().push((block, state));
    }
}

/// One recorded update notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateCall {
    Start(EventId),
    Finish(EventId),
}

/// Update listener recording the notification sequence
pub struct RecordingUpdateListener {
    calls: Mutex<Vec<UpdateCall>>,
}

impl RecordingUpdateListener {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<UpdateCall> {
        self.calls.lock().clone()
    }
}

impl Default for RecordingUpdateListener {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateListener for RecordingUpdateListener {
    fn on_update_start(&self, event: EventId) {
        self.calls.lock().push(UpdateCall::Start(event));
    }

    fn on_update_finish(&self, event: EventId) {
        self.calls.lock().push(UpdateCall::Finish(event));
    }
}

// =============================================================================
// Displacement
// =============================================================================

/// Policy that always nominates the same victim slot
pub struct FixedVictimPolicy(pub Option<EntryIndex>);

impl DisplacementPolicy for FixedVictimPolicy {
    fn select_victim(
        &self,
        _occupied: &[OccupiedEntry],
        _config: &DemConfig,
        _incoming: EventId,
    ) -> Option<EntryIndex> {
        self.0
    }
}

// =============================================================================
// Shared test configuration
// =============================================================================

/// Configuration used across the engine's tests:
///
/// - profile 0: 3 past / 2 future samples of 4 bytes
/// - profile 1: 2 past / 1 future samples of 2 bytes
/// - memory 0: 2 slots, 2 sets per series, record stride 0x10
/// - event 1: series 0 (records 0x10..), confirmed trigger, immediate NvM
/// - event 2: series 1 and 2 (records 0x30.., 0x50..), test-failed trigger
/// - event 3: sub-event combined into event 1
/// - event 4: high-priority displacer, series 3 (records 0x70..)
pub fn test_config() -> DemConfig {
    DemConfig {
        capabilities: Capabilities::default(),
        sampling_profiles: vec![
            SamplingProfileConfig {
                past_samples: 3,
                future_samples: 2,
                cycle_time_ms: 100,
                sample_len: 4,
            },
            SamplingProfileConfig {
                past_samples: 2,
                future_samples: 1,
                cycle_time_ms: 200,
                sample_len: 2,
            },
        ],
        memories: vec![MemoryConfig {
            entry_slots: 2,
            max_sets: 2,
            record_number_stride: 0x10,
            nv_blocks: vec![10, 11],
        }],
        series: vec![
            SeriesConfig {
                profile: 0,
                first_record_number: 0x10,
                last_record_number: 0x14,
                trigger: StorageTrigger::Confirmed,
                updatable: true,
            },
            SeriesConfig {
                profile: 1,
                first_record_number: 0x30,
                last_record_number: 0x32,
                trigger: StorageTrigger::TestFailed,
                updatable: true,
            },
            SeriesConfig {
                profile: 1,
                first_record_number: 0x50,
                last_record_number: 0x52,
                trigger: StorageTrigger::TestFailed,
                updatable: true,
            },
            SeriesConfig {
                profile: 0,
                first_record_number: 0x70,
                last_record_number: 0x74,
                trigger: StorageTrigger::Confirmed,
                updatable: false,
            },
        ],
        events: vec![
            EventConfig {
                memory: 0,
                priority: 10,
                master_event: None,
                immediate_nv: true,
                readiness_group: Some(ReadinessGroup::Catalyst),
                series: vec![0],
            },
            EventConfig {
                memory: 0,
                priority: 20,
                master_event: None,
                immediate_nv: false,
                readiness_group: Some(ReadinessGroup::Egr),
                series: vec![1, 2],
            },
            EventConfig {
                memory: 0,
                priority: 10,
                master_event: Some(1),
                immediate_nv: true,
                readiness_group: Some(ReadinessGroup::Catalyst),
                series: vec![0],
            },
            EventConfig {
                memory: 0,
                priority: 5,
                master_event: None,
                immediate_nv: false,
                readiness_group: None,
                series: vec![3],
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_is_valid() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let ring = MockRingBuffer::new(1, 2);
        ring.push_sample(0, vec![1]);
        ring.push_sample(0, vec![2]);
        ring.push_sample(0, vec![3]);

        assert_eq!(ring.sample_count(0), 2);
        assert_eq!(ring.read_slot_chronological(0, 0), Some(vec![2]));
        assert_eq!(ring.read_slot_chronological(0, 1), Some(vec![3]));
        assert_eq!(ring.most_recent_sample_id(0), 3);
    }

    #[test]
    fn test_new_sample_flag_is_consumed() {
        let ring = MockRingBuffer::new(1, 2);
        assert!(!ring.new_sample_available(0));
        ring.push_sample(0, vec![1]);
        assert!(ring.new_sample_available(0));
        assert!(!ring.new_sample_available(0));
    }
}
