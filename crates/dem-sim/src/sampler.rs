//! In-process ring-buffer sampler
//!
//! Reference implementation of the sampler the engine consumes: one
//! circular buffer per sampling profile, fed by the scenario's ramp
//! generators once per scheduler cycle.

use std::collections::VecDeque;

use dem_core::DemConfig;
use dem_timeseries::RingBufferReader;
use parking_lot::Mutex;
use tracing::trace;

use crate::config::SignalConfig;

struct ProfileRing {
    capacity: usize,
    sample_len: usize,
    samples: VecDeque<Vec<u8>>,
    last_sample_id: u32,
    fresh: bool,
    time_since: u16,
    base: u8,
    step: u8,
}

/// Per-profile circular sample store driven by [`SimSampler::tick`]
pub struct SimSampler {
    profiles: Mutex<Vec<ProfileRing>>,
}

impl SimSampler {
    /// Size the rings from the configuration; generators default to a
    /// plain counting ramp unless a signal entry overrides them
    pub fn new(config: &DemConfig, signals: &[SignalConfig]) -> Self {
        let profiles = config
            .sampling_profiles
            .iter()
            .enumerate()
            .map(|(index, profile)| {
                let signal = signals.iter().find(|s| s.profile == index);
                ProfileRing {
                    capacity: profile.past_samples.max(1) as usize,
                    sample_len: profile.sample_len as usize,
                    samples: VecDeque::new(),
                    last_sample_id: 0,
                    fresh: false,
                    time_since: 0,
                    base: signal.map(|s| s.base).unwrap_or(0),
                    step: signal.map(|s| s.step).unwrap_or(1),
                }
            })
            .collect();
        Self {
            profiles: Mutex::new(profiles),
        }
    }

    /// Collect one sample per profile
    pub fn tick(&self, cycle: u32) {
        let mut profiles = self.profiles.lock();
        for (index, ring) in profiles.iter_mut().enumerate() {
            let value = ring.base.wrapping_add(ring.step.wrapping_mul(cycle as u8));
            let mut payload = vec![value; ring.sample_len];
            payload[0] = cycle as u8;

            if ring.samples.len() == ring.capacity {
                ring.samples.pop_front();
            }
            ring.samples.push_back(payload);
            ring.last_sample_id = ring.last_sample_id.wrapping_add(1);
            ring.fresh = true;
            ring.time_since = 0;
            trace!(profile = index, cycle, "sample collected");
        }
    }
}

impl RingBufferReader for SimSampler {
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
