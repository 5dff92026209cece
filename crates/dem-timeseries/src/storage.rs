//! Past and future sample storage
//!
//! Past samples are copied out of the ring buffer synchronously when a
//! trigger fires, right-aligned so the most recent history lands at the
//! highest past slots. Future samples are collected one per sampler tick
//! by the periodic task until every debt is paid, at which point the
//! entry's NvM block is promoted to immediate write-back for events that
//! support it.

use dem_core::{BitField256, SeriesId, EVENT_INVALID};
use tracing::{debug, error};

use crate::memory::TimeSeriesMemory;
use crate::traits::{NvBlockState, RingBufferReader};

impl TimeSeriesMemory {
    /// Copy the available ring-buffer history into a new (or updated) set
    /// of every triggered series of the entry at `index`
    pub(crate) fn store_past_samples(
        &mut self,
        index: usize,
        trigger_mask: &BitField256,
        ring: &dyn RingBufferReader,
    ) {
        let config = self.config.clone();
        let max_sets = self.max_sets();
        let block = self.nv_block_of(index);
        let Some(event) = self.entry(index).map(|entry| entry.event_id) else {
            return;
        };
        let mut wrote_any = false;

        {
            let Some(entry) = self.entries.get_mut(index).and_then(Option::as_mut) else {
                return;
            };
            let companion = &mut self.companions[index];

            for sid in 0..entry.series.len() {
                if !trigger_mask.get(sid) {
                    continue;
                }
                let series_cfg = match config.series_of(event, sid as SeriesId) {
                    Ok(cfg) => cfg,
                    Err(e) => {
                        error!(event, series = sid, %e, "series lookup failed, trigger dropped");
                        continue;
                    }
                };
                let header = &mut entry.series[sid];
                // Overwriting an already stored set needs update permission
                if header.all_sets_stored && !series_cfg.updatable {
                    debug!(event, series = sid, "set update not permitted, trigger skipped");
                    continue;
                }

                let set_id = header.get_and_update_set_id(max_sets);
                let profile_index = series_cfg.profile;
                let profile = config.profile_of(series_cfg);
                let past = profile.past_samples;
                let future = config.effective_future_samples(series_cfg);
                let available = ring.sample_count(profile_index).min(past);

                let set = &mut header.sets[set_id as usize];
                set.samples = vec![None; past as usize + future as usize];
                // Right-aligned: the newest history lands at the highest
                // past slots, earlier slots stay unused
                for i in 0..available {
                    let ring_index = ring.sample_count(profile_index) - available + i;
                    let slot = (past - available + i) as usize;
                    set.samples[slot] = ring.read_slot_chronological(profile_index, ring_index);
                }
                set.unused_past = past - available;
                set.unused_future = future;
                set.time_since_last_sample = ring.time_since_last_sample(profile_index);
                companion.set_missing(sid as SeriesId, set_id, future);
                wrote_any = true;
                debug!(event, series = sid, set = set_id, available, "past samples stored");
            }
        }

        if wrote_any {
            let immediate = config.event(event).map(|c| c.immediate_nv).unwrap_or(false);
            let state = if immediate && !config.capabilities.future_samples_enabled {
                NvBlockState::DirtyImmediate
            } else {
                NvBlockState::Dirty
            };
            self.nv.set_block_state(block, state);
        }
    }

    /// Pay one future sample per set per sampler tick. After scanning an
    /// entry, the NvM block is re-marked: immediate once no debt remains
    /// anywhere in the entry and the event supports immediate write-back,
    /// plain dirty otherwise.
    pub(crate) fn process_future_samples(&mut self, ring: &dyn RingBufferReader) {
        if !self.config.capabilities.future_samples_enabled {
            return;
        }
        let config = self.config.clone();
        let max_sets = self.max_sets();
        // Consume each profile's new-sample flag exactly once per cycle
        let fresh: Vec<bool> = (0..config.sampling_profiles.len())
            .map(|profile| ring.new_sample_available(profile))
            .collect();
        if !fresh.iter().any(|&f| f) {
            return;
        }

        for index in 0..self.entries.len() {
            let block = self.nv_block_of(index);
            let Some(event) = self.entry(index).map(|entry| entry.event_id) else {
                continue;
            };
            if event == EVENT_INVALID {
                continue;
            }

            let (changed, debt_left) = {
                let Some(entry) = self.entries.get_mut(index).and_then(Option::as_mut) else {
                    continue;
                };
                let companion = &mut self.companions[index];
                let mut changed = false;

                for sid in 0..entry.series.len() {
                    let series_cfg = match config.series_of(event, sid as SeriesId) {
                        Ok(cfg) => cfg,
                        Err(_) => continue,
                    };
                    if !fresh[series_cfg.profile] {
                        continue;
                    }
                    let newest = ring.sample_count(series_cfg.profile);
                    if newest == 0 {
                        continue;
                    }
                    let header = &mut entry.series[sid];
                    for chronological in 0..header.stored_set_count(max_sets) {
                        let physical = header.physical_set_id(chronological, max_sets);
                        let missing = companion.missing(sid as SeriesId, physical);
                        if missing == 0 {
                            continue;
                        }
                        let set = &mut header.sets[physical as usize];
                        let target = set.samples.len() - missing as usize;
                        set.samples[target] =
                            ring.read_slot_chronological(series_cfg.profile, newest - 1);
                        set.unused_future = set.unused_future.saturating_sub(1);
                        companion.decrement_missing(sid as SeriesId, physical);
                        changed = true;
                    }
                }
                (changed, companion.total_missing())
            };

            if changed {
                let immediate = config.event(event).map(|c| c.immediate_nv).unwrap_or(false);
                let state = if immediate && debt_left == 0 {
                    NvBlockState::DirtyImmediate
                } else {
                    NvBlockState::Dirty
                };
                debug!(event, slot = index, debt_left, "future samples updated");
                self.nv.set_block_state(block, state);
            }
        }
    }
}
