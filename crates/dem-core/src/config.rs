//! Generated configuration tables
//!
//! In a deployed ECU these tables come out of the configuration generator
//! and are read-only at runtime. Here they are a TOML-loadable oracle with
//! a validation pass enforcing the invariants the generator guarantees;
//! after a successful [`DemConfig::validate`] the engine treats the tables
//! as given.

use serde::{Deserialize, Serialize};

use crate::bitfield::BitField256;
use crate::error::{DemError, DemResult};
use crate::readiness::ReadinessGroup;
use crate::status::StorageTrigger;
use crate::types::{EventId, NvBlockId, SeriesId, EVENT_INVALID};

/// Complete configuration for the event manager core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemConfig {
    /// Runtime capability switches
    #[serde(default)]
    pub capabilities: Capabilities,
    /// Sampling profiles, referenced by table position
    #[serde(default)]
    pub sampling_profiles: Vec<SamplingProfileConfig>,
    /// Time-series memory regions, referenced by table position
    #[serde(default)]
    pub memories: Vec<MemoryConfig>,
    /// Series table; events reference spans of this table
    #[serde(default)]
    pub series: Vec<SeriesConfig>,
    /// Event table. Event id N is `events[N - 1]`; event 0 is invalid.
    #[serde(default)]
    pub events: Vec<EventConfig>,
}

/// Runtime switches replacing the source family's compile-time feature
/// gates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    /// Master switch for time-series snapshot storage
    #[serde(default = "default_true")]
    pub time_series_enabled: bool,
    /// Whether future samples are collected after the trigger
    #[serde(default = "default_true")]
    pub future_samples_enabled: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            time_series_enabled: true,
            future_samples_enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Sampling Profiles
// =============================================================================

/// One sampling profile shared by one or more series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingProfileConfig {
    /// Past samples kept per set
    pub past_samples: u8,
    /// Future samples collected per set
    pub future_samples: u8,
    /// Sampler period in milliseconds
    #[serde(default = "default_cycle_time")]
    pub cycle_time_ms: u16,
    /// Byte length of one sample (concatenated DID payloads)
    pub sample_len: u16,
}

fn default_cycle_time() -> u16 {
    100
}

// =============================================================================
// Memory Regions
// =============================================================================

/// One time-series memory region
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Entry slots in this memory
    pub entry_slots: usize,
    /// FIFO depth: snapshot sets kept per series
    pub max_sets: u8,
    /// Record-number distance between consecutive sets of one series
    pub record_number_stride: u8,
    /// NvM block backing each entry slot, by slot index. Empty means the
    /// slot index doubles as the block id.
    #[serde(default)]
    pub nv_blocks: Vec<NvBlockId>,
}

// =============================================================================
// Series
// =============================================================================

/// One time-series channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesConfig {
    /// Sampling profile table index
    pub profile: usize,
    /// Record number of the first sample of the first set
    pub first_record_number: u8,
    /// Record number of the last sample of the first set
    pub last_record_number: u8,
    /// Trigger condition bound to this series
    #[serde(default = "default_trigger")]
    pub trigger: StorageTrigger,
    /// Whether a stored set may be overwritten by a repeated trigger
    #[serde(default)]
    pub updatable: bool,
}

fn default_trigger() -> StorageTrigger {
    StorageTrigger::Confirmed
}

// =============================================================================
// Events
// =============================================================================

/// Per-event configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// Memory region storing this event's time series
    #[serde(default)]
    pub memory: usize,
    /// Displacement priority; lower value wins
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Representative event of the DTC combination this event belongs to.
    /// Absent for events that are their own master.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_event: Option<EventId>,
    /// Whether the backing NvM block may be written immediately
    #[serde(default)]
    pub immediate_nv: bool,
    /// OBD readiness group, if the event participates in readiness
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_group: Option<ReadinessGroup>,
    /// Indices into the series table, in series-id order
    #[serde(default)]
    pub series: Vec<usize>,
}

fn default_priority() -> u8 {
    128
}

// =============================================================================
// Accessors
// =============================================================================

impl DemConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load(path: &str) -> DemResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DemError::ConfigLoad(format!("{}: {}", path, e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string and validate it
    pub fn from_toml_str(content: &str) -> DemResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| DemError::ConfigLoad(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Number of configured events
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// TRUE if the id names a configured event
    pub fn is_valid_event(&self, event: EventId) -> bool {
        event != EVENT_INVALID && (event as usize) <= self.events.len()
    }

    /// Configuration of one event
    pub fn event(&self, event: EventId) -> DemResult<&EventConfig> {
        if self.is_valid_event(event) {
            Ok(&self.events[event as usize - 1])
        } else {
            Err(DemError::UnknownEvent(event))
        }
    }

    /// Representative event of the combination `event` belongs to.
    /// An unknown event resolves to itself.
    pub fn master_event(&self, event: EventId) -> EventId {
        self.event(event)
            .ok()
            .and_then(|cfg| cfg.master_event)
            .unwrap_or(event)
    }

    /// TRUE if the event is the representative of its combination
    pub fn is_master_event(&self, event: EventId) -> bool {
        self.master_event(event) == event
    }

    /// Number of series configured for an event
    pub fn series_count(&self, event: EventId) -> SeriesId {
        self.event(event)
            .map(|cfg| cfg.series.len() as SeriesId)
            .unwrap_or(0)
    }

    /// Configuration of one series of an event
    pub fn series_of(&self, event: EventId, series: SeriesId) -> DemResult<&SeriesConfig> {
        let cfg = self.event(event)?;
        let table_index = cfg
            .series
            .get(series as usize)
            .ok_or(DemError::UnknownSeries { event, series })?;
        self.series
            .get(*table_index)
            .ok_or_else(|| DemError::ConfigInconsistency(format!(
                "series table index {} out of range",
                table_index
            )))
    }

    /// Sampling profile of a series
    pub fn profile_of(&self, series: &SeriesConfig) -> &SamplingProfileConfig {
        &self.sampling_profiles[series.profile]
    }

    /// Storage trigger bound to an event. All series of one event carry the
    /// same trigger (enforced by [`DemConfig::validate`]); events without
    /// series fall back to the default trigger.
    pub fn storage_trigger(&self, event: EventId) -> StorageTrigger {
        self.series_of(event, 0)
            .map(|s| s.trigger)
            .unwrap_or_else(|_| default_trigger())
    }

    /// Memory region configuration
    pub fn memory(&self, index: usize) -> &MemoryConfig {
        &self.memories[index]
    }

    /// Record-number stride of a memory. A zero stride is a generator
    /// defect; it degrades to 1 to keep record arithmetic well defined.
    pub fn record_number_stride(&self, memory: usize) -> u8 {
        let stride = self.memories[memory].record_number_stride;
        if stride == 0 {
            tracing::error!(memory, "configured record number stride is zero, using 1");
            1
        } else {
            stride
        }
    }

    /// NvM block backing an entry slot of a memory
    pub fn nv_block(&self, memory: usize, slot: usize) -> NvBlockId {
        self.memories[memory]
            .nv_blocks
            .get(slot)
            .copied()
            .unwrap_or(slot as NvBlockId)
    }

    /// Configured sample slots per set (past + future), independent of the
    /// runtime future-sample capability. This is the record-number layout.
    pub fn configured_samples_per_set(&self, series: &SeriesConfig) -> u8 {
        let profile = self.profile_of(series);
        profile.past_samples + profile.future_samples
    }

    /// Future samples actually collected per set under the current
    /// capabilities
    pub fn effective_future_samples(&self, series: &SeriesConfig) -> u8 {
        if self.capabilities.future_samples_enabled {
            self.profile_of(series).future_samples
        } else {
            0
        }
    }

    /// Sample slots actually allocated per set under the current
    /// capabilities
    pub fn effective_samples_per_set(&self, series: &SeriesConfig) -> u8 {
        self.profile_of(series).past_samples + self.effective_future_samples(series)
    }

    /// Last record number of a series across all its sets
    pub fn last_record_number_any_set(&self, event: EventId, series: SeriesId) -> DemResult<u8> {
        let cfg = self.series_of(event, series)?;
        let memory = self.event(event)?.memory;
        let stride = self.record_number_stride(memory) as u16;
        let max_sets = self.memories[memory].max_sets as u16;
        let last = cfg.first_record_number as u16
            + stride * (max_sets - 1)
            + self.configured_samples_per_set(cfg) as u16
            - 1;
        Ok(last.min(u8::MAX as u16) as u8)
    }

    /// Per-series trigger mask: one bit per series of the event whose
    /// configured trigger is among `triggers`
    pub fn series_trigger_mask(
        &self,
        event: EventId,
        triggers: &[StorageTrigger],
    ) -> DemResult<BitField256> {
        let mut mask = BitField256::new();
        for sid in 0..self.series_count(event) {
            let series = self.series_of(event, sid)?;
            if triggers.contains(&series.trigger) {
                mask.set(sid as usize);
            }
        }
        Ok(mask)
    }
}

// =============================================================================
// Validation
// =============================================================================

impl DemConfig {
    /// Check the invariants the configuration generator guarantees
    pub fn validate(&self) -> DemResult<()> {
        for (i, profile) in self.sampling_profiles.iter().enumerate() {
            if profile.past_samples == 0 && profile.future_samples == 0 {
                return Err(DemError::ConfigInconsistency(format!(
                    "sampling profile {} has no sample slots",
                    i
                )));
            }
            if profile.past_samples as u16 + profile.future_samples as u16 > u8::MAX as u16 {
                return Err(DemError::ConfigInconsistency(format!(
                    "sampling profile {} exceeds the per-set sample limit",
                    i
                )));
            }
            if profile.sample_len == 0 {
                return Err(DemError::ConfigInconsistency(format!(
                    "sampling profile {} has zero sample length",
                    i
                )));
            }
        }

        for (i, memory) in self.memories.iter().enumerate() {
            if memory.entry_slots == 0 {
                return Err(DemError::ConfigInconsistency(format!(
                    "memory {} has no entry slots",
                    i
                )));
            }
            if memory.max_sets == 0 {
                return Err(DemError::ConfigInconsistency(format!(
                    "memory {} has zero sets per series",
                    i
                )));
            }
            if memory.record_number_stride == 0 {
                return Err(DemError::ConfigInconsistency(format!(
                    "memory {} has zero record number stride",
                    i
                )));
            }
            if !memory.nv_blocks.is_empty() && memory.nv_blocks.len() != memory.entry_slots {
                return Err(DemError::ConfigInconsistency(format!(
                    "memory {} has {} NvM blocks for {} slots",
                    i,
                    memory.nv_blocks.len(),
                    memory.entry_slots
                )));
            }
        }

        for (i, series) in self.series.iter().enumerate() {
            let profile = self
                .sampling_profiles
                .get(series.profile)
                .ok_or_else(|| DemError::ConfigInconsistency(format!(
                    "series {} references unknown sampling profile {}",
                    i, series.profile
                )))?;
            let samples = profile.past_samples as u16 + profile.future_samples as u16;
            let expected_last = series.first_record_number as u16 + samples - 1;
            if expected_last > u8::MAX as u16 || series.last_record_number as u16 != expected_last {
                return Err(DemError::ConfigInconsistency(format!(
                    "series {}: last record number 0x{:02X} does not match first 0x{:02X} + {} samples",
                    i, series.last_record_number, series.first_record_number, samples
                )));
            }
        }

        for (idx, event) in self.events.iter().enumerate() {
            let event_id = (idx + 1) as EventId;
            if event.memory >= self.memories.len() {
                return Err(DemError::ConfigInconsistency(format!(
                    "event {} references unknown memory {}",
                    event_id, event.memory
                )));
            }
            if let Some(master) = event.master_event {
                if !self.is_valid_event(master) {
                    return Err(DemError::ConfigInconsistency(format!(
                        "event {} references unknown master event {}",
                        event_id, master
                    )));
                }
                if self.events[master as usize - 1].master_event.is_some() && master != event_id {
                    return Err(DemError::ConfigInconsistency(format!(
                        "master event {} of event {} is not a representative itself",
                        master, event_id
                    )));
                }
            }

            let memory = &self.memories[event.memory];
            let mut trigger: Option<StorageTrigger> = None;
            let mut first_records: Vec<u8> = Vec::new();
            for table_index in &event.series {
                let series = self.series.get(*table_index).ok_or_else(|| {
                    DemError::ConfigInconsistency(format!(
                        "event {} references unknown series {}",
                        event_id, table_index
                    ))
                })?;
                match trigger {
                    None => trigger = Some(series.trigger),
                    Some(t) if t != series.trigger => {
                        return Err(DemError::ConfigInconsistency(format!(
                            "event {} mixes storage triggers across its series",
                            event_id
                        )));
                    }
                    Some(_) => {}
                }
                let samples = self.configured_samples_per_set(series);
                if memory.record_number_stride < samples {
                    return Err(DemError::ConfigInconsistency(format!(
                        "event {}: record number stride {} smaller than {} samples per set",
                        event_id, memory.record_number_stride, samples
                    )));
                }
                let span_last = series.first_record_number as u16
                    + memory.record_number_stride as u16 * (memory.max_sets as u16 - 1)
                    + samples as u16
                    - 1;
                if span_last > u8::MAX as u16 {
                    return Err(DemError::ConfigInconsistency(format!(
                        "event {}: record numbers exceed 0xFF across {} sets",
                        event_id, memory.max_sets
                    )));
                }
                if first_records.contains(&series.first_record_number) {
                    return Err(DemError::ConfigInconsistency(format!(
                        "event {} has overlapping series record ranges",
                        event_id
                    )));
                }
                first_records.push(series.first_record_number);
            }
        }

        Ok(())
    }
}
