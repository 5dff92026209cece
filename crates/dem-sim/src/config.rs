//! Simulator scenario configuration
//!
//! Fully data-driven: the embedded event-manager configuration plus a
//! schedule of status transitions, clears and signal generators, loadable
//! from a TOML file. Without a file the built-in demo scenario runs.

use dem_core::config::{
    Capabilities, DemConfig, EventConfig, MemoryConfig, SamplingProfileConfig, SeriesConfig,
};
use dem_core::{DemError, DemResult, EventId, ReadinessGroup, StorageTrigger};
use serde::{Deserialize, Serialize};

/// Complete simulator scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Scenario length in scheduler cycles
    #[serde(default = "default_cycles")]
    pub cycles: u32,

    /// Event manager configuration tables
    pub dem: DemConfig,

    /// Status transitions injected at given cycles
    #[serde(default)]
    pub injections: Vec<Injection>,

    /// DTC clears injected at given cycles
    #[serde(default)]
    pub clears: Vec<ClearAction>,

    /// Signal generators feeding the sampling profiles
    #[serde(default)]
    pub signals: Vec<SignalConfig>,
}

fn default_cycles() -> u32 {
    20
}

/// One injected status transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Injection {
    /// Scheduler cycle the transition happens in
    pub cycle: u32,
    /// Reporting event (may be a sub-event of a combination)
    pub event: EventId,
    /// New DTC status byte
    pub status: u8,
}

/// One injected DTC clear
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearAction {
    pub cycle: u32,
    pub event: EventId,
}

/// Ramp generator for one sampling profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Sampling profile fed by this generator
    pub profile: usize,
    /// First payload byte of the ramp
    #[serde(default)]
    pub base: u8,
    /// Per-tick increment
    #[serde(default = "default_step")]
    pub step: u8,
}

fn default_step() -> u8 {
    1
}

impl SimConfig {
    /// Load a scenario from a TOML file
    pub fn load(path: &str) -> DemResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DemError::ConfigLoad(format!("{}: {}", path, e)))?;
        let config: Self =
            toml::from_str(&content).map_err(|e| DemError::ConfigLoad(e.to_string()))?;
        config.dem.validate()?;
        Ok(config)
    }

    /// Built-in demo: one misfire event with a 3-past/2-future series and
    /// a two-set FIFO, triggered early (short sampler history), updated
    /// later, cleared at the end
    pub fn demo() -> Self {
        let dem = DemConfig {
            capabilities: Capabilities::default(),
            sampling_profiles: vec![SamplingProfileConfig {
                past_samples: 3,
                future_samples: 2,
                cycle_time_ms: 100,
                sample_len: 4,
            }],
            memories: vec![MemoryConfig {
                entry_slots: 4,
                max_sets: 2,
                record_number_stride: 0x10,
                nv_blocks: vec![],
            }],
            series: vec![SeriesConfig {
                profile: 0,
                first_record_number: 0x10,
                last_record_number: 0x14,
                trigger: StorageTrigger::Confirmed,
                updatable: true,
            }],
            events: vec![EventConfig {
                memory: 0,
                priority: 10,
                master_event: None,
                immediate_nv: true,
                readiness_group: Some(ReadinessGroup::Misfire),
                series: vec![0],
            }],
        };
        Self {
            cycles: 16,
            dem,
            injections: vec![
                // Confirmed after the very first sample: a short history
                Injection {
                    cycle: 1,
                    event: 1,
                    status: 0x09,
                },
                // Confirmed falls and rises again: the second qualifying
                // edge writes the second set
                Injection {
                    cycle: 8,
                    event: 1,
                    status: 0x00,
                },
                Injection {
                    cycle: 9,
                    event: 1,
                    status: 0x09,
                },
            ],
            clears: vec![],
            signals: vec![SignalConfig {
                profile: 0,
                base: 0x40,
                step: 3,
            }],
        }
    }
}
