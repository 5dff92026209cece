//! OBD readiness-group taxonomy
//!
//! Each OBD monitor belongs to one readiness group whose aggregate
//! "completed this driving cycle" state is reported to scan tools.

use serde::{Deserialize, Serialize};

/// OBD monitor category whose completion state is tracked in aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessGroup {
    /// Misfire monitoring (continuous)
    Misfire,
    /// Fuel system monitoring (continuous)
    FuelSystem,
    /// Comprehensive component monitoring (continuous)
    Comprehensive,
    /// Catalyst efficiency
    Catalyst,
    /// Heated catalyst
    HeatedCatalyst,
    /// Evaporative system
    EvapSystem,
    /// Secondary air system
    SecondaryAir,
    /// Oxygen sensor
    O2Sensor,
    /// Oxygen sensor heater
    O2SensorHeater,
    /// Exhaust gas recirculation
    Egr,
}

impl ReadinessGroup {
    /// Number of readiness groups
    pub const COUNT: usize = 10;

    /// All groups, in reporting order
    pub const ALL: [ReadinessGroup; Self::COUNT] = [
        ReadinessGroup::Misfire,
        ReadinessGroup::FuelSystem,
        ReadinessGroup::Comprehensive,
        ReadinessGroup::Catalyst,
        ReadinessGroup::HeatedCatalyst,
        ReadinessGroup::EvapSystem,
        ReadinessGroup::SecondaryAir,
        ReadinessGroup::O2Sensor,
        ReadinessGroup::O2SensorHeater,
        ReadinessGroup::Egr,
    ];

    /// Position in the reporting order, also the bit position in mask
    /// readouts
    pub fn index(self) -> usize {
        match self {
            ReadinessGroup::Misfire => 0,
            ReadinessGroup::FuelSystem => 1,
            ReadinessGroup::Comprehensive => 2,
            ReadinessGroup::Catalyst => 3,
            ReadinessGroup::HeatedCatalyst => 4,
            ReadinessGroup::EvapSystem => 5,
            ReadinessGroup::SecondaryAir => 6,
            ReadinessGroup::O2Sensor => 7,
            ReadinessGroup::O2SensorHeater => 8,
            ReadinessGroup::Egr => 9,
        }
    }

    /// Group at the given reporting position
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// TRUE for the continuously-monitored groups
    pub fn is_continuous(self) -> bool {
        matches!(
            self,
            ReadinessGroup::Misfire | ReadinessGroup::FuelSystem | ReadinessGroup::Comprehensive
        )
    }
}

impl std::fmt::Display for ReadinessGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReadinessGroup::Misfire => "misfire",
            ReadinessGroup::FuelSystem => "fuel_system",
            ReadinessGroup::Comprehensive => "comprehensive",
            ReadinessGroup::Catalyst => "catalyst",
            ReadinessGroup::HeatedCatalyst => "heated_catalyst",
            ReadinessGroup::EvapSystem => "evap_system",
            ReadinessGroup::SecondaryAir => "secondary_air",
            ReadinessGroup::O2Sensor => "o2_sensor",
            ReadinessGroup::O2SensorHeater => "o2_sensor_heater",
            ReadinessGroup::Egr => "egr",
        };
        f.write_str(s)
    }
}
