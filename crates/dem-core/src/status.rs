//! DTC status-byte definitions and time-series storage triggers
//!
//! Status bits follow ISO 14229-1. The storage triggers mirror the
//! conditions an event's snapshot configuration can bind time-series
//! storage to.

use serde::{Deserialize, Serialize};

/// DTC status byte bit definitions per ISO 14229-1
pub mod status_bit {
    /// Bit 0: Test Failed - DTC test failed this operation cycle
    pub const TEST_FAILED: u8 = 0x01;
    /// Bit 1: Test Failed This Operation Cycle
    pub const TEST_FAILED_THIS_OPERATION_CYCLE: u8 = 0x02;
    /// Bit 2: Pending DTC - Test failed but not yet confirmed
    pub const PENDING_DTC: u8 = 0x04;
    /// Bit 3: Confirmed DTC - Malfunction confirmed and stored
    pub const CONFIRMED_DTC: u8 = 0x08;
    /// Bit 4: Test Not Completed Since Last Clear
    pub const TEST_NOT_COMPLETED_SINCE_LAST_CLEAR: u8 = 0x10;
    /// Bit 5: Test Failed Since Last Clear
    pub const TEST_FAILED_SINCE_LAST_CLEAR: u8 = 0x20;
    /// Bit 6: Test Not Completed This Operation Cycle
    pub const TEST_NOT_COMPLETED_THIS_OPERATION_CYCLE: u8 = 0x40;
    /// Bit 7: Warning Indicator Requested
    pub const WARNING_INDICATOR_REQUESTED: u8 = 0x80;
}

/// Trigger condition that starts (or updates) time-series storage for an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageTrigger {
    /// Storage on the rising edge of the test-failed bit
    TestFailed,
    /// Storage on the rising edge of the pending bit
    Pending,
    /// Storage on the rising edge of the confirmed bit
    Confirmed,
    /// Storage when the fault detection counter crosses its threshold
    FdcThreshold,
}

impl StorageTrigger {
    /// All trigger conditions, in evaluation order
    pub const ALL: [StorageTrigger; 4] = [
        StorageTrigger::TestFailed,
        StorageTrigger::Pending,
        StorageTrigger::Confirmed,
        StorageTrigger::FdcThreshold,
    ];

    /// Status bit whose rising edge fires this trigger. The FDC threshold
    /// trigger has no status-bit representation; monitors report it out of
    /// band.
    pub fn status_bit(self) -> Option<u8> {
        match self {
            StorageTrigger::TestFailed => Some(status_bit::TEST_FAILED),
            StorageTrigger::Pending => Some(status_bit::PENDING_DTC),
            StorageTrigger::Confirmed => Some(status_bit::CONFIRMED_DTC),
            StorageTrigger::FdcThreshold => None,
        }
    }

    /// TRUE if this trigger condition newly holds for an old -> new status
    /// transition
    pub fn newly_holds(self, old_status: u8, new_status: u8) -> bool {
        match self.status_bit() {
            Some(bit) => (old_status & bit) == 0 && (new_status & bit) != 0,
            None => false,
        }
    }

    /// TRUE if the trigger condition still holds for the given status byte.
    ///
    /// Used at restore time to cross-check a persisted entry against the
    /// currently stored DTC status. FDC crossings are not reconstructible
    /// from the status byte, so FDC-triggered entries are always kept.
    pub fn still_holds(self, status: u8) -> bool {
        match self.status_bit() {
            Some(bit) => (status & bit) != 0,
            None => true,
        }
    }
}

/// Trigger conditions that newly hold for an old -> new status transition
pub fn newly_holding_triggers(old_status: u8, new_status: u8) -> Vec<StorageTrigger> {
    StorageTrigger::ALL
        .iter()
        .copied()
        .filter(|t| t.newly_holds(old_status, new_status))
        .collect()
}

/// TRUE if the event's monitor completed a test this operation cycle
pub fn test_completed_this_cycle(status: u8) -> bool {
    (status & status_bit::TEST_NOT_COMPLETED_THIS_OPERATION_CYCLE) == 0
}

/// TRUE if the confirmed bit rose with this transition
pub fn confirmed_set(old_status: u8, new_status: u8) -> bool {
    (old_status & status_bit::CONFIRMED_DTC) == 0
        && (new_status & status_bit::CONFIRMED_DTC) != 0
}

/// TRUE if the confirmed bit fell with this transition
pub fn confirmed_cleared(old_status: u8, new_status: u8) -> bool {
    (old_status & status_bit::CONFIRMED_DTC) != 0
        && (new_status & status_bit::CONFIRMED_DTC) == 0
}
