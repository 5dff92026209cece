//! Transient per-entry companion state
//!
//! Holds the readout lock, the per-set future-sample debts, and the
//! deferred-cleanup marker for one entry slot. Never persisted; every
//! power-on init starts from [`ReadoutState::Unused`].

use dem_core::{SeriesId, SetId};

use crate::traits::NvBlockState;

/// Readout lock state of one entry's virtual buffer.
///
/// Transitions: Unused -> Unlocked on activation, Unlocked -> Locked on
/// readout acquire, Locked -> ReleaseRequested when deletion is requested
/// under the lock, Locked/ReleaseRequested -> Unlocked on release, any ->
/// Unused on slot reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadoutState {
    /// No entry occupies this slot
    #[default]
    Unused,
    /// Entry present, no readout in progress
    Unlocked,
    /// A diagnostic client holds the virtual buffer
    Locked,
    /// Deletion was requested while locked; performed after release
    ReleaseRequested,
}

/// Transient metadata for one entry slot
#[derive(Debug, Clone, Default)]
pub struct EntryCompanion {
    state: ReadoutState,
    /// Outstanding future samples per (series, physical set)
    missing_future: Vec<Vec<u8>>,
    /// Deferred removal armed by a release while deletion was requested
    pending_cleanup: Option<NvBlockState>,
}

impl EntryCompanion {
    /// Bind the companion to a freshly created or restored entry
    pub fn activate(&mut self, series_count: usize, max_sets: u8) {
        self.state = ReadoutState::Unlocked;
        self.missing_future = vec![vec![0; max_sets as usize]; series_count];
        self.pending_cleanup = None;
    }

    /// Return the slot to the unused state
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn state(&self) -> ReadoutState {
        self.state
    }

    /// TRUE while a diagnostic client holds the virtual buffer
    pub fn is_locked(&self) -> bool {
        matches!(
            self.state,
            ReadoutState::Locked | ReadoutState::ReleaseRequested
        )
    }

    /// Acquire the readout lock. Fails with the current state when the
    /// buffer is not free; the caller reports the failure and never
    /// retries internally.
    pub fn try_lock(&mut self) -> Result<(), ReadoutState> {
        match self.state {
            ReadoutState::Unlocked => {
                self.state = ReadoutState::Locked;
                Ok(())
            }
            other => Err(other),
        }
    }

    /// Request deletion while the buffer is locked; the removal is
    /// deferred until the lock is released
    pub fn defer_cleanup(&mut self, block_state: NvBlockState) {
        if self.state == ReadoutState::Locked {
            self.state = ReadoutState::ReleaseRequested;
        }
        self.pending_cleanup = Some(block_state);
    }

    /// Release the readout lock. Fails with the current state when no
    /// lock is held.
    pub fn release(&mut self) -> Result<(), ReadoutState> {
        match self.state {
            ReadoutState::Locked | ReadoutState::ReleaseRequested => {
                self.state = ReadoutState::Unlocked;
                Ok(())
            }
            other => Err(other),
        }
    }

    /// Take the deferred-cleanup marker once the lock is gone
    pub fn take_pending_cleanup(&mut self) -> Option<NvBlockState> {
        if self.is_locked() {
            None
        } else {
            self.pending_cleanup.take()
        }
    }

    /// Outstanding future samples of one set
    pub fn missing(&self, series: SeriesId, set: SetId) -> u8 {
        self.missing_future
            .get(series as usize)
            .and_then(|sets| sets.get(set as usize))
            .copied()
            .unwrap_or(0)
    }

    /// Record the future-sample debt of a freshly written set
    pub fn set_missing(&mut self, series: SeriesId, set: SetId, count: u8) {
        if let Some(sets) = self.missing_future.get_mut(series as usize) {
            if let Some(slot) = sets.get_mut(set as usize) {
                *slot = count;
            }
        }
    }

    /// Consume one outstanding future sample of a set
    pub fn decrement_missing(&mut self, series: SeriesId, set: SetId) {
        if let Some(sets) = self.missing_future.get_mut(series as usize) {
            if let Some(slot) = sets.get_mut(set as usize) {
                *slot = slot.saturating_sub(1);
            }
        }
    }

    /// Outstanding future samples across all series and sets
    pub fn total_missing(&self) -> u32 {
        self.missing_future
            .iter()
            .flatten()
            .map(|&m| m as u32)
            .sum()
    }
}
