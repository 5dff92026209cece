//! Persisted time-series entry storage
//!
//! A [`TimeSeriesEntry`] holds everything that survives a power cycle for
//! one event: the per-series FIFO headers and the sample sets themselves.
//! Transient bookkeeping lives in the companion instead.

use dem_core::{EventId, SeriesId, SetId};

/// One snapshot set: the sample slots of one past + future capture.
///
/// Slots are ordered past block first, future block after. `None` marks a
/// slot that never received a sample, either because the sampler had not
/// collected enough history at trigger time (leading past slots) or
/// because the future sample has not elapsed yet (trailing future slots).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleSet {
    /// Sample payloads by slot position
    pub samples: Vec<Option<Vec<u8>>>,
    /// Leading past slots still unfilled
    pub unused_past: u8,
    /// Trailing future slots still unfilled
    pub unused_future: u8,
    /// Sampler ticks between the most recent past sample and the trigger
    pub time_since_last_sample: u16,
}

impl SampleSet {
    /// TRUE once every past and future slot holds a sample
    pub fn is_fully_stored(&self) -> bool {
        !self.samples.is_empty() && self.unused_past == 0 && self.unused_future == 0
    }

    /// TRUE if the slot holds an actual sample (not padding, not pending)
    pub fn is_sample_stored(&self, offset: usize) -> bool {
        self.samples.get(offset).is_some_and(Option::is_some)
    }

    /// Number of slots holding a sample
    pub fn stored_sample_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_some()).count()
    }
}

/// Per-series FIFO header within an entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesHeader {
    /// Set that will be overwritten next
    pub next_set_id: SetId,
    /// Latched once the FIFO cursor wrapped past the last set
    pub all_sets_stored: bool,
    /// Snapshot sets, indexed by physical set id
    pub sets: Vec<SampleSet>,
}

impl SeriesHeader {
    /// Fresh header with `max_sets` empty sets
    pub fn new(max_sets: u8) -> Self {
        Self {
            next_set_id: 0,
            all_sets_stored: false,
            sets: vec![SampleSet::default(); max_sets as usize],
        }
    }
}

/// One persisted time-series entry: all stored sets of one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSeriesEntry {
    /// Owning event; always the representative event of a DTC combination
    pub event_id: EventId,
    /// Creation timestamp on the memory's monotonic chronology counter
    pub timestamp: u32,
    /// Per-series FIFO headers, indexed by series id
    pub series: Vec<SeriesHeader>,
}

impl TimeSeriesEntry {
    /// Fresh entry with empty headers for every configured series
    pub fn new(event_id: EventId, timestamp: u32, series_count: usize, max_sets: u8) -> Self {
        Self {
            event_id,
            timestamp,
            series: vec![SeriesHeader::new(max_sets); series_count],
        }
    }

    /// Drop all stored sets of one series and restart its FIFO
    pub fn reinit_series(&mut self, series: SeriesId, max_sets: u8) {
        if let Some(header) = self.series.get_mut(series as usize) {
            *header = SeriesHeader::new(max_sets);
        }
    }
}
