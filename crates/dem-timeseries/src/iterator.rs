//! Record-number readout cursor
//!
//! Diagnostic readout enumerates the stored record numbers of an event
//! without seeing set or series boundaries. The cursor moves monotonically
//! through record-number space: within a set, then to the next set of the
//! same series (offset by the per-memory stride), then to the series with
//! the next-higher first record number. Once no higher record number
//! exists the series index parks at the series count, the explicit
//! past-the-end sentinel.

use dem_core::{DemError, DemResult, EventId, SeriesId, EVENT_INVALID};

use crate::memory::TimeSeriesMemory;

/// Cursor over the record numbers of one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordIterator {
    event: EventId,
    /// Current series; `series_count` is the past-the-end sentinel
    series: SeriesId,
    series_count: SeriesId,
    /// Chronological set position within the series (0 = oldest)
    chrono_set: u8,
    /// Current record number
    record: u8,
    /// First record number of the current set
    set_first: u8,
    /// Last record number of the current set
    set_last: u8,
}

impl RecordIterator {
    pub fn event(&self) -> EventId {
        self.event
    }

    pub fn series_id(&self) -> SeriesId {
        self.series
    }

    pub fn record_number(&self) -> u8 {
        self.record
    }

    pub fn chronological_set(&self) -> u8 {
        self.chrono_set
    }

    /// TRUE once the cursor moved past the last record number of the event
    pub fn is_exhausted(&self) -> bool {
        self.series >= self.series_count
    }
}

/// Sequential-record summary for powertrain diagnostic readout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequentialInfo {
    /// Stored (readable) record numbers of the event
    pub stored_records: u16,
    /// Lowest stored record number
    pub first_record: Option<u8>,
    /// Highest stored record number
    pub last_record: Option<u8>,
}

impl TimeSeriesMemory {
    /// Position at the first record number of the series' first set
    pub fn iter_by_series(&self, event: EventId, series: SeriesId) -> DemResult<RecordIterator> {
        let master = self.config.master_event(event);
        let series_cfg = self.config.series_of(master, series)?;
        let first = series_cfg.first_record_number;
        let samples = self.config.configured_samples_per_set(series_cfg);
        Ok(RecordIterator {
            event: master,
            series,
            series_count: self.config.series_count(master),
            chrono_set: 0,
            record: first,
            set_first: first,
            set_last: first + samples - 1,
        })
    }

    /// Resolve which series contains (or best extrapolates to) the record
    /// number and position there. The record itself may turn out invalid;
    /// [`TimeSeriesMemory::is_invalid`] reports that.
    pub fn iter_by_record_number(
        &self,
        event: EventId,
        record: u8,
    ) -> DemResult<RecordIterator> {
        let master = self.config.master_event(event);
        let series = self.series_for_record_number(master, record)?;
        let series_cfg = self.config.series_of(master, series)?;
        let first = series_cfg.first_record_number;
        let samples = self.config.configured_samples_per_set(series_cfg);
        let memory_cfg = self.config.event(master)?.memory;
        let stride = self.config.record_number_stride(memory_cfg);
        let max_sets = self.config.memories[memory_cfg].max_sets;

        let chrono_set = if record <= first {
            0
        } else {
            ((record - first) / stride).min(max_sets - 1)
        };
        let set_first = first.saturating_add(stride.saturating_mul(chrono_set));
        Ok(RecordIterator {
            event: master,
            series,
            series_count: self.config.series_count(master),
            chrono_set,
            record,
            set_first,
            set_last: set_first.saturating_add(samples - 1),
        })
    }

    /// O(series-count) scan resolving which series owns a record number:
    /// the series with the lowest first record number whose last record
    /// across all sets reaches the target, else the series with the
    /// globally highest last record number.
    fn series_for_record_number(&self, event: EventId, record: u8) -> DemResult<SeriesId> {
        let count = self.config.series_count(event);
        if count == 0 {
            return Err(DemError::UnknownSeries { event, series: 0 });
        }
        let mut best: Option<(SeriesId, u8)> = None;
        let mut fallback: Option<(SeriesId, u8)> = None;
        for sid in 0..count {
            let first = self.config.series_of(event, sid)?.first_record_number;
            let last_any = self.config.last_record_number_any_set(event, sid)?;
            if last_any >= record && best.map_or(true, |(_, bf)| first < bf) {
                best = Some((sid, first));
            }
            if fallback.map_or(true, |(_, fl)| last_any > fl) {
                fallback = Some((sid, last_any));
            }
        }
        Ok(best.or(fallback).map(|(sid, _)| sid).unwrap_or(0))
    }

    /// Advance to the next record number of the event, crossing set and
    /// series boundaries; parks at the sentinel when no higher record
    /// number exists
    pub fn next_record_number_in_any_series(&self, iter: &mut RecordIterator) {
        if iter.is_exhausted() {
            return;
        }
        if iter.record < iter.set_last {
            iter.record += 1;
        } else {
            self.next_set(iter);
        }
    }

    /// Jump to the first record of the next set of the same series;
    /// crosses into the next series after the last set
    pub fn next_set(&self, iter: &mut RecordIterator) {
        if iter.is_exhausted() {
            return;
        }
        if iter.chrono_set + 1 < self.max_sets() {
            let stride = self.config.record_number_stride(self.memory_id);
            let width = iter.set_last - iter.set_first;
            iter.chrono_set += 1;
            iter.set_first = iter.set_first.saturating_add(stride);
            iter.set_last = iter.set_first.saturating_add(width);
            iter.record = iter.set_first;
        } else {
            self.next_series_by_record_number(iter);
        }
    }

    /// Jump to the first record of the series with the next-higher first
    /// record number; parks at the sentinel when none remains
    pub fn next_series_by_record_number(&self, iter: &mut RecordIterator) {
        if iter.is_exhausted() {
            return;
        }
        let current_first = match self.config.series_of(iter.event, iter.series) {
            Ok(cfg) => cfg.first_record_number,
            Err(_) => {
                iter.series = iter.series_count;
                return;
            }
        };
        let mut next: Option<(SeriesId, u8, u8)> = None;
        for sid in 0..iter.series_count {
            let Ok(cfg) = self.config.series_of(iter.event, sid) else {
                continue;
            };
            if cfg.first_record_number <= current_first {
                continue;
            }
            if next.map_or(true, |(_, first, _)| cfg.first_record_number < first) {
                let samples = self.config.configured_samples_per_set(cfg);
                next = Some((sid, cfg.first_record_number, samples));
            }
        }
        match next {
            Some((sid, first, samples)) => {
                iter.series = sid;
                iter.chrono_set = 0;
                iter.set_first = first;
                iter.set_last = first + samples - 1;
                iter.record = first;
            }
            None => iter.series = iter.series_count,
        }
    }

    /// TRUE if the cursor does not reference an actually stored sample:
    /// the event is unset, the cursor is past the end, the chronological
    /// set was never written, or the slot within the set holds no sample
    pub fn is_invalid(&self, iter: &RecordIterator) -> bool {
        if iter.event == EVENT_INVALID || iter.is_exhausted() {
            return true;
        }
        if iter.record < iter.set_first || iter.record > iter.set_last {
            return true;
        }
        let Some(index) = self.find_entry_index(iter.event) else {
            return true;
        };
        let Some(entry) = self.entry(index) else {
            return true;
        };
        let Some(header) = entry.series.get(iter.series as usize) else {
            return true;
        };
        let max_sets = self.max_sets();
        if iter.chrono_set >= header.stored_set_count(max_sets) {
            return true;
        }
        let physical = header.physical_set_id(iter.chrono_set, max_sets);
        let Some(set) = header.sets.get(physical as usize) else {
            return true;
        };
        !set.is_sample_stored((iter.record - iter.set_first) as usize)
    }

    /// Payload of the sample the cursor points at
    pub fn sample_at(&self, iter: &RecordIterator) -> Option<&[u8]> {
        if self.is_invalid(iter) {
            return None;
        }
        let index = self.find_entry_index(iter.event)?;
        let entry = self.entry(index)?;
        let header = entry.series.get(iter.series as usize)?;
        let physical = header.physical_set_id(iter.chrono_set, self.max_sets());
        let set = header.sets.get(physical as usize)?;
        set.samples
            .get((iter.record - iter.set_first) as usize)?
            .as_deref()
    }

    /// TRUE if the record number names a stored sample of the event
    pub fn test_record_number_is_valid(&self, event: EventId, record: u8) -> bool {
        self.iter_by_record_number(event, record)
            .map(|iter| iter.record_number() == record && !self.is_invalid(&iter))
            .unwrap_or(false)
    }

    /// TRUE if the record number lies within the series' configured record
    /// layout (whether or not a sample is stored there)
    pub fn test_record_number_is_in_series(
        &self,
        event: EventId,
        series: SeriesId,
        record: u8,
    ) -> DemResult<bool> {
        let master = self.config.master_event(event);
        let series_cfg = self.config.series_of(master, series)?;
        let first = series_cfg.first_record_number;
        if record < first || record > self.config.last_record_number_any_set(master, series)? {
            return Ok(false);
        }
        let memory_cfg = self.config.event(master)?.memory;
        let stride = self.config.record_number_stride(memory_cfg);
        let offset = (record - first) % stride;
        Ok(offset < self.config.configured_samples_per_set(series_cfg))
    }

    /// Sequential-record summary of an event for powertrain diagnostic
    /// services
    pub fn powertrain_sequential_info(&self, event: EventId) -> DemResult<SequentialInfo> {
        let master = self.config.master_event(event);
        self.config.event(master)?;
        let count = self.config.series_count(master);
        let mut info = SequentialInfo::default();
        if count == 0 {
            return Ok(info);
        }

        // Start from the series with the lowest first record number
        let mut start = 0;
        let mut lowest = u8::MAX;
        for sid in 0..count {
            let first = self.config.series_of(master, sid)?.first_record_number;
            if first < lowest {
                lowest = first;
                start = sid;
            }
        }

        let mut limit: u32 = 0;
        for sid in 0..count {
            let series_cfg = self.config.series_of(master, sid)?;
            limit += self.max_sets() as u32
                * self.config.configured_samples_per_set(series_cfg) as u32;
        }

        let mut iter = self.iter_by_series(master, start)?;
        for _ in 0..limit {
            if iter.is_exhausted() {
                break;
            }
            if !self.is_invalid(&iter) {
                info.stored_records += 1;
                if info.first_record.is_none() {
                    info.first_record = Some(iter.record_number());
                }
                info.last_record = Some(iter.record_number());
            }
            self.next_record_number_in_any_series(&mut iter);
        }
        Ok(info)
    }
}
