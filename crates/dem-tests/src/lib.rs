//! Shared helpers for the event-manager integration tests

use std::sync::Arc;

use dem_core::{BitField256, DemConfig};
use dem_timeseries::testing::{test_config, MockRingBuffer, RecordingNvHandler};
use dem_timeseries::{NullUpdateListener, PriorityDisplacement, TimeSeriesMemory};

/// Fresh memory over the shared test configuration, with a recording NvM
/// handler and a scriptable ring buffer
pub fn setup_memory() -> (TimeSeriesMemory, Arc<RecordingNvHandler>, MockRingBuffer) {
    let config = Arc::new(test_config());
    setup_memory_with(config)
}

/// Fresh memory over a caller-provided configuration
pub fn setup_memory_with(
    config: Arc<DemConfig>,
) -> (TimeSeriesMemory, Arc<RecordingNvHandler>, MockRingBuffer) {
    let nv = Arc::new(RecordingNvHandler::new());
    let memory = TimeSeriesMemory::new(
        config.clone(),
        0,
        nv.clone(),
        Arc::new(PriorityDisplacement),
        Arc::new(NullUpdateListener),
    )
    .expect("memory 0 is configured");
    let ring = MockRingBuffer::new(config.sampling_profiles.len(), 16);
    (memory, nv, ring)
}

/// Trigger mask with the given series bits set
pub fn mask_of(bits: &[usize]) -> BitField256 {
    let mut mask = BitField256::new();
    for &bit in bits {
        mask.set(bit);
    }
    mask
}
