//! Status transitions flowing through the global-diagnostics coordinator
//! into readiness tracking and time-series storage.

use std::collections::HashMap;
use std::sync::Arc;

use dem_core::status::status_bit;
use dem_core::{EventId, ReadinessGroup};
use dem_readiness::GlobalDiagnostics;
use dem_tests::setup_memory_with;
use dem_timeseries::testing::test_config;

const CONFIRMED: u8 = status_bit::CONFIRMED_DTC;
const NOT_TESTED: u8 = status_bit::TEST_NOT_COMPLETED_THIS_OPERATION_CYCLE;

#[test]
fn test_confirmed_transition_triggers_storage_and_readiness() {
    let config = Arc::new(test_config());
    let (mut memory, _nv, ring) = setup_memory_with(config.clone());
    let mut diag = GlobalDiagnostics::new(config.clone());
    let mut statuses: HashMap<EventId, u8> =
        (1..=4).map(|event| (event, NOT_TESTED)).collect();
    diag.begin_operation_cycle();

    ring.push_sample(0, vec![0x5A; 4]);

    // Event 1 becomes confirmed with a completed test
    let triggers = diag.on_status_transition(1, NOT_TESTED, CONFIRMED).unwrap();
    statuses.insert(1, CONFIRMED);
    let mask = config.series_trigger_mask(1, &triggers).unwrap();
    assert!(!mask.is_empty());
    let slot = memory.store_entry(1, &mask, &ring).unwrap().unwrap();
    assert_eq!(memory.entry(slot).unwrap().event_id, 1);
    assert_eq!(diag.confirmed_count(), 1);

    // Catalyst completion needs event 3 (same group) tested as well
    let status_of =
        |event: EventId| statuses.get(&event).copied().unwrap_or(NOT_TESTED);
    diag.process_deferred(&status_of);
    assert!(!diag.readiness().is_completed(ReadinessGroup::Catalyst));

    diag.on_status_transition(3, NOT_TESTED, 0x00).unwrap();
    statuses.insert(3, 0x00);
    let status_of =
        |event: EventId| statuses.get(&event).copied().unwrap_or(NOT_TESTED);
    diag.process_deferred(&status_of);
    assert!(diag.readiness().is_completed(ReadinessGroup::Catalyst));
}

#[test]
fn test_mismatched_trigger_produces_no_storage() {
    let config = Arc::new(test_config());
    let (mut memory, _nv, ring) = setup_memory_with(config.clone());
    let mut diag = GlobalDiagnostics::new(config.clone());
    ring.push_sample(1, vec![0x01, 0x02]);

    // Event 2 stores on test-failed; a pending edge must not store
    let triggers = diag
        .on_status_transition(2, 0x00, status_bit::PENDING_DTC)
        .unwrap();
    let mask = config.series_trigger_mask(2, &triggers).unwrap();
    assert!(mask.is_empty());
    assert_eq!(memory.store_entry(2, &mask, &ring).unwrap(), None);

    // The test-failed edge stores both series of the event
    let triggers = diag
        .on_status_transition(2, status_bit::PENDING_DTC, status_bit::TEST_FAILED)
        .unwrap();
    let mask = config.series_trigger_mask(2, &triggers).unwrap();
    assert_eq!(mask.count(), 2);
    assert!(memory.store_entry(2, &mask, &ring).unwrap().is_some());
}

#[test]
fn test_operation_cycle_restart_resets_readiness() {
    let config = Arc::new(test_config());
    let mut diag = GlobalDiagnostics::new(config);
    diag.begin_operation_cycle();
    diag.process_deferred(&|_| 0x00);
    assert!(diag.readiness().is_completed(ReadinessGroup::Catalyst));
    assert!(diag.readiness().is_completed(ReadinessGroup::Egr));

    diag.begin_operation_cycle();
    assert!(!diag.readiness().is_completed(ReadinessGroup::Catalyst));
    assert_eq!(diag.readiness().completed_mask(), 0);
}

#[test]
fn test_fdc_crossing_stores_without_status_edge() {
    let config = Arc::new(test_config());
    let (mut memory, _nv, ring) = setup_memory_with(config.clone());
    let diag = GlobalDiagnostics::new(config.clone());
    ring.push_sample(0, vec![0x77; 4]);

    let triggers = diag.on_fdc_threshold_crossed(1).unwrap();
    // Event 1's series binds to the confirmed trigger, not FDC
    let mask = config.series_trigger_mask(1, &triggers).unwrap();
    assert!(mask.is_empty());
    assert_eq!(memory.store_entry(1, &mask, &ring).unwrap(), None);
}
