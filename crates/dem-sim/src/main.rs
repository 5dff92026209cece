//! dem-sim - Diagnostic event manager simulator
//!
//! Drives the time-series memory engine and the readiness tracker through
//! a scripted fault scenario: a ring-buffer sampler collects ramp signals
//! while status transitions, DTC clears and the periodic task run on a
//! cycle schedule. The final report lists the stored record numbers with
//! their payloads plus the readiness state.
//!
//! # Usage
//!
//! Built-in demo scenario:
//! ```bash
//! ./dem-sim
//! ```
//!
//! With a scenario file:
//! ```bash
//! ./dem-sim --config scenario.toml --json
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use tracing::{debug, info, warn};

use dem_core::{DemConfig, EventId, NvBlockId, SeriesId};
use dem_readiness::GlobalDiagnostics;
use dem_timeseries::{
    NullUpdateListener, NvBlockHandler, NvBlockState, PriorityDisplacement, TimeSeriesMemory,
};

mod config;
mod sampler;

use config::SimConfig;
use sampler::SimSampler;

/// Initial DTC status: tests not completed since clear / this cycle
const STATUS_INITIAL: u8 = 0x50;

#[derive(Parser, Debug)]
#[command(name = "dem-sim")]
#[command(about = "Scenario-driven simulator for the diagnostic event manager")]
struct Args {
    /// Scenario file path (TOML format); runs the built-in demo if omitted
    #[arg(short, long)]
    config: Option<String>,

    /// Override the scenario length in cycles
    #[arg(long)]
    cycles: Option<u32>,

    /// Print the final report as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// NvM adapter that logs block markings instead of persisting
struct LoggingNvHandler;

impl NvBlockHandler for LoggingNvHandler {
    fn set_block_state(&self, block: NvBlockId, state: NvBlockState) {
        debug!(block, ?state, "NvM block marked");
    }
}

#[derive(Debug, Serialize)]
struct SimReport {
    cycles_run: u32,
    confirmed_events: u16,
    readiness_supported_mask: u16,
    readiness_completed_mask: u16,
    events: Vec<EventReport>,
}

#[derive(Debug, Serialize)]
struct EventReport {
    event: EventId,
    stored_records: u16,
    records: Vec<RecordReport>,
}

#[derive(Debug, Serialize)]
struct RecordReport {
    record_number: u8,
    series: SeriesId,
    data: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut scenario = match &args.config {
        Some(path) => SimConfig::load(path)?,
        None => {
            info!("no scenario file given, running the built-in demo");
            SimConfig::demo()
        }
    };
    if let Some(cycles) = args.cycles {
        scenario.cycles = cycles;
    }

    let report = run_scenario(&scenario)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn run_scenario(scenario: &SimConfig) -> Result<SimReport> {
    let dem = Arc::new(scenario.dem.clone());
    let sampler = SimSampler::new(&dem, &scenario.signals);
    let nv = Arc::new(LoggingNvHandler);

    let mut memories = Vec::new();
    for memory_id in 0..dem.memories.len() {
        memories.push(TimeSeriesMemory::new(
            dem.clone(),
            memory_id,
            nv.clone(),
            Arc::new(PriorityDisplacement),
            Arc::new(NullUpdateListener),
        )?);
    }

    let mut diag = GlobalDiagnostics::new(dem.clone());
    let mut statuses: HashMap<EventId, u8> = (1..=dem.event_count() as EventId)
        .map(|event| (event, STATUS_INITIAL))
        .collect();
    diag.begin_operation_cycle();

    for cycle in 0..scenario.cycles {
        sampler.tick(cycle);

        for injection in scenario.injections.iter().filter(|i| i.cycle == cycle) {
            let old = statuses
                .get(&injection.event)
                .copied()
                .unwrap_or(STATUS_INITIAL);
            match diag.on_status_transition(injection.event, old, injection.status) {
                Ok(triggers) => {
                    statuses.insert(injection.event, injection.status);
                    info!(
                        cycle,
                        event = injection.event,
                        old = format!("0x{:02X}", old),
                        new = format!("0x{:02X}", injection.status),
                        "status transition"
                    );
                    if !triggers.is_empty() {
                        let master = dem.master_event(injection.event);
                        let mask = dem.series_trigger_mask(master, &triggers)?;
                        let memory_id = dem.event(master)?.memory;
                        memories[memory_id].store_entry(injection.event, &mask, &sampler)?;
                    }
                }
                Err(e) => warn!(event = injection.event, %e, "status transition rejected"),
            }
        }

        for clear in scenario.clears.iter().filter(|c| c.cycle == cycle) {
            let master = dem.master_event(clear.event);
            if let Ok(cfg) = dem.event(master) {
                info!(cycle, event = clear.event, "DTC cleared");
                let old = statuses
                    .get(&clear.event)
                    .copied()
                    .unwrap_or(STATUS_INITIAL);
                let _ = diag.on_status_transition(clear.event, old, STATUS_INITIAL);
                statuses.insert(clear.event, STATUS_INITIAL);
                memories[cfg.memory]
                    .invalidate_entry_of_event(clear.event, NvBlockState::DirtyImmediate)?;
            }
        }

        for memory in &mut memories {
            memory.main_function(&sampler);
        }
        let status_of = |event: EventId| statuses.get(&event).copied().unwrap_or(STATUS_INITIAL);
        diag.process_deferred(&status_of);
    }

    Ok(build_report(scenario.cycles, &dem, &memories, &diag))
}

fn build_report(
    cycles_run: u32,
    dem: &DemConfig,
    memories: &[TimeSeriesMemory],
    diag: &GlobalDiagnostics,
) -> SimReport {
    let mut events = Vec::new();
    for idx in 0..dem.event_count() {
        let event = (idx + 1) as EventId;
        if !dem.is_master_event(event) || dem.series_count(event) == 0 {
            continue;
        }
        let memory_id = dem.events[idx].memory;
        let memory = &memories[memory_id];
        let Ok(info) = memory.powertrain_sequential_info(event) else {
            continue;
        };

        let stride = dem.record_number_stride(memory_id);
        let max_sets = dem.memories[memory_id].max_sets;
        let mut records = Vec::new();
        for sid in 0..dem.series_count(event) {
            let Ok(series_cfg) = dem.series_of(event, sid) else {
                continue;
            };
            let samples = dem.configured_samples_per_set(series_cfg);
            for set in 0..max_sets {
                for offset in 0..samples {
                    let record = (series_cfg.first_record_number as u16
                        + set as u16 * stride as u16
                        + offset as u16) as u8;
                    if !memory.test_record_number_is_valid(event, record) {
                        continue;
                    }
                    let Ok(iter) = memory.iter_by_record_number(event, record) else {
                        continue;
                    };
                    if let Some(data) = memory.sample_at(&iter) {
                        records.push(RecordReport {
                            record_number: record,
                            series: sid,
                            data: hex::encode(data),
                        });
                    }
                }
            }
        }

        events.push(EventReport {
            event,
            stored_records: info.stored_records,
            records,
        });
    }

    SimReport {
        cycles_run,
        confirmed_events: diag.confirmed_count(),
        readiness_supported_mask: diag.readiness().supported_mask(),
        readiness_completed_mask: diag.readiness().completed_mask(),
        events,
    }
}

fn print_report(report: &SimReport) {
    println!("=== dem-sim report ===");
    println!("cycles run:          {}", report.cycles_run);
    println!("confirmed events:    {}", report.confirmed_events);
    println!(
        "readiness completed: 0x{:04X} (supported 0x{:04X})",
        report.readiness_completed_mask, report.readiness_supported_mask
    );
    for event in &report.events {
        println!(
            "event {}: {} stored record(s)",
            event.event, event.stored_records
        );
        for record in &event.records {
            println!(
                "  record 0x{:02X} (series {}): {}",
                record.record_number, record.series, record.data
            );
        }
    }
}
