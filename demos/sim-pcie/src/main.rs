// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Simulate a PCIe/CXL fabric.
//!
//! See `lib.rs` for details.
use std::path::Path;
use std::rc::Rc;

use byte_unit::{AdjustedByte, Byte, UnitType};
use indicatif::ProgressBar;
use lanes_engine::engine::Engine;
use lanes_engine::events::once::Once;
use lanes_engine::executor::Spawner;
use lanes_engine::time::clock::Clock;
use lanes_engine::types::SimError;
use lanes_models::endpoint::Endpoint;
use lanes_models::link::LinkDirection;
use lanes_platform::{Fabric, parse_topology, read_topology};
use lanes_track::builder::{Output, TrackerConfig, setup_trackers};
use lanes_track::entity::{Entity, GetEntity};
use lanes_track::{Tracker, error, info, warn};
use sim_pcie::REFERENCE_TOPOLOGY;
use sim_pcie::config::SimConfig;
use sim_pcie::dma_gen::add_random_dma;

fn setup_all_trackers(config: &SimConfig) -> Result<Tracker, SimError> {
    let mut outputs = Vec::new();
    if config.stdout() {
        outputs.push(TrackerConfig {
            output: Output::Stdout,
            level: config.stdout_level(),
            filter_regex: config.stdout_filter_regex(),
        });
    }
    if config.log_file() {
        outputs.push(TrackerConfig {
            output: Output::File(Path::new(config.log_file_name())),
            level: config.log_file_level(),
            filter_regex: config.log_file_filter_regex(),
        });
    }
    setup_trackers(&outputs).map_err(|e| SimError(e.to_string()))
}

/// Install an event which fires at the clock tick defined.
fn finish_at(spawner: &Spawner, clock: Clock, finish_tick: u64) -> Once {
    let finish = Once::default();
    let event = finish.clone();
    spawner.spawn(async move {
        // A background wait so that a fabric which goes idle first still ends
        clock.wait_ticks_or_exit(finish_tick).await;
        event.notify()
    });
    finish
}

/// Spawn a background task to display regular updates of the total number of
/// DMA operations completed so far.
fn start_dma_progress(
    spawner: &Spawner,
    clock: Clock,
    progress_ticks: u64,
    endpoints: Vec<Rc<Endpoint>>,
    total_dma: usize,
    progress_bar: ProgressBar,
) {
    spawner.spawn(async move {
        let mut seen = 0;
        loop {
            clock.wait_ticks_or_exit(progress_ticks).await;
            let completed: usize = endpoints.iter().map(|e| e.num_dma_completed()).sum();
            progress_bar.inc((completed - seen) as u64);
            seen = completed;
            if completed == total_dma {
                break;
            }
        }
        Ok(())
    });
}

fn main() -> Result<(), SimError> {
    let config = SimConfig::parse_all_sources()?;
    let tracker = setup_all_trackers(&config)?;

    let mut engine = Engine::new(&tracker);
    let top = engine.top().clone();

    let mut topology = match &config.topology {
        Some(path) => read_topology(path)?,
        None => parse_topology(REFERENCE_TOPOLOGY)?,
    };
    if config.random_dma_ops() > 0 {
        info!(top ; "Adding {} random DMA operations to each endpoint. Random seed {}",
            config.random_dma_ops(), config.seed());
        add_random_dma(
            &mut topology,
            config.random_dma_ops(),
            config.random_dma_max_bytes(),
            config.seed(),
        );
    }

    let fabric = Fabric::build(&mut engine, &topology)?;
    info!(top ; "Fabric built and connected");
    for line in fabric.to_string().lines() {
        info!(top ; "{line}");
    }

    let spawner = engine.spawner();
    let clock = fabric.clock().clone();

    let total_dma: usize = fabric.endpoints().iter().map(|e| e.config().dma.len()).sum();
    let progress_bar = ProgressBar::new(total_dma as u64);
    if config.progress() {
        start_dma_progress(
            &spawner,
            clock.clone(),
            config.progress_ticks(),
            fabric.endpoints().to_vec(),
            total_dma,
            progress_bar.clone(),
        );
    }

    let finish = match config.finish_tick() {
        0 => None,
        finish_tick => Some(finish_at(&spawner, clock.clone(), finish_tick)),
    };
    match &finish {
        Some(finish) => engine.run_until(finish)?,
        None => engine.run()?,
    }

    if finish.as_ref().is_some_and(Once::is_triggered) {
        warn!(top ; "Stopped at tick {} with {} transactions outstanding",
            config.finish_tick(), fabric.num_outstanding());
    } else if let Err(e) = fabric.check_complete() {
        error!(top ; "{}/{} DMA operations completed",
            fabric.endpoints().iter().map(|e| e.num_dma_completed()).sum::<usize>(), total_dma);
        error!(top ; "Deadlock detected at {:.2}ns", clock.time_now_ns());

        tracker.shutdown();
        return Err(e);
    }

    if config.progress() {
        progress_bar.finish();
    }

    print_summary(&top, &fabric, clock.time_now_ns());
    tracker.shutdown();
    Ok(())
}

fn print_summary(top: &Rc<Entity>, fabric: &Fabric, time_now_ns: f64) {
    let time_now_s = time_now_ns / (1000.0 * 1000.0 * 1000.0);
    let host = fabric.host();

    info!(top ; "Pass: completed in {time_now_ns:.2}ns.");
    info!(top ; "Host: {} PIO reads returned, {} DMA requests served.",
        host.pio_read_results().len(), host.num_dma_served());

    for endpoint in fabric.endpoints() {
        let interrupt = if endpoint.interrupt_raised() {
            format!("raised on line {}", endpoint.config().interrupt_line)
        } else {
            "not raised".to_string()
        };
        info!(top ; "{} {}: {} PIO handled, {} DMA completed, interrupt {}.",
            endpoint.entity(), endpoint.bdf(), endpoint.num_pio_handled(),
            endpoint.num_dma_completed(), interrupt);
    }

    for link in fabric.links() {
        let bytes: usize = LinkDirection::ALL.iter().map(|d| link.stats(*d).bytes).sum();
        let (total, per_second) = compute_adjusted_value_and_rate(time_now_s, bytes as u64);
        info!(top ; "{}: high-water mark {}. Carried {total:.2} ({per_second:.2}/s).",
            link.entity(), link.high_water_mark());
    }
}

fn compute_adjusted_value_and_rate(
    time_now_s: f64,
    num_bytes: u64,
) -> (AdjustedByte, AdjustedByte) {
    // Convert to a binary-only unit (KiB, MiB, etc)
    let count = Byte::from_u64(num_bytes).get_appropriate_unit(UnitType::Binary);
    let per_second = if time_now_s > 0.0 {
        Byte::from_f64(num_bytes as f64 / time_now_s).unwrap_or(Byte::from_u64(0))
    } else {
        Byte::from_u64(0)
    };
    (count, per_second.get_appropriate_unit(UnitType::Binary))
}
