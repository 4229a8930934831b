// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Simulate a PCIe/CXL fabric.
//!
//! The fabric is described by a topology file (see `lanes-platform`). By
//! default the built-in reference topology is used:
//! ```text
//!   host -> rc.downstream0 --pcie1--> switch --pcie4--> cxl1 (04:00.0)
//!           rc.downstream1 --pcie3--> cxl0 (03:00.0)
//! ```
//!
//! The host runs the PIO program of the topology while every endpoint runs
//! its DMA program. When all transactions have completed a summary of the
//! traffic is reported. A run that stops with transactions still outstanding
//! is reported as a deadlock.
//!
//! # Examples
//!
//! Running the reference topology
//! ```text
//! cargo run --bin sim-pcie --release -- --stdout
//! ```
//!
//! Adding 1000 random DMA operations to every endpoint
//! ```text
//! cargo run --bin sim-pcie --release -- --random-dma-ops 1000 --seed 3 --stdout --progress
//! ```
//!
//! Settings can also be given in a TOML file or as `LANES_*` environment
//! variables, with the command line taking priority:
//! ```text
//! LANES_RANDOM_DMA_OPS=100 cargo run --bin sim-pcie -- --conf-file sim.toml
//! ```

pub mod config;
pub mod dma_gen;

/// The topology used when no `--topology` is given.
pub const REFERENCE_TOPOLOGY: &str = include_str!("../../../lanes-platform/topologies/reference.yaml");
