// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! This module represents the time during a simulation.
//!
//! Each [`Clock`](clock::Clock) counts ticks at its own frequency and
//! [`Timeline`](simtime::Timeline) moves the simulation forward to whichever
//! clock has the earliest pending waiter.

pub mod clock;
pub mod simtime;
