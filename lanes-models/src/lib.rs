// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! PCIe/CXL fabric models.
//!
//! The models exchange [TLPs](crate::tlp::Tlp) over [Links](crate::link::Link).
//! Every component that a link can attach to implements [`FabricPorts`],
//! where each fabric port is made up of four rendezvous ports:
//!
//!  - `request_tx[i]` / `request_rx[i]`: requests leaving / arriving.
//!  - `response_tx[i]` / `response_rx[i]`: completions leaving / arriving.
//!
//! A [Root Complex](crate::root_complex::RootComplex) or
//! [Switch](crate::switch::Switch) forwards traffic between its ports while an
//! [Endpoint](crate::endpoint::Endpoint) terminates it. The
//! [Host](crate::host::Host) stands in for the CPU and memory system behind
//! the root complex.

use lanes_engine::port::PortStateResult;
use lanes_engine::types::SimResult;
use lanes_track::entity::GetEntity;

use crate::tlp::Tlp;

pub mod bdf;
pub mod endpoint;
pub mod host;
pub mod link;
pub mod memory;
pub mod root_complex;
pub mod routing;
pub mod switch;
pub mod tlp;

/// Build the error returned when a component sees traffic that breaks the
/// PCIe transaction rules.
///
/// The violation is also logged against the entity as an error.
#[macro_export]
macro_rules! protocol_violation {
    ($entity:expr ; $($arg:tt)+) => {{
        lanes_track::error!($entity ; $($arg)+);
        lanes_engine::sim_error!("{}: protocol violation: {}", $entity, format_args!($($arg)+))
    }};
}

/// The ports shared by every component a [Link](crate::link::Link) can be
/// attached to.
pub trait FabricPorts: GetEntity {
    fn num_fabric_ports(&self) -> usize;

    fn connect_port_request_tx_i(&self, i: usize, port_state: PortStateResult<Tlp>) -> SimResult;
    fn port_request_rx_i(&self, i: usize) -> PortStateResult<Tlp>;

    fn connect_port_response_tx_i(&self, i: usize, port_state: PortStateResult<Tlp>)
    -> SimResult;
    fn port_response_rx_i(&self, i: usize) -> PortStateResult<Tlp>;
}
