// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The root complex bridges the host to one or more PCIe hierarchies.
//!
//! Each fabric port `i` is a downstream port pair bound to one link.
//!
//! # Ports
//!
//! Host facing:
//!  - `host_request_rx`: programmed I/O from the host.
//!  - `host_response_tx`: PIO completions to the host.
//!  - `host_request_tx`: DMA requests to host memory.
//!  - `host_response_rx`: DMA completions from host memory.
//!
//! # Function
//!
//! ```text
//!  host_request_rx -> pio_route ---+--> pio_delay_i --> request_tx[i]
//!  response_rx[i] -> pio_check_i --+--> pio_arb --> host_response_tx
//!  request_rx[i] -> dma_record_i --+--> dma_arb --> host_request_tx
//!  host_response_rx -> dma_route --+--> dma_delay_i --> response_tx[i]
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use lanes_components::arbiter::Arbiter;
use lanes_components::arbiter::policy::RoundRobin;
use lanes_components::connect_port;
use lanes_components::delay::Delay;
use lanes_components::router::{Route, Router};
use lanes_engine::engine::Engine;
use lanes_engine::port::PortStateResult;
use lanes_engine::sim_error;
use lanes_engine::time::clock::Clock;
use lanes_engine::types::{SimError, SimResult};
use lanes_model_builder::{EntityDisplay, EntityGet, Runnable};
use lanes_track::entity::Entity;
use lanes_track::trace;

use crate::bdf::Bdf;
use crate::routing::RoutingTable;
use crate::tlp::Tlp;
use crate::{FabricPorts, protocol_violation};

pub const DEFAULT_LATENCY_TICKS: usize = 1;

#[derive(Clone, Debug)]
pub struct RootComplexConfig {
    pub num_downstream_ports: usize,
    pub latency_ticks: usize,

    /// Maps address windows to downstream port pairs.
    pub windows: RoutingTable,
}

type Outstanding = Rc<RefCell<HashMap<(Bdf, u16), usize>>>;

struct PioRoute {
    entity: Rc<Entity>,
    windows: RoutingTable,
    outstanding: Outstanding,
}

impl Route<Tlp> for PioRoute {
    fn route(&self, tlp: &Tlp) -> Result<usize, SimError> {
        if !tlp.kind().is_request() {
            return protocol_violation!(self.entity ; "{tlp} issued by the host as PIO");
        }
        let Some(pair) = self.windows.lookup(tlp.address()) else {
            return protocol_violation!(self.entity ; "PIO address outside every window in {tlp}");
        };
        if tlp.kind().is_non_posted() {
            let mut outstanding = self.outstanding.borrow_mut();
            if outstanding.contains_key(&tlp.transaction()) {
                return protocol_violation!(self.entity ; "{tlp} reuses an outstanding tag");
            }
            outstanding.insert(tlp.transaction(), pair);
        }
        trace!(self.entity ; "PIO {} -> pair {}", tlp, pair);
        Ok(pair)
    }
}

/// A completion arriving on a pair must match a PIO issued on that pair.
struct PioCompletionCheck {
    entity: Rc<Entity>,
    pair: usize,
    outstanding: Outstanding,
}

impl Route<Tlp> for PioCompletionCheck {
    fn route(&self, tlp: &Tlp) -> Result<usize, SimError> {
        if !tlp.kind().is_completion() {
            return protocol_violation!(self.entity ; "{tlp} on response path of pair {}", self.pair);
        }
        let mut outstanding = self.outstanding.borrow_mut();
        match outstanding.get(&tlp.transaction()) {
            Some(pair) if *pair == self.pair => {
                outstanding.remove(&tlp.transaction());
                Ok(0)
            }
            _ => protocol_violation!(self.entity ; "unmatched {tlp} on pair {}", self.pair),
        }
    }
}

struct DmaRecord {
    entity: Rc<Entity>,
    pair: usize,
    outstanding: Outstanding,
}

impl Route<Tlp> for DmaRecord {
    fn route(&self, tlp: &Tlp) -> Result<usize, SimError> {
        if !tlp.kind().is_request() {
            return protocol_violation!(self.entity ; "{tlp} on request path of pair {}", self.pair);
        }
        if tlp.kind().is_non_posted() {
            let mut outstanding = self.outstanding.borrow_mut();
            if outstanding.contains_key(&tlp.transaction()) {
                return protocol_violation!(self.entity ; "{tlp} reuses an outstanding tag");
            }
            outstanding.insert(tlp.transaction(), self.pair);
        }
        Ok(0)
    }
}

struct DmaCompletionRoute {
    entity: Rc<Entity>,
    outstanding: Outstanding,
}

impl Route<Tlp> for DmaCompletionRoute {
    fn route(&self, tlp: &Tlp) -> Result<usize, SimError> {
        if !tlp.kind().is_completion() {
            return protocol_violation!(self.entity ; "{tlp} returned by host memory");
        }
        match self.outstanding.borrow_mut().remove(&tlp.transaction()) {
            Some(pair) => Ok(pair),
            None => protocol_violation!(self.entity ; "unmatched DMA {tlp}"),
        }
    }
}

#[derive(EntityDisplay, EntityGet, Runnable)]
pub struct RootComplex {
    pub entity: Rc<Entity>,
    pio_route: Rc<Router<Tlp>>,
    pio_delays: Vec<Rc<Delay<Tlp>>>,
    pio_checks: Vec<Rc<Router<Tlp>>>,
    pio_arbiter: Rc<Arbiter<Tlp>>,
    dma_records: Vec<Rc<Router<Tlp>>>,
    dma_arbiter: Rc<Arbiter<Tlp>>,
    dma_route: Rc<Router<Tlp>>,
    dma_delays: Vec<Rc<Delay<Tlp>>>,
    outstanding_pio: Outstanding,
    outstanding_dma: Outstanding,
}

impl RootComplex {
    pub fn new_and_register(
        engine: &Engine,
        clock: &Clock,
        parent: &Rc<Entity>,
        name: &str,
        config: RootComplexConfig,
    ) -> Result<Rc<Self>, SimError> {
        let num_pairs = config.num_downstream_ports;
        if num_pairs == 0 {
            return sim_error!("root complex {name} has no downstream ports");
        }
        for (window, pair) in config.windows.entries() {
            if *pair >= num_pairs {
                return sim_error!("root complex {name}: {window} mapped to invalid pair {pair}");
            }
        }

        let entity = Rc::new(Entity::new(parent, name));
        let outstanding_pio: Outstanding = Rc::new(RefCell::new(HashMap::new()));
        let outstanding_dma: Outstanding = Rc::new(RefCell::new(HashMap::new()));

        // Host PIO down to the pairs
        let pio_route = Router::new_and_register(
            engine,
            &entity,
            "pio_route",
            num_pairs,
            Box::new(PioRoute {
                entity: entity.clone(),
                windows: config.windows,
                outstanding: outstanding_pio.clone(),
            }),
        )?;
        let mut pio_delays = Vec::with_capacity(num_pairs);
        for i in 0..num_pairs {
            let delay = Delay::new_and_register(
                engine,
                clock,
                &entity,
                &format!("pio_delay_{i}"),
                config.latency_ticks,
            )?;
            connect_port!(pio_route, tx, i => delay, rx)?;
            pio_delays.push(delay);
        }

        // PIO completions back to the host
        let pio_arbiter = Arbiter::new_and_register(
            engine,
            &entity,
            "pio_arb",
            num_pairs,
            Box::new(RoundRobin::new()),
        )?;
        let mut pio_checks = Vec::with_capacity(num_pairs);
        for pair in 0..num_pairs {
            let check = Router::new_and_register(
                engine,
                &entity,
                &format!("pio_check_{pair}"),
                1,
                Box::new(PioCompletionCheck {
                    entity: entity.clone(),
                    pair,
                    outstanding: outstanding_pio.clone(),
                }),
            )?;
            connect_port!(check, tx, 0 => pio_arbiter, rx, pair)?;
            pio_checks.push(check);
        }

        // Device DMA up to host memory
        let dma_arbiter = Arbiter::new_and_register(
            engine,
            &entity,
            "dma_arb",
            num_pairs,
            Box::new(RoundRobin::new()),
        )?;
        let mut dma_records = Vec::with_capacity(num_pairs);
        for pair in 0..num_pairs {
            let record = Router::new_and_register(
                engine,
                &entity,
                &format!("dma_record_{pair}"),
                1,
                Box::new(DmaRecord {
                    entity: entity.clone(),
                    pair,
                    outstanding: outstanding_dma.clone(),
                }),
            )?;
            connect_port!(record, tx, 0 => dma_arbiter, rx, pair)?;
            dma_records.push(record);
        }

        // DMA completions back to the issuing pair
        let dma_route = Router::new_and_register(
            engine,
            &entity,
            "dma_route",
            num_pairs,
            Box::new(DmaCompletionRoute {
                entity: entity.clone(),
                outstanding: outstanding_dma.clone(),
            }),
        )?;
        let mut dma_delays = Vec::with_capacity(num_pairs);
        for i in 0..num_pairs {
            let delay = Delay::new_and_register(
                engine,
                clock,
                &entity,
                &format!("dma_delay_{i}"),
                config.latency_ticks,
            )?;
            connect_port!(dma_route, tx, i => delay, rx)?;
            dma_delays.push(delay);
        }

        let rc_self = Rc::new(Self {
            entity,
            pio_route,
            pio_delays,
            pio_checks,
            pio_arbiter,
            dma_records,
            dma_arbiter,
            dma_route,
            dma_delays,
            outstanding_pio,
            outstanding_dma,
        });
        engine.register(rc_self.clone());
        Ok(rc_self)
    }

    pub fn port_host_request_rx(&self) -> PortStateResult<Tlp> {
        self.pio_route.port_rx()
    }

    pub fn connect_port_host_response_tx(&self, port_state: PortStateResult<Tlp>) -> SimResult {
        self.pio_arbiter.connect_port_tx(port_state)
    }

    pub fn connect_port_host_request_tx(&self, port_state: PortStateResult<Tlp>) -> SimResult {
        self.dma_arbiter.connect_port_tx(port_state)
    }

    pub fn port_host_response_rx(&self) -> PortStateResult<Tlp> {
        self.dma_route.port_rx()
    }

    #[must_use]
    pub fn num_outstanding_pio(&self) -> usize {
        self.outstanding_pio.borrow().len()
    }

    #[must_use]
    pub fn num_outstanding_dma(&self) -> usize {
        self.outstanding_dma.borrow().len()
    }
}

fn pair_item<T>(items: &[Rc<T>], i: usize) -> Result<&Rc<T>, SimError> {
    match items.get(i) {
        Some(item) => Ok(item),
        None => sim_error!("no root complex pair {i}"),
    }
}

impl FabricPorts for RootComplex {
    fn num_fabric_ports(&self) -> usize {
        self.pio_delays.len()
    }

    fn connect_port_request_tx_i(&self, i: usize, port_state: PortStateResult<Tlp>) -> SimResult {
        pair_item(&self.pio_delays, i)?.connect_port_tx(port_state)
    }

    fn port_request_rx_i(&self, i: usize) -> PortStateResult<Tlp> {
        pair_item(&self.dma_records, i)?.port_rx()
    }

    fn connect_port_response_tx_i(
        &self,
        i: usize,
        port_state: PortStateResult<Tlp>,
    ) -> SimResult {
        pair_item(&self.dma_delays, i)?.connect_port_tx(port_state)
    }

    fn port_response_rx_i(&self, i: usize) -> PortStateResult<Tlp> {
        pair_item(&self.pio_checks, i)?.port_rx()
    }
}
