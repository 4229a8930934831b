// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! A PCIe switch.
//!
//! Fabric port `0` is the upstream port and ports `1..=N` are the downstream
//! ports. Each ingress port has a request [Router] and a response [Router]
//! while each egress port merges traffic from every ingress with a round
//! robin [Arbiter] followed by a [Delay] for the forwarding latency.
//!
//! Requests are routed by address using the routing table. Non-posted
//! requests leave an entry in the outstanding table so that their
//! completion can be returned to the ingress port it came from.

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

pub const UPSTREAM_PORT: usize = 0;

pub const DEFAULT_LATENCY_TICKS: usize = 1;

#[derive(Clone, Debug)]
pub struct SwitchConfig {
    pub num_downstream_ports: usize,
    pub latency_ticks: usize,

    /// Maps address windows to downstream ports (`1..=N`).
    pub routing: RoutingTable,
}

type Outstanding = Rc<RefCell<HashMap<(Bdf, u16), usize>>>;

struct RequestRoute {
    entity: Rc<Entity>,
    ingress: usize,
    routing: Rc<RoutingTable>,
    outstanding: Outstanding,
}

impl Route<Tlp> for RequestRoute {
    fn route(&self, tlp: &Tlp) -> Result<usize, SimError> {
        if !tlp.kind().is_request() {
            return protocol_violation!(self.entity ; "{tlp} on request path of port {}", self.ingress);
        }

        let egress = match self.routing.lookup(tlp.address()) {
            Some(port) if port == self.ingress => {
                return protocol_violation!(self.entity ;
                    "{tlp} routes back to its ingress port {}", self.ingress);
            }
            Some(port) => port,
            None if self.ingress == UPSTREAM_PORT => {
                return protocol_violation!(self.entity ; "unroutable address in {tlp}");
            }
            None => UPSTREAM_PORT,
        };

        if tlp.kind().is_non_posted() {
            let mut outstanding = self.outstanding.borrow_mut();
            if outstanding.contains_key(&tlp.transaction()) {
                return protocol_violation!(self.entity ; "{tlp} reuses an outstanding tag");
            }
            outstanding.insert(tlp.transaction(), self.ingress);
        }
        trace!(self.entity ; "{} -> port {}", tlp, egress);
        Ok(egress)
    }
}

struct ResponseRoute {
    entity: Rc<Entity>,
    ingress: usize,
    outstanding: Outstanding,
}

impl Route<Tlp> for ResponseRoute {
    fn route(&self, tlp: &Tlp) -> Result<usize, SimError> {
        if !tlp.kind().is_completion() {
            return protocol_violation!(self.entity ; "{tlp} on response path of port {}", self.ingress);
        }
        match self.outstanding.borrow_mut().remove(&tlp.transaction()) {
            Some(egress) => Ok(egress),
            None => protocol_violation!(self.entity ; "unmatched {tlp} on port {}", self.ingress),
        }
    }
}

/// The routers, arbiters and delays for one traffic class.
struct Plane {
    routers: Vec<Rc<Router<Tlp>>>,
    arbiters: Vec<Rc<Arbiter<Tlp>>>,
    delays: Vec<Rc<Delay<Tlp>>>,
}

impl Plane {
    fn new_and_register(
        engine: &Engine,
        clock: &Clock,
        entity: &Rc<Entity>,
        name: &str,
        latency_ticks: usize,
        routes: Vec<Box<dyn Route<Tlp>>>,
    ) -> Result<Self, SimError> {
        let num_ports = routes.len();
        let mut routers = Vec::with_capacity(num_ports);
        for (i, route) in routes.into_iter().enumerate() {
            routers.push(Router::new_and_register(
                engine,
                entity,
                &format!("{name}_route_{i}"),
                num_ports,
                route,
            )?);
        }

        let mut arbiters = Vec::with_capacity(num_ports);
        let mut delays = Vec::with_capacity(num_ports);
        for i in 0..num_ports {
            let arbiter = Arbiter::new_and_register(
                engine,
                entity,
                &format!("{name}_arb_{i}"),
                num_ports,
                Box::new(RoundRobin::new()),
            )?;
            let delay = Delay::new_and_register(
                engine,
                clock,
                entity,
                &format!("{name}_delay_{i}"),
                latency_ticks,
            )?;
            connect_port!(arbiter, tx => delay, rx)?;
            arbiters.push(arbiter);
            delays.push(delay);
        }

        for (ingress, router) in routers.iter().enumerate() {
            for (egress, arbiter) in arbiters.iter().enumerate() {
                connect_port!(router, tx, egress => arbiter, rx, ingress)?;
            }
        }

        Ok(Self {
            routers,
            arbiters,
            delays,
        })
    }

    fn router(&self, i: usize) -> Result<&Rc<Router<Tlp>>, SimError> {
        match self.routers.get(i) {
            Some(router) => Ok(router),
            None => sim_error!("no switch port {i}"),
        }
    }

    fn delay(&self, i: usize) -> Result<&Rc<Delay<Tlp>>, SimError> {
        match self.delays.get(i) {
            Some(delay) => Ok(delay),
            None => sim_error!("no switch port {i}"),
        }
    }
}

#[derive(EntityDisplay, EntityGet, Runnable)]
pub struct Switch {
    pub entity: Rc<Entity>,
    requests: Plane,
    responses: Plane,
    outstanding: Outstanding,
}

impl Switch {
    pub fn new_and_register(
        engine: &Engine,
        clock: &Clock,
        parent: &Rc<Entity>,
        name: &str,
        config: SwitchConfig,
    ) -> Result<Rc<Self>, SimError> {
        if config.num_downstream_ports == 0 {
            return sim_error!("switch {name} has no downstream ports");
        }
        for (window, port) in config.routing.entries() {
            if *port == UPSTREAM_PORT || *port > config.num_downstream_ports {
                return sim_error!("switch {name}: {window} routed to invalid port {port}");
            }
        }

        let entity = Rc::new(Entity::new(parent, name));
        let num_ports = config.num_downstream_ports + 1;
        let routing = Rc::new(config.routing);
        let outstanding: Outstanding = Rc::new(RefCell::new(HashMap::new()));

        let request_routes = (0..num_ports)
            .map(|ingress| {
                Box::new(RequestRoute {
                    entity: entity.clone(),
                    ingress,
                    routing: routing.clone(),
                    outstanding: outstanding.clone(),
                }) as Box<dyn Route<Tlp>>
            })
            .collect();
        let requests = Plane::new_and_register(
            engine,
            clock,
            &entity,
            "request",
            config.latency_ticks,
            request_routes,
        )?;

        let response_routes = (0..num_ports)
            .map(|ingress| {
                Box::new(ResponseRoute {
                    entity: entity.clone(),
                    ingress,
                    outstanding: outstanding.clone(),
                }) as Box<dyn Route<Tlp>>
            })
            .collect();
        let responses = Plane::new_and_register(
            engine,
            clock,
            &entity,
            "response",
            config.latency_ticks,
            response_routes,
        )?;

        let rc_self = Rc::new(Self {
            entity,
            requests,
            responses,
            outstanding,
        });
        engine.register(rc_self.clone());
        Ok(rc_self)
    }

    /// Non-posted requests forwarded that have not yet completed.
    #[must_use]
    pub fn num_outstanding(&self) -> usize {
        self.outstanding.borrow().len()
    }

    #[must_use]
    pub fn num_downstream_ports(&self) -> usize {
        self.requests.arbiters.len() - 1
    }
}

impl FabricPorts for Switch {
    fn num_fabric_ports(&self) -> usize {
        self.requests.arbiters.len()
    }

    fn connect_port_request_tx_i(&self, i: usize, port_state: PortStateResult<Tlp>) -> SimResult {
        self.requests.delay(i)?.connect_port_tx(port_state)
    }

    fn port_request_rx_i(&self, i: usize) -> PortStateResult<Tlp> {
        self.requests.router(i)?.port_rx()
    }

    fn connect_port_response_tx_i(
        &self,
        i: usize,
        port_state: PortStateResult<Tlp>,
    ) -> SimResult {
        self.responses.delay(i)?.connect_port_tx(port_state)
    }

    fn port_response_rx_i(&self, i: usize) -> PortStateResult<Tlp> {
        self.responses.router(i)?.port_rx()
    }
}
