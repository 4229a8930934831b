// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::rc::Rc;

use lanes_components::connect_port;
use lanes_engine::engine::Engine;
use lanes_engine::time::clock::Clock;
use lanes_engine::types::{SimError, SimResult};
use lanes_models::FabricPorts;
use lanes_models::endpoint::Endpoint;
use lanes_models::host::Host;
use lanes_models::link::Link;
use lanes_models::root_complex::RootComplex;
use lanes_models::switch::Switch;
use lanes_track::debug;
use lanes_track::entity::Entity;

use crate::validate::{Node, Plan};
use crate::{Endpoints, Links, Switches};

pub fn build_host(
    engine: &Engine,
    clock: &Clock,
    parent: &Rc<Entity>,
    plan: &Plan,
) -> Result<Rc<Host>, SimError> {
    Host::new_and_register(engine, clock, parent, "host", plan.host.clone())
}

pub fn build_root_complex(
    engine: &Engine,
    clock: &Clock,
    parent: &Rc<Entity>,
    plan: &Plan,
) -> Result<Rc<RootComplex>, SimError> {
    let (name, config) = &plan.root_complex;
    let root_complex = RootComplex::new_and_register(engine, clock, parent, name, config.clone())?;
    for (window, pair) in config.windows.entries() {
        debug!(root_complex.entity ; "{} -> pair {}", window, pair);
    }
    Ok(root_complex)
}

pub fn build_switches(
    engine: &Engine,
    clock: &Clock,
    parent: &Rc<Entity>,
    plan: &Plan,
) -> Result<Switches, SimError> {
    let mut switches = Vec::with_capacity(plan.switches.len());
    for (name, config) in &plan.switches {
        let switch = Switch::new_and_register(engine, clock, parent, name, config.clone())?;
        for (window, port) in config.routing.entries() {
            debug!(switch.entity ; "{} -> port {}", window, port);
        }
        switches.push(switch);
    }
    Ok(switches)
}

pub fn build_endpoints(
    engine: &Engine,
    clock: &Clock,
    parent: &Rc<Entity>,
    plan: &Plan,
) -> Result<Endpoints, SimError> {
    let mut endpoints = Vec::with_capacity(plan.endpoints.len());
    for (name, config) in &plan.endpoints {
        endpoints.push(Endpoint::new_and_register(
            engine,
            clock,
            parent,
            name,
            config.clone(),
        )?);
    }
    Ok(endpoints)
}

pub fn build_links(
    engine: &Engine,
    clock: &Clock,
    parent: &Rc<Entity>,
    plan: &Plan,
) -> Result<Links, SimError> {
    let mut links = Vec::with_capacity(plan.links.len());
    for link_plan in &plan.links {
        links.push(Link::new_and_register(
            engine,
            clock,
            parent,
            &link_plan.name,
            link_plan.config.clone(),
        )?);
    }
    Ok(links)
}

/// The components a plan refers to by [`Node`].
pub struct Nodes<'a> {
    pub root_complex: &'a Rc<RootComplex>,
    pub switches: &'a Switches,
    pub endpoints: &'a Endpoints,
}

impl Nodes<'_> {
    fn get(&self, node: Node) -> Result<&dyn FabricPorts, SimError> {
        let ports: Option<&dyn FabricPorts> = match node {
            Node::RootComplex => Some(self.root_complex.as_ref()),
            Node::Switch(i) => self.switches.get(i).map(|s| s.as_ref() as &dyn FabricPorts),
            Node::Endpoint(i) => self.endpoints.get(i).map(|e| e.as_ref() as &dyn FabricPorts),
        };
        ports.ok_or_else(|| SimError(format!("no component for {node:?}")))
    }
}

pub fn attach_links(plan: &Plan, links: &Links, nodes: &Nodes) -> SimResult {
    for (link_plan, link) in plan.links.iter().zip(links) {
        link.attach(
            nodes.get(link_plan.upstream.node)?,
            link_plan.upstream.fabric_port(),
            nodes.get(link_plan.downstream.node)?,
            link_plan.downstream.fabric_port(),
        )?;
    }
    Ok(())
}

pub fn connect_host(host: &Rc<Host>, root_complex: &Rc<RootComplex>) -> SimResult {
    connect_port!(host, pio_tx => root_complex, host_request_rx)?;
    connect_port!(root_complex, host_response_tx => host, pio_rx)?;
    connect_port!(root_complex, host_request_tx => host, dma_rx)?;
    connect_port!(host, dma_tx => root_complex, host_response_rx)
}
