// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Build PCIe/CXL fabrics from topology files.
//!
//! A topology is parsed into a [`TopologyConfig`], checked as a whole by
//! [`validate`](crate::validate::validate) and only then turned into
//! simulation components. A topology with any problem creates nothing and
//! reports every problem found.

use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;
use std::rc::Rc;

use lanes_engine::engine::Engine;
use lanes_engine::sim_error;
use lanes_engine::time::clock::Clock;
use lanes_engine::types::{SimError, SimResult};
use lanes_model_builder::EntityGet;
use lanes_models::endpoint::Endpoint;
use lanes_models::host::Host;
use lanes_models::link::Link;
use lanes_models::root_complex::RootComplex;
use lanes_models::switch::Switch;
use lanes_track::entity::{Entity, GetEntity};
use lanes_track::info;

use crate::builder::{
    Nodes, attach_links, build_endpoints, build_host, build_links, build_root_complex,
    build_switches, connect_host,
};
use crate::error::{TopologyError, TopologyErrors};
use crate::types::TopologyConfig;
use crate::validate::validate;

pub mod builder;
pub mod error;
pub mod types;
pub mod validate;

type Switches = Vec<Rc<Switch>>;
type Endpoints = Vec<Rc<Endpoint>>;
type Links = Vec<Rc<Link>>;

/// Parse a topology without checking it.
pub fn parse_topology(s: &str) -> Result<TopologyConfig, TopologyErrors> {
    serde_yaml::from_str(s).map_err(|e| TopologyError::Parse(e.to_string()).into())
}

pub fn read_topology(path: &Path) -> Result<TopologyConfig, TopologyErrors> {
    let s = std::fs::read_to_string(path).map_err(|e| TopologyError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_topology(&s)
}

#[derive(EntityGet)]
pub struct Fabric {
    entity: Rc<Entity>,
    clock: Clock,
    host: Rc<Host>,
    root_complex: Rc<RootComplex>,
    switches: Switches,
    switches_idx_by_name: HashMap<String, usize>,
    endpoints: Endpoints,
    endpoints_idx_by_name: HashMap<String, usize>,
    links: Links,
    links_idx_by_name: HashMap<String, usize>,
}

fn index_by_name<T: GetEntity>(items: &[Rc<T>]) -> HashMap<String, usize> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| (item.entity().name.clone(), i))
        .collect()
}

impl Fabric {
    pub fn from_file(engine: &mut Engine, topology_path: &Path) -> Result<Self, TopologyErrors> {
        let cfg = read_topology(topology_path)?;
        Fabric::build(engine, &cfg)
    }

    pub fn from_string(engine: &mut Engine, topology: &str) -> Result<Self, TopologyErrors> {
        let cfg = parse_topology(topology)?;
        Fabric::build(engine, &cfg)
    }

    /// Validate `cfg` and, if it is valid, create and connect every
    /// component.
    pub fn build(engine: &mut Engine, cfg: &TopologyConfig) -> Result<Self, TopologyErrors> {
        let plan = validate(cfg)?;

        let clock = engine.clock_mhz(plan.clock_mhz);
        let top = engine.top().clone();
        let entity = Rc::new(Entity::new(&top, "fabric"));

        let host = build_host(engine, &clock, &top, &plan)?;
        let root_complex = build_root_complex(engine, &clock, &top, &plan)?;
        let switches = build_switches(engine, &clock, &top, &plan)?;
        let endpoints = build_endpoints(engine, &clock, &top, &plan)?;
        let links = build_links(engine, &clock, &top, &plan)?;

        connect_host(&host, &root_complex)?;
        let nodes = Nodes {
            root_complex: &root_complex,
            switches: &switches,
            endpoints: &endpoints,
        };
        attach_links(&plan, &links, &nodes)?;

        info!(entity ; "{} switches, {} endpoints, {} links at {} MHz",
            switches.len(), endpoints.len(), links.len(), plan.clock_mhz);

        Ok(Fabric {
            entity,
            clock,
            switches_idx_by_name: index_by_name(&switches),
            endpoints_idx_by_name: index_by_name(&endpoints),
            links_idx_by_name: index_by_name(&links),
            host,
            root_complex,
            switches,
            endpoints,
            links,
        })
    }

    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    #[must_use]
    pub fn host(&self) -> &Rc<Host> {
        &self.host
    }

    #[must_use]
    pub fn root_complex(&self) -> &Rc<RootComplex> {
        &self.root_complex
    }

    #[must_use]
    pub fn switches(&self) -> &[Rc<Switch>] {
        &self.switches
    }

    #[must_use]
    pub fn endpoints(&self) -> &[Rc<Endpoint>] {
        &self.endpoints
    }

    #[must_use]
    pub fn links(&self) -> &[Rc<Link>] {
        &self.links
    }

    pub fn switch(&self, name: &str) -> Result<&Rc<Switch>, SimError> {
        match self.switches_idx_by_name.get(name) {
            Some(idx) => Ok(&self.switches[*idx]),
            None => sim_error!("No Switch '{name}'"),
        }
    }

    pub fn endpoint(&self, name: &str) -> Result<&Rc<Endpoint>, SimError> {
        match self.endpoints_idx_by_name.get(name) {
            Some(idx) => Ok(&self.endpoints[*idx]),
            None => sim_error!("No Endpoint '{name}'"),
        }
    }

    pub fn link(&self, name: &str) -> Result<&Rc<Link>, SimError> {
        match self.links_idx_by_name.get(name) {
            Some(idx) => Ok(&self.links[*idx]),
            None => sim_error!("No Link '{name}'"),
        }
    }

    /// Non-posted transactions that have been issued but not completed,
    /// counted at every component that tracks them.
    #[must_use]
    pub fn num_outstanding(&self) -> usize {
        self.host.num_outstanding_pio()
            + self.root_complex.num_outstanding_pio()
            + self.root_complex.num_outstanding_dma()
            + self.switches.iter().map(|s| s.num_outstanding()).sum::<usize>()
            + self.endpoints.iter().map(|e| e.num_dma_outstanding()).sum::<usize>()
    }

    /// Returns an error if the simulation stopped with transactions still in
    /// flight.
    pub fn check_complete(&self) -> SimResult {
        let outstanding = self.num_outstanding();
        if outstanding > 0 {
            return sim_error!("{}: deadlock with {outstanding} transactions outstanding", self.entity);
        }
        Ok(())
    }
}

impl Display for Fabric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Root complex: {}", self.root_complex.entity())?;

        writeln!(f, "\nSwitches:")?;
        for (i, switch) in self.switches.iter().enumerate() {
            writeln!(f, "  {i}: {} ({} downstream ports)", switch.entity(), switch.num_downstream_ports())?;
        }

        writeln!(f, "\nEndpoints:")?;
        for (i, endpoint) in self.endpoints.iter().enumerate() {
            let config = endpoint.config();
            writeln!(f, "  {i}: {} {} BAR {}", endpoint.entity(), config.bdf, config.bar)?;
        }

        writeln!(f, "\nLinks:")?;
        for (i, link) in self.links.iter().enumerate() {
            let config = link.config();
            writeln!(f, "  {i}: {} x{} {}", link.entity(), config.lanes, config.speed)?;
        }

        Ok(())
    }
}
