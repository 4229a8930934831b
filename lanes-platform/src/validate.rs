// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Check a topology and work out everything needed to build it.
//!
//! [`validate`] either returns a [`Plan`] holding the configuration of every
//! component, with routing tables derived from the endpoint BARs, or the
//! full set of problems found. Nothing is constructed here.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::LazyLock;

use lanes_models::bdf::Bdf;
use lanes_models::endpoint::{self, DmaOp, EndpointConfig, MAX_INTERRUPT_PIN, NUM_TAGS};
use lanes_models::host::{HostConfig, PioOp};
use lanes_models::link::{self, Generation, LinkConfig};
use lanes_models::root_complex::{self, RootComplexConfig};
use lanes_models::routing::{AddressWindow, RoutingTable};
use lanes_models::switch::{self, SwitchConfig};
use regex::Regex;

use crate::error::{TopologyError, TopologyErrors};
use crate::types::{OpKind, OpSection, TopologyConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Node {
    RootComplex,
    Switch(usize),
    Endpoint(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PortName {
    Upstream,
    Downstream(usize),
}

impl fmt::Display for PortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortName::Upstream => write!(f, "upstream"),
            PortName::Downstream(i) => write!(f, "downstream{i}"),
        }
    }
}

/// One end of a link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Binding {
    pub node: Node,
    pub port: PortName,
}

impl Binding {
    /// The index of the bound port in the component's fabric ports.
    #[must_use]
    pub fn fabric_port(&self) -> usize {
        match (self.node, self.port) {
            (_, PortName::Upstream) => 0,
            (Node::Switch(_), PortName::Downstream(i)) => i + 1,
            (_, PortName::Downstream(i)) => i,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LinkPlan {
    pub name: String,
    pub config: LinkConfig,
    pub upstream: Binding,
    pub downstream: Binding,
}

/// A validated topology.
#[derive(Clone, Debug)]
pub struct Plan {
    pub clock_mhz: f64,
    pub host: HostConfig,
    pub root_complex: (String, RootComplexConfig),
    pub switches: Vec<(String, SwitchConfig)>,
    pub endpoints: Vec<(String, EndpointConfig)>,
    pub links: Vec<LinkPlan>,
}

pub fn validate(cfg: &TopologyConfig) -> Result<Plan, TopologyErrors> {
    let mut errors = TopologyErrors::default();

    if !(cfg.clock_mhz > 0.0) {
        errors.push(TopologyError::InvalidParameter {
            owner: "topology".to_string(),
            reason: format!("clock frequency {} MHz", cfg.clock_mhz),
        });
    }

    check_names(cfg, &mut errors);
    let links = check_links(cfg, &mut errors);
    check_dangling_ports(cfg, &links, &mut errors);
    let endpoints = check_endpoints(cfg, &mut errors);
    let host = check_host(cfg, &mut errors);
    check_reachable(cfg, &links, &mut errors);
    check_payloads(cfg, &links, &mut errors);

    if !errors.is_empty() {
        return Err(errors);
    }

    let routes = Routes::new(&links, &endpoints);
    let rc_windows = routes.table(Node::RootComplex)?;
    let root_complex = RootComplexConfig {
        num_downstream_ports: cfg.root_complex.num_downstream_ports,
        latency_ticks: cfg
            .root_complex
            .latency_ticks
            .unwrap_or(root_complex::DEFAULT_LATENCY_TICKS),
        windows: rc_windows,
    };

    let mut switches = Vec::with_capacity(cfg.switches.len());
    for (i, section) in cfg.switches.iter().enumerate() {
        let config = SwitchConfig {
            num_downstream_ports: section.num_downstream_ports,
            latency_ticks: section.latency_ticks.unwrap_or(switch::DEFAULT_LATENCY_TICKS),
            routing: routes.table(Node::Switch(i))?,
        };
        switches.push((section.name.clone(), config));
    }

    Ok(Plan {
        clock_mhz: cfg.clock_mhz,
        host,
        root_complex: (cfg.root_complex.name.clone(), root_complex),
        switches,
        endpoints: cfg
            .endpoints
            .iter()
            .map(|e| e.name.clone())
            .zip(endpoints)
            .collect(),
        links,
    })
}

fn check_names(cfg: &TopologyConfig, errors: &mut TopologyErrors) {
    let groups: [(&'static str, Vec<&String>); 3] = [
        ("switch", cfg.switches.iter().map(|s| &s.name).collect()),
        ("endpoint", cfg.endpoints.iter().map(|e| &e.name).collect()),
        ("link", cfg.links.iter().map(|l| &l.name).collect()),
    ];
    for (kind, names) in groups {
        let mut seen = HashSet::new();
        for name in names {
            if !seen.insert(name) {
                errors.push(TopologyError::DuplicateName {
                    kind,
                    name: name.clone(),
                });
            }
        }
    }

    if cfg.root_complex.num_downstream_ports == 0 {
        errors.push(TopologyError::NoDownstreamPorts {
            component: format!("root_complex.{}", cfg.root_complex.name),
        });
    }
    for section in &cfg.switches {
        if section.num_downstream_ports == 0 {
            errors.push(TopologyError::NoDownstreamPorts {
                component: format!("switch.{}", section.name),
            });
        }
    }
}

fn node_name(cfg: &TopologyConfig, node: Node) -> String {
    match node {
        Node::RootComplex => format!("root_complex.{}", cfg.root_complex.name),
        Node::Switch(i) => format!("switch.{}", cfg.switches[i].name),
        Node::Endpoint(i) => format!("endpoint.{}", cfg.endpoints[i].name),
    }
}

fn binding_name(cfg: &TopologyConfig, binding: &Binding) -> String {
    format!("{}.{}", node_name(cfg, binding.node), binding.port)
}

/// Parse a binding of the form `kind.name.port`.
fn parse_binding(
    cfg: &TopologyConfig,
    link: &str,
    s: &str,
    upstream_end: bool,
) -> Result<Binding, TopologyError> {
    static BINDING_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^(root_complex|switch|endpoint)\.([A-Za-z0-9_\-]+)\.(upstream|downstream(\d+))$")
            .unwrap()
    });

    let invalid = || TopologyError::InvalidBinding {
        link: link.to_string(),
        binding: s.to_string(),
    };
    let Some(caps) = BINDING_RE.captures(s) else {
        return Err(invalid());
    };

    let name = &caps[2];
    let (node, num_downstream_ports) = match &caps[1] {
        "root_complex" if cfg.root_complex.name == name => {
            (Node::RootComplex, cfg.root_complex.num_downstream_ports)
        }
        "switch" => match cfg.switches.iter().position(|sw| sw.name == name) {
            Some(i) => (Node::Switch(i), cfg.switches[i].num_downstream_ports),
            None => return Err(unknown(link, s)),
        },
        "endpoint" => match cfg.endpoints.iter().position(|ep| ep.name == name) {
            Some(i) => (Node::Endpoint(i), 0),
            None => return Err(unknown(link, s)),
        },
        _ => return Err(unknown(link, s)),
    };

    let port = match caps.get(4) {
        Some(index) => PortName::Downstream(index.as_str().parse().map_err(|_| invalid())?),
        None => PortName::Upstream,
    };

    let bad_port = |reason: String| TopologyError::InvalidPort {
        link: link.to_string(),
        binding: s.to_string(),
        reason,
    };
    match port {
        PortName::Downstream(i) if i >= num_downstream_ports => {
            return Err(bad_port(format!(
                "{} downstream ports available",
                num_downstream_ports
            )));
        }
        PortName::Downstream(_) if !upstream_end => {
            return Err(bad_port(
                "the downstream end of a link must use an upstream port".to_string(),
            ));
        }
        PortName::Upstream if node == Node::RootComplex => {
            return Err(bad_port("the root complex has no upstream port".to_string()));
        }
        PortName::Upstream if upstream_end => {
            return Err(bad_port(
                "the upstream end of a link must use a downstream port".to_string(),
            ));
        }
        _ => {}
    }

    Ok(Binding { node, port })
}

fn unknown(link: &str, binding: &str) -> TopologyError {
    TopologyError::UnknownComponent {
        link: link.to_string(),
        binding: binding.to_string(),
    }
}

fn link_config(section: &crate::types::LinkSection) -> Result<LinkConfig, Vec<String>> {
    let speed = match section.speed {
        Some(number) => match Generation::try_from(number) {
            Ok(speed) => speed,
            Err(e) => return Err(vec![e.0]),
        },
        None => Generation::Gen1,
    };
    let max_payload_bytes = match section.max_payload_bytes {
        Some(bytes) => match usize::try_from(bytes) {
            Ok(bytes) => bytes,
            Err(_) => return Err(vec![format!("max payload {bytes} bytes too large")]),
        },
        None => link::DEFAULT_MAX_PAYLOAD_BYTES,
    };
    let config = LinkConfig::new(
        section.lanes.unwrap_or(link::DEFAULT_LANES),
        speed,
        max_payload_bytes,
        section.max_queue_size.unwrap_or(link::DEFAULT_MAX_QUEUE_SIZE),
    );
    let problems = config.problems();
    if problems.is_empty() {
        Ok(config)
    } else {
        Err(problems)
    }
}

fn check_links(cfg: &TopologyConfig, errors: &mut TopologyErrors) -> Vec<LinkPlan> {
    let mut plans = Vec::new();
    let mut bound: HashMap<Binding, String> = HashMap::new();

    for section in &cfg.links {
        let config = match link_config(section) {
            Ok(config) => Some(config),
            Err(problems) => {
                for problem in problems {
                    errors.push(TopologyError::InvalidLink {
                        link: section.name.clone(),
                        problem,
                    });
                }
                None
            }
        };

        let upstream = parse_binding(cfg, &section.name, &section.upstream, true);
        let downstream = parse_binding(cfg, &section.name, &section.downstream, false);
        let (upstream, downstream) = match (upstream, downstream) {
            (Ok(up), Ok(down)) => (up, down),
            (up, down) => {
                for result in [up, down] {
                    if let Err(e) = result {
                        errors.push(e);
                    }
                }
                continue;
            }
        };

        if upstream.node == downstream.node {
            errors.push(TopologyError::SelfLoop {
                link: section.name.clone(),
                component: node_name(cfg, upstream.node),
            });
            continue;
        }

        let mut clash = false;
        for binding in [upstream, downstream] {
            match bound.get(&binding) {
                Some(first) => {
                    errors.push(TopologyError::PortBoundTwice {
                        binding: binding_name(cfg, &binding),
                        first: first.clone(),
                        second: section.name.clone(),
                    });
                    clash = true;
                }
                None => {
                    bound.insert(binding, section.name.clone());
                }
            }
        }

        if let Some(config) = config {
            if !clash {
                plans.push(LinkPlan {
                    name: section.name.clone(),
                    config,
                    upstream,
                    downstream,
                });
            }
        }
    }
    plans
}

fn check_dangling_ports(cfg: &TopologyConfig, links: &[LinkPlan], errors: &mut TopologyErrors) {
    let bound: HashSet<Binding> = links
        .iter()
        .flat_map(|link| [link.upstream, link.downstream])
        .collect();

    let mut ports = Vec::new();
    for i in 0..cfg.root_complex.num_downstream_ports {
        ports.push(Binding {
            node: Node::RootComplex,
            port: PortName::Downstream(i),
        });
    }
    for (s, section) in cfg.switches.iter().enumerate() {
        ports.push(Binding {
            node: Node::Switch(s),
            port: PortName::Upstream,
        });
        for i in 0..section.num_downstream_ports {
            ports.push(Binding {
                node: Node::Switch(s),
                port: PortName::Downstream(i),
            });
        }
    }
    for e in 0..cfg.endpoints.len() {
        ports.push(Binding {
            node: Node::Endpoint(e),
            port: PortName::Upstream,
        });
    }

    // Ports mentioned by links that failed validation are already reported
    let mentioned: HashSet<Binding> = cfg
        .links
        .iter()
        .flat_map(|l| {
            [
                parse_binding(cfg, &l.name, &l.upstream, true),
                parse_binding(cfg, &l.name, &l.downstream, false),
            ]
        })
        .filter_map(Result::ok)
        .collect();

    for port in ports {
        if !bound.contains(&port) && !mentioned.contains(&port) {
            errors.push(TopologyError::DanglingPort {
                binding: binding_name(cfg, &port),
            });
        }
    }
}

enum ProgramOp {
    Read { address: u64, size: usize },
    Write { address: u64, data: Vec<u8> },
}

fn program_op(owner: &str, index: usize, op: &OpSection) -> Result<ProgramOp, TopologyError> {
    let invalid = |reason: &str| TopologyError::InvalidParameter {
        owner: owner.to_string(),
        reason: format!("program entry {index}: {reason}"),
    };
    let address = op.address;
    if op.payload_bytes() > 0 && address.checked_add(op.payload_bytes() - 1).is_none() {
        return Err(invalid("access runs past the end of the address space"));
    }
    match (op.kind, op.size, &op.data) {
        (OpKind::Read, Some(size), None) => match usize::try_from(size) {
            Ok(size) if size > 0 => Ok(ProgramOp::Read { address, size }),
            _ => Err(invalid("read size must be positive")),
        },
        (OpKind::Read, _, _) => Err(invalid("a read needs a size and no data")),
        (OpKind::Write, size, Some(data)) => {
            if data.is_empty() {
                return Err(invalid("a write needs data"));
            }
            match size {
                Some(size) if size != data.len() as u64 => {
                    Err(invalid("write size does not match its data"))
                }
                _ => Ok(ProgramOp::Write {
                    address,
                    data: data.clone(),
                }),
            }
        }
        (OpKind::Write, _, None) => Err(invalid("a write needs data")),
    }
}

fn check_endpoints(cfg: &TopologyConfig, errors: &mut TopologyErrors) -> Vec<EndpointConfig> {
    let mut configs = Vec::with_capacity(cfg.endpoints.len());
    let mut bdfs: HashMap<Bdf, &String> = HashMap::new();
    let mut windows: Vec<(AddressWindow, &String)> = Vec::new();

    for section in &cfg.endpoints {
        let owner = format!("endpoint {}", section.name);
        let bdf = match (
            u8::try_from(section.pci_bus),
            u8::try_from(section.pci_dev),
            u8::try_from(section.pci_func),
        ) {
            (Ok(bus), Ok(device), Ok(function)) => Bdf::new(bus, device, function),
            _ => None,
        };
        let bdf = match bdf {
            Some(bdf) => {
                if bdf == Bdf::HOST {
                    errors.push(TopologyError::ReservedBdf {
                        endpoint: section.name.clone(),
                        bdf: bdf.to_string(),
                    });
                } else if let Some(first) = bdfs.get(&bdf) {
                    errors.push(TopologyError::DuplicateBdf {
                        bdf: bdf.to_string(),
                        first: (*first).clone(),
                        second: section.name.clone(),
                    });
                } else {
                    bdfs.insert(bdf, &section.name);
                }
                bdf
            }
            None => {
                errors.push(TopologyError::InvalidBdf {
                    endpoint: section.name.clone(),
                    bus: section.pci_bus,
                    device: section.pci_dev,
                    function: section.pci_func,
                });
                Bdf::HOST
            }
        };

        let interrupt_pin = section.interrupt_pin.unwrap_or(0);
        if interrupt_pin > MAX_INTERRUPT_PIN {
            errors.push(TopologyError::InvalidInterruptPin {
                endpoint: section.name.clone(),
                pin: interrupt_pin,
            });
        }

        let bar = match AddressWindow::new(section.bar_address, section.bar_size) {
            Ok(bar) => {
                for (other, name) in &windows {
                    if other.overlaps(&bar) {
                        errors.push(TopologyError::OverlappingWindows {
                            first: (*name).clone(),
                            second: section.name.clone(),
                        });
                    }
                }
                windows.push((bar, &section.name));
                Some(bar)
            }
            Err(e) => {
                errors.push(TopologyError::InvalidWindow {
                    endpoint: section.name.clone(),
                    reason: e.0,
                });
                None
            }
        };

        let max_outstanding_dma = section
            .max_outstanding_dma
            .unwrap_or(endpoint::DEFAULT_MAX_OUTSTANDING_DMA);
        if max_outstanding_dma == 0 || max_outstanding_dma > NUM_TAGS {
            errors.push(TopologyError::InvalidParameter {
                owner: owner.clone(),
                reason: format!("max outstanding DMA {max_outstanding_dma} not in 1..={NUM_TAGS}"),
            });
        }

        let mut dma = Vec::with_capacity(section.dma.len());
        for (index, op) in section.dma.iter().enumerate() {
            match program_op(&owner, index, op) {
                Ok(ProgramOp::Read { address, size }) => dma.push(DmaOp::Read { address, size }),
                Ok(ProgramOp::Write { address, data }) => dma.push(DmaOp::Write { address, data }),
                Err(e) => errors.push(e),
            }
        }

        if let Some(bar) = bar {
            let mut config = EndpointConfig::new(bdf, bar);
            config.interrupt_line = section.interrupt_line.unwrap_or(0);
            config.interrupt_pin = interrupt_pin;
            config.latency_ticks = section
                .latency_ticks
                .unwrap_or(endpoint::DEFAULT_LATENCY_TICKS);
            config.max_outstanding_dma = max_outstanding_dma;
            config.dma = dma;
            configs.push(config);
        }
    }
    configs
}

fn check_host(cfg: &TopologyConfig, errors: &mut TopologyErrors) -> HostConfig {
    let section = &cfg.host;
    let mut config = HostConfig::default();
    if let Some(ticks) = section.memory_latency_ticks {
        config.memory_latency_ticks = ticks;
    }
    if let Some(max) = section.max_outstanding_pio {
        if max == 0 || max > NUM_TAGS {
            errors.push(TopologyError::InvalidParameter {
                owner: "host".to_string(),
                reason: format!("max outstanding PIO {max} not in 1..={NUM_TAGS}"),
            });
        }
        config.max_outstanding_pio = max;
    }
    for (index, op) in section.pio.iter().enumerate() {
        match program_op("host", index, op) {
            Ok(ProgramOp::Read { address, size }) => config.pio.push(PioOp::Read { address, size }),
            Ok(ProgramOp::Write { address, data }) => {
                config.pio.push(PioOp::Write { address, data });
            }
            Err(e) => errors.push(e),
        }
    }
    config
}

fn check_reachable(cfg: &TopologyConfig, links: &[LinkPlan], errors: &mut TopologyErrors) {
    let mut children: HashMap<Node, Vec<Node>> = HashMap::new();
    for link in links {
        children
            .entry(link.upstream.node)
            .or_default()
            .push(link.downstream.node);
    }

    let mut reached = HashSet::new();
    let mut stack = vec![Node::RootComplex];
    while let Some(node) = stack.pop() {
        if reached.insert(node) {
            if let Some(below) = children.get(&node) {
                stack.extend(below.iter().copied());
            }
        }
    }

    let nodes = (0..cfg.switches.len())
        .map(Node::Switch)
        .chain((0..cfg.endpoints.len()).map(Node::Endpoint));
    for node in nodes {
        if !reached.contains(&node) {
            errors.push(TopologyError::Unreachable {
                component: node_name(cfg, node),
            });
        }
    }
}

/// The links between a node and the root complex, nearest first, with the
/// node above each one.
fn path_up(links: &[LinkPlan], node: Node) -> Vec<(usize, Node)> {
    let mut path = Vec::new();
    let mut current = node;
    while current != Node::RootComplex {
        let above = links
            .iter()
            .enumerate()
            .find(|(_, l)| l.downstream.node == current);
        let Some((index, link)) = above else {
            break;
        };
        if path.iter().any(|(_, n)| *n == link.upstream.node) {
            break;
        }
        path.push((index, link.upstream.node));
        current = link.upstream.node;
    }
    path
}

/// Every program entry must fit the max payload of each link it crosses.
///
/// Host PIO crosses the path to the endpoint owning the address. Endpoint
/// DMA crosses the path to the root complex, unless it targets the BAR of an
/// endpoint below a shared switch, where it turns back down at that switch.
fn check_payloads(cfg: &TopologyConfig, links: &[LinkPlan], errors: &mut TopologyErrors) {
    let owner_of = |address: u64| {
        cfg.endpoints.iter().position(|e| {
            address >= e.bar_address && address - e.bar_address < e.bar_size
        })
    };
    let paths: Vec<_> = (0..cfg.endpoints.len())
        .map(|i| path_up(links, Node::Endpoint(i)))
        .collect();

    let mut check = |owner: &str, index: usize, op: &OpSection, crossed: &[(usize, Node)]| {
        let bytes = op.payload_bytes();
        let narrowest = crossed
            .iter()
            .map(|(l, _)| &links[*l])
            .min_by_key(|l| l.config.max_payload_bytes);
        if let Some(link) = narrowest {
            if bytes > link.config.max_payload_bytes as u64 {
                errors.push(TopologyError::PayloadTooLarge {
                    owner: owner.to_string(),
                    index,
                    bytes,
                    link: link.name.clone(),
                    max_payload: link.config.max_payload_bytes,
                });
            }
        }
    };

    for (index, op) in cfg.host.pio.iter().enumerate() {
        if let Some(target) = owner_of(op.address) {
            check("host", index, op, &paths[target]);
        }
    }

    for (source, section) in cfg.endpoints.iter().enumerate() {
        let owner = format!("endpoint {}", section.name);
        for (index, op) in section.dma.iter().enumerate() {
            let up = &paths[source];
            let peer = owner_of(op.address).filter(|t| *t != source);
            let turn = peer.and_then(|target| {
                up.iter().enumerate().find_map(|(i, (_, node))| {
                    let shared = matches!(node, Node::Switch(_))
                        && paths[target].iter().any(|(_, n)| n == node);
                    shared.then_some((i, target, *node))
                })
            });
            match turn {
                Some((i, target, switch)) => {
                    let mut crossed = up[..=i].to_vec();
                    for step in &paths[target] {
                        crossed.push(*step);
                        if step.1 == switch {
                            break;
                        }
                    }
                    check(&owner, index, op, &crossed);
                }
                None => check(&owner, index, op, up),
            }
        }
    }
}

/// Routing derived from the tree of links below the root complex.
struct Routes<'a> {
    children: HashMap<Node, Vec<(Binding, Node)>>,
    endpoints: &'a [EndpointConfig],
}

impl<'a> Routes<'a> {
    fn new(links: &[LinkPlan], endpoints: &'a [EndpointConfig]) -> Self {
        let mut children: HashMap<Node, Vec<(Binding, Node)>> = HashMap::new();
        for link in links {
            children
                .entry(link.upstream.node)
                .or_default()
                .push((link.upstream, link.downstream.node));
        }
        Self {
            children,
            endpoints,
        }
    }

    /// Every BAR at or below `node`.
    fn windows_below(&self, node: Node) -> Vec<AddressWindow> {
        match node {
            Node::Endpoint(i) => vec![self.endpoints[i].bar],
            _ => self
                .children
                .get(&node)
                .map(|below| {
                    below
                        .iter()
                        .flat_map(|(_, child)| self.windows_below(*child))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Map the windows below each downstream port of `node` to that port.
    fn table(&self, node: Node) -> Result<RoutingTable, TopologyError> {
        let mut table = RoutingTable::new();
        if let Some(below) = self.children.get(&node) {
            for (binding, child) in below {
                for window in self.windows_below(*child) {
                    table.insert(window, binding.fabric_port())?;
                }
            }
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology(yaml: &str) -> TopologyConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    const TWO_LEVEL: &str = "
root_complex: { name: rc, num_downstream_ports: 2 }
switches:
  - { name: sw, num_downstream_ports: 2 }
endpoints:
  - { name: a, pci_bus: 1, pci_dev: 0, pci_func: 0, bar_address: 0x1000, bar_size: 0x1000 }
  - { name: b, pci_bus: 2, pci_dev: 0, pci_func: 0, bar_address: 0x4000, bar_size: 0x1000 }
  - { name: c, pci_bus: 3, pci_dev: 0, pci_func: 0, bar_address: 0x8000, bar_size: 0x100 }
links:
  - { name: l0, upstream: root_complex.rc.downstream0, downstream: switch.sw.upstream }
  - { name: l1, upstream: switch.sw.downstream0, downstream: endpoint.a.upstream }
  - { name: l2, upstream: switch.sw.downstream1, downstream: endpoint.b.upstream }
  - { name: l3, upstream: root_complex.rc.downstream1, downstream: endpoint.c.upstream }
";

    #[test]
    fn derives_routing() {
        let plan = validate(&topology(TWO_LEVEL)).unwrap();

        let rc = &plan.root_complex.1.windows;
        assert_eq!(rc.len(), 3);
        assert_eq!(rc.lookup(0x1000), Some(0));
        assert_eq!(rc.lookup(0x4fff), Some(0));
        assert_eq!(rc.lookup(0x8000), Some(1));
        assert_eq!(rc.lookup(0x2000), None);

        let sw = &plan.switches[0].1.routing;
        assert_eq!(sw.lookup(0x1000), Some(1));
        assert_eq!(sw.lookup(0x4000), Some(2));
        assert_eq!(sw.lookup(0x8000), None);
    }

    #[test]
    fn fabric_ports() {
        let down = Binding {
            node: Node::Switch(0),
            port: PortName::Downstream(1),
        };
        assert_eq!(down.fabric_port(), 2);
        let rc = Binding {
            node: Node::RootComplex,
            port: PortName::Downstream(1),
        };
        assert_eq!(rc.fabric_port(), 1);
    }

    #[test]
    fn dangling_and_unreachable() {
        let yaml = TWO_LEVEL.replace(
            "  - { name: l2, upstream: switch.sw.downstream1, downstream: endpoint.b.upstream }\n",
            "",
        );
        let errors = validate(&topology(&yaml)).unwrap_err();
        assert_eq!(
            errors.0,
            vec![
                TopologyError::DanglingPort {
                    binding: "switch.sw.downstream1".to_string()
                },
                TopologyError::DanglingPort {
                    binding: "endpoint.b.upstream".to_string()
                },
                TopologyError::Unreachable {
                    component: "endpoint.b".to_string()
                },
            ]
        );
    }

    #[test]
    fn wrong_direction() {
        let yaml = TWO_LEVEL.replace(
            "{ name: l1, upstream: switch.sw.downstream0, downstream: endpoint.a.upstream }",
            "{ name: l1, upstream: endpoint.a.upstream, downstream: switch.sw.downstream0 }",
        );
        let errors = validate(&topology(&yaml)).unwrap_err();
        assert!(errors.contains(|e| matches!(e, TopologyError::InvalidPort { link, .. } if link == "l1")));
    }

    #[test]
    fn bad_bindings() {
        let yaml = TWO_LEVEL
            .replace("switch.sw.downstream1, downstream", "switch.sw.downstream7, downstream")
            .replace("endpoint.c.upstream", "endpoint.missing.upstream")
            .replace("root_complex.rc.downstream0", "rc.downstream0");
        let errors = validate(&topology(&yaml)).unwrap_err();
        assert!(errors.contains(|e| matches!(e, TopologyError::InvalidPort { link, .. } if link == "l2")));
        assert!(errors.contains(|e| matches!(e, TopologyError::UnknownComponent { link, .. } if link == "l3")));
        assert!(errors.contains(|e| matches!(e, TopologyError::InvalidBinding { link, .. } if link == "l0")));
    }

    #[test]
    fn port_bound_twice() {
        let yaml = TWO_LEVEL.replace(
            "{ name: l3, upstream: root_complex.rc.downstream1,",
            "{ name: l3, upstream: root_complex.rc.downstream0,",
        );
        let errors = validate(&topology(&yaml)).unwrap_err();
        assert!(errors.contains(|e| *e
            == TopologyError::PortBoundTwice {
                binding: "root_complex.rc.downstream0".to_string(),
                first: "l0".to_string(),
                second: "l3".to_string(),
            }));
    }

    #[test]
    fn overlapping_bars() {
        let yaml = TWO_LEVEL.replace("bar_address: 0x4000", "bar_address: 0x1800");
        let errors = validate(&topology(&yaml)).unwrap_err();
        assert_eq!(
            errors.0,
            vec![TopologyError::OverlappingWindows {
                first: "a".to_string(),
                second: "b".to_string()
            }]
        );
    }

    #[test]
    fn bad_endpoint_parameters() {
        let yaml = TWO_LEVEL
            .replace("pci_bus: 1, pci_dev: 0", "pci_bus: 1, pci_dev: 32")
            .replace("bar_size: 0x100", "bar_size: 0, interrupt_pin: 5");
        let errors = validate(&topology(&yaml)).unwrap_err();
        assert!(errors.contains(|e| matches!(e, TopologyError::InvalidBdf { device: 32, .. })));
        assert!(errors.contains(|e| matches!(e, TopologyError::InvalidInterruptPin { pin: 5, .. })));
        assert!(errors.contains(|e| matches!(e, TopologyError::InvalidWindow { .. })));
    }

    #[test]
    fn bad_link_parameters() {
        let yaml = TWO_LEVEL.replace(
            "{ name: l1, upstream",
            "{ name: l1, lanes: 3, speed: 6, max_queue_size: 0, upstream",
        );
        let errors = validate(&topology(&yaml)).unwrap_err();
        assert!(errors.contains(|e| matches!(e, TopologyError::InvalidLink { link, .. } if link == "l1")));
    }

    #[test]
    fn bad_program() {
        let yaml = TWO_LEVEL.replace(
            "bar_size: 0x100 }",
            "bar_size: 0x100, dma: [{ kind: read, address: 0 }, { kind: write, address: 0 }] }",
        );
        let errors = validate(&topology(&yaml)).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn access_wraps_address_space() {
        let yaml = TWO_LEVEL.replace(
            "bar_size: 0x100 }",
            "bar_size: 0x100, dma: [{ kind: read, address: 0xffff_ffff_ffff_fff0, size: 64 }] }",
        );
        let errors = validate(&topology(&yaml)).unwrap_err();
        assert!(errors.contains(|e| matches!(e, TopologyError::InvalidParameter { owner, reason }
            if owner == "endpoint c" && reason.contains("past the end of the address space"))));

        // The last byte of the address space is reachable
        let yaml = TWO_LEVEL.replace(
            "bar_size: 0x100 }",
            "bar_size: 0x100, dma: [{ kind: read, address: 0xffff_ffff_ffff_ffc0, size: 64 }] }",
        );
        assert!(validate(&topology(&yaml)).is_ok());
    }

    #[test]
    fn payload_fits_every_link_crossed() {
        let write = format!("{:?}", vec![7u8; 200]);
        let yaml = TWO_LEVEL
            .replace("{ name: l1, upstream", "{ name: l1, max_payload_bytes: 128, upstream")
            .replace(
                "bar_size: 0x1000 }\n  - { name: b",
                "bar_size: 0x1000, dma: [{ kind: read, address: 0x10_0000, size: 200 }] }\n  - { name: b",
            )
            .replace(
                "bar_address: 0x4000, bar_size: 0x1000 }",
                &format!(
                    "bar_address: 0x4000, bar_size: 0x1000, dma: [\
                     {{ kind: write, address: 0x1000, data: {write} }}, \
                     {{ kind: read, address: 0x8000, size: 200 }}] }}"
                ),
            )
            + &format!(
                "host:\n  pio:\n    - {{ kind: write, address: 0x4000, data: {write} }}\n    \
                 - {{ kind: read, address: 0x1010, size: 129 }}\n"
            );
        let errors = validate(&topology(&yaml)).unwrap_err();

        let too_large = |owner: &str, index: usize, bytes: u64| TopologyError::PayloadTooLarge {
            owner: owner.to_string(),
            index,
            bytes,
            link: "l1".to_string(),
            max_payload: 128,
        };
        assert_eq!(
            errors.0,
            vec![
                // To the host over l1
                too_large("host", 1, 129),
                // Up from a over l1
                too_large("endpoint a", 0, 200),
                // Peer to peer from b to a turns at the switch
                too_large("endpoint b", 0, 200),
            ]
        );
    }
}
