// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! A point-to-point PCIe link.
//!
//! A [Link] has an upstream end (towards the root complex) and a downstream
//! end. It carries four independent [channels](LinkDirection), each of which
//! is a bounded FIFO followed by a serializer that holds every packet for the
//! time it takes to cross the lanes.
//!
//! A packet counts against the queue depth from the moment it is accepted
//! until it has been handed to the far end. Once the queue is full the
//! sender is back-pressured by not taking the next packet from the port.
//!
//! # Ports
//!
//! Each direction has one [input port](lanes_engine::port::InPort) and one
//! [output port](lanes_engine::port::OutPort):
//!  - `down_request_rx` -> `down_request_tx`
//!  - `down_response_rx` -> `down_response_tx`
//!  - `up_request_rx` -> `up_request_tx`
//!  - `up_response_rx` -> `up_response_tx`

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use async_trait::async_trait;
use lanes_components::rate_limiter::RateLimiter;
use lanes_components::{connect_tx, port_rx, rc_limiter, take_option};
use lanes_engine::engine::Engine;
use lanes_engine::events::repeated::Repeated;
use lanes_engine::executor::Spawner;
use lanes_engine::port::{InPort, OutPort, PortStateResult};
use lanes_engine::sim_error;
use lanes_engine::time::clock::Clock;
use lanes_engine::traits::{Event, Runnable, TotalBytes};
use lanes_engine::types::{SimError, SimResult};
use lanes_model_builder::{EntityDisplay, EntityGet, Runnable};
use lanes_track::entity::Entity;
use lanes_track::Unique;
use lanes_track::{debug, enter, exit, value};

use crate::tlp::Tlp;
use crate::{FabricPorts, protocol_violation};

/// Lane counts a link can be built with.
pub const VALID_LANES: [u32; 7] = [1, 2, 4, 8, 12, 16, 32];

pub const MIN_PAYLOAD_BYTES: usize = 128;
pub const MAX_PAYLOAD_BYTES: usize = 4096;

pub const DEFAULT_LANES: u32 = 1;
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 256;
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 16;

/// PCIe signalling generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Generation {
    Gen1,
    Gen2,
    Gen3,
    Gen4,
    Gen5,
}

impl Generation {
    /// Data rate per lane in Gb/s after line encoding.
    #[must_use]
    pub fn lane_rate_gbps(&self) -> f64 {
        match self {
            Generation::Gen1 => 2.0,
            Generation::Gen2 => 4.0,
            Generation::Gen3 => 7.877,
            Generation::Gen4 => 15.754,
            Generation::Gen5 => 31.508,
        }
    }
}

impl TryFrom<u8> for Generation {
    type Error = SimError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Generation::Gen1),
            2 => Ok(Generation::Gen2),
            3 => Ok(Generation::Gen3),
            4 => Ok(Generation::Gen4),
            5 => Ok(Generation::Gen5),
            _ => sim_error!("invalid PCIe generation {value}"),
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let number = match self {
            Generation::Gen1 => 1,
            Generation::Gen2 => 2,
            Generation::Gen3 => 3,
            Generation::Gen4 => 4,
            Generation::Gen5 => 5,
        };
        write!(f, "Gen{number}")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LinkConfig {
    pub lanes: u32,
    pub speed: Generation,
    pub max_payload_bytes: usize,
    pub max_queue_size: usize,
}

impl LinkConfig {
    #[must_use]
    pub fn new(lanes: u32, speed: Generation, max_payload_bytes: usize, max_queue_size: usize) -> Self {
        Self {
            lanes,
            speed,
            max_payload_bytes,
            max_queue_size,
        }
    }

    /// Describe every problem with this configuration.
    #[must_use]
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !VALID_LANES.contains(&self.lanes) {
            problems.push(format!("lane count {} not one of {VALID_LANES:?}", self.lanes));
        }
        if !self.max_payload_bytes.is_power_of_two()
            || !(MIN_PAYLOAD_BYTES..=MAX_PAYLOAD_BYTES).contains(&self.max_payload_bytes)
        {
            problems.push(format!(
                "max payload {} bytes must be a power of two in {MIN_PAYLOAD_BYTES}..={MAX_PAYLOAD_BYTES}",
                self.max_payload_bytes
            ));
        }
        if self.max_queue_size == 0 {
            problems.push("max queue size must be greater than zero".to_string());
        }
        problems
    }

    /// Link bandwidth expressed in bits per tick of a clock at `clock_mhz`.
    ///
    /// Rounded down and never less than one.
    #[must_use]
    pub fn bits_per_tick(&self, clock_mhz: f64) -> usize {
        let bits = f64::from(self.lanes) * self.speed.lane_rate_gbps() * 1000.0 / clock_mhz;
        (bits.floor() as usize).max(1)
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_LANES,
            Generation::Gen1,
            DEFAULT_MAX_PAYLOAD_BYTES,
            DEFAULT_MAX_QUEUE_SIZE,
        )
    }
}

/// The four independent channels of a link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkDirection {
    DownstreamRequest,
    DownstreamResponse,
    UpstreamRequest,
    UpstreamResponse,
}

impl LinkDirection {
    pub const ALL: [LinkDirection; 4] = [
        LinkDirection::DownstreamRequest,
        LinkDirection::DownstreamResponse,
        LinkDirection::UpstreamRequest,
        LinkDirection::UpstreamResponse,
    ];

    fn index(&self) -> usize {
        match self {
            LinkDirection::DownstreamRequest => 0,
            LinkDirection::DownstreamResponse => 1,
            LinkDirection::UpstreamRequest => 2,
            LinkDirection::UpstreamResponse => 3,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            LinkDirection::DownstreamRequest => "down_request",
            LinkDirection::DownstreamResponse => "down_response",
            LinkDirection::UpstreamRequest => "up_request",
            LinkDirection::UpstreamResponse => "up_response",
        }
    }
}

impl fmt::Display for LinkDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Counters for one channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub occupancy: usize,
    pub high_water_mark: usize,
    pub packets: usize,
    pub bytes: usize,
}

struct ChannelState {
    queue: RefCell<VecDeque<Tlp>>,
    stats: Cell<ChannelStats>,
    space_freed: Repeated,
    data_ready: Repeated,
}

impl ChannelState {
    fn update(&self, f: impl FnOnce(&mut ChannelStats)) -> ChannelStats {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
        stats
    }
}

#[derive(EntityDisplay, EntityGet)]
struct Channel {
    entity: Rc<Entity>,
    spawner: Spawner,
    limiter: Rc<RateLimiter>,
    max_payload_bytes: usize,
    max_queue_size: usize,
    state: Rc<ChannelState>,
    rx: RefCell<Option<InPort<Tlp>>>,
    tx: RefCell<Option<OutPort<Tlp>>>,
}

impl Channel {
    fn new_and_register(
        engine: &Engine,
        parent: &Rc<Entity>,
        direction: LinkDirection,
        limiter: Rc<RateLimiter>,
        config: &LinkConfig,
    ) -> Rc<Self> {
        let entity = Rc::new(Entity::new(parent, direction.name()));
        let rx = InPort::new(&entity, "rx");
        let tx = OutPort::new(&entity, "tx");
        let rc_self = Rc::new(Self {
            entity,
            spawner: engine.spawner(),
            limiter,
            max_payload_bytes: config.max_payload_bytes,
            max_queue_size: config.max_queue_size,
            state: Rc::new(ChannelState {
                queue: RefCell::new(VecDeque::new()),
                stats: Cell::new(ChannelStats::default()),
                space_freed: Repeated::default(),
                data_ready: Repeated::default(),
            }),
            rx: RefCell::new(Some(rx)),
            tx: RefCell::new(Some(tx)),
        });
        engine.register(rc_self.clone());
        rc_self
    }
}

#[async_trait(?Send)]
impl Runnable for Channel {
    async fn run(&self) -> SimResult {
        let tx = take_option!(self.tx);
        let entity = self.entity.clone();
        let limiter = self.limiter.clone();
        let state = self.state.clone();
        self.spawner
            .spawn(async move { run_serializer(entity, tx, limiter, state).await });

        let rx = take_option!(self.rx);
        loop {
            while self.state.stats.get().occupancy >= self.max_queue_size {
                self.state.space_freed.listen().await;
            }

            let tlp = rx.get()?.await;
            if tlp.payload_bytes() > self.max_payload_bytes {
                return protocol_violation!(self.entity ;
                    "{tlp} exceeds max payload of {} bytes", self.max_payload_bytes);
            }
            enter!(self.entity ; tlp.id());

            self.state.queue.borrow_mut().push_back(tlp);
            let stats = self.state.update(|s| {
                s.occupancy += 1;
                s.high_water_mark = s.high_water_mark.max(s.occupancy);
            });
            value!(self.entity ; stats.occupancy);
            self.state.data_ready.notify()?;
        }
    }
}

async fn run_serializer(
    entity: Rc<Entity>,
    tx: OutPort<Tlp>,
    limiter: Rc<RateLimiter>,
    state: Rc<ChannelState>,
) -> SimResult {
    loop {
        let next = state.queue.borrow_mut().pop_front();
        match next {
            Some(tlp) => {
                limiter.delay(&tlp).await;
                let bytes = tlp.total_bytes();
                exit!(entity ; tlp.id());
                tx.put(tlp)?.await;

                let stats = state.update(|s| {
                    s.occupancy -= 1;
                    s.packets += 1;
                    s.bytes += bytes;
                });
                value!(entity ; stats.occupancy);
                state.space_freed.notify()?;
            }
            None => {
                state.data_ready.listen().await;
            }
        }
    }
}

#[derive(EntityDisplay, EntityGet, Runnable)]
pub struct Link {
    pub entity: Rc<Entity>,
    config: LinkConfig,
    bits_per_tick: usize,
    channels: [Rc<Channel>; 4],
}

impl Link {
    pub fn new_and_register(
        engine: &Engine,
        clock: &Clock,
        parent: &Rc<Entity>,
        name: &str,
        config: LinkConfig,
    ) -> Result<Rc<Self>, SimError> {
        let problems = config.problems();
        if !problems.is_empty() {
            return sim_error!("link {name}: {}", problems.join(", "));
        }

        let entity = Rc::new(Entity::new(parent, name));
        let bits_per_tick = config.bits_per_tick(clock.freq_mhz());
        let limiter = rc_limiter!(clock.clone(), bits_per_tick);
        let channels = LinkDirection::ALL.map(|direction| {
            Channel::new_and_register(engine, &entity, direction, limiter.clone(), &config)
        });

        debug!(entity ; "x{} {} at {} bits per tick", config.lanes, config.speed, bits_per_tick);

        let rc_self = Rc::new(Self {
            entity,
            config,
            bits_per_tick,
            channels,
        });
        engine.register(rc_self.clone());
        Ok(rc_self)
    }

    #[must_use]
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    #[must_use]
    pub fn bits_per_tick(&self) -> usize {
        self.bits_per_tick
    }

    #[must_use]
    pub fn stats(&self, direction: LinkDirection) -> ChannelStats {
        self.channels[direction.index()].state.stats.get()
    }

    /// Highest number of packets held by any one direction.
    #[must_use]
    pub fn high_water_mark(&self) -> usize {
        LinkDirection::ALL
            .iter()
            .map(|d| self.stats(*d).high_water_mark)
            .max()
            .unwrap_or(0)
    }

    fn channel(&self, direction: LinkDirection) -> &Channel {
        &self.channels[direction.index()]
    }

    pub fn port_down_request_rx(&self) -> PortStateResult<Tlp> {
        port_rx!(self.channel(LinkDirection::DownstreamRequest).rx, state)
    }

    pub fn connect_port_down_request_tx(&self, port_state: PortStateResult<Tlp>) -> SimResult {
        connect_tx!(self.channel(LinkDirection::DownstreamRequest).tx, connect ; port_state)
    }

    pub fn port_down_response_rx(&self) -> PortStateResult<Tlp> {
        port_rx!(self.channel(LinkDirection::DownstreamResponse).rx, state)
    }

    pub fn connect_port_down_response_tx(&self, port_state: PortStateResult<Tlp>) -> SimResult {
        connect_tx!(self.channel(LinkDirection::DownstreamResponse).tx, connect ; port_state)
    }

    pub fn port_up_request_rx(&self) -> PortStateResult<Tlp> {
        port_rx!(self.channel(LinkDirection::UpstreamRequest).rx, state)
    }

    pub fn connect_port_up_request_tx(&self, port_state: PortStateResult<Tlp>) -> SimResult {
        connect_tx!(self.channel(LinkDirection::UpstreamRequest).tx, connect ; port_state)
    }

    pub fn port_up_response_rx(&self) -> PortStateResult<Tlp> {
        port_rx!(self.channel(LinkDirection::UpstreamResponse).rx, state)
    }

    pub fn connect_port_up_response_tx(&self, port_state: PortStateResult<Tlp>) -> SimResult {
        connect_tx!(self.channel(LinkDirection::UpstreamResponse).tx, connect ; port_state)
    }

    /// Attach both ends of the link.
    ///
    /// The upstream end is fabric port `up_port` of `upstream` and the
    /// downstream end is fabric port `down_port` of `downstream`.
    pub fn attach(
        &self,
        upstream: &dyn FabricPorts,
        up_port: usize,
        downstream: &dyn FabricPorts,
        down_port: usize,
    ) -> SimResult {
        debug!(self.entity ; "Attach {}[{}] => {}[{}]", upstream.entity(), up_port, downstream.entity(), down_port);

        upstream.connect_port_request_tx_i(up_port, self.port_down_request_rx())?;
        self.connect_port_down_request_tx(downstream.port_request_rx_i(down_port))?;

        upstream.connect_port_response_tx_i(up_port, self.port_down_response_rx())?;
        self.connect_port_down_response_tx(downstream.port_response_rx_i(down_port))?;

        downstream.connect_port_request_tx_i(down_port, self.port_up_request_rx())?;
        self.connect_port_up_request_tx(upstream.port_request_rx_i(up_port))?;

        downstream.connect_port_response_tx_i(down_port, self.port_up_response_rx())?;
        self.connect_port_up_response_tx(upstream.port_response_rx_i(up_port))
    }
}
