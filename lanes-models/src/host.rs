// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The host CPU and memory system behind a root complex.
//!
//! The host issues a program of programmed I/O and serves DMA from devices
//! out of its memory after `memory_latency_ticks`.
//!
//! # Ports
//!
//!  - `pio_tx`: PIO requests into the root complex.
//!  - `pio_rx`: PIO completions from the root complex.
//!  - `dma_rx`: DMA requests from the root complex.
//!  - `dma_tx`: DMA completions into the root complex.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;
use lanes_components::delay::Delay;
use lanes_components::{connect_tx, port_rx, take_option};
use lanes_engine::engine::Engine;
use lanes_engine::events::repeated::Repeated;
use lanes_engine::executor::Spawner;
use lanes_engine::port::{InPort, OutPort, PortStateResult};
use lanes_engine::sim_error;
use lanes_engine::time::clock::Clock;
use lanes_engine::traits::{Event, Runnable};
use lanes_engine::types::{SimError, SimResult};
use lanes_model_builder::{EntityDisplay, EntityGet};
use lanes_track::entity::Entity;
use lanes_track::{debug, trace};

use crate::bdf::Bdf;
use crate::endpoint::NUM_TAGS;
use crate::memory::{SparseMemory, access_end};
use crate::protocol_violation;
use crate::tlp::{Tlp, TlpKind};

pub const DEFAULT_MEMORY_LATENCY_TICKS: usize = 20;
pub const DEFAULT_MAX_OUTSTANDING_PIO: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PioOp {
    Read { address: u64, size: usize },

    /// Posted.
    Write { address: u64, data: Vec<u8> },
}

#[derive(Clone, Debug)]
pub struct HostConfig {
    pub memory_latency_ticks: usize,
    pub max_outstanding_pio: usize,
    pub pio: Vec<PioOp>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            memory_latency_ticks: DEFAULT_MEMORY_LATENCY_TICKS,
            max_outstanding_pio: DEFAULT_MAX_OUTSTANDING_PIO,
            pio: Vec::new(),
        }
    }
}

struct PioState {
    /// Tag -> index of the program entry.
    outstanding: RefCell<HashMap<u16, usize>>,
    results: RefCell<Vec<(usize, Vec<u8>)>>,
    changed: Repeated,
}

#[derive(EntityDisplay, EntityGet)]
pub struct Host {
    pub entity: Rc<Entity>,
    spawner: Spawner,
    config: HostConfig,
    memory: Rc<RefCell<SparseMemory>>,
    dma_served: Rc<Cell<usize>>,
    pio: Rc<PioState>,

    pio_tx: RefCell<Option<OutPort<Tlp>>>,
    pio_rx: RefCell<Option<InPort<Tlp>>>,
    dma_rx: RefCell<Option<InPort<Tlp>>>,
    dma_response: RefCell<Option<OutPort<Tlp>>>,
    memory_delay: Rc<Delay<Tlp>>,
}

impl Host {
    pub fn new_and_register(
        engine: &Engine,
        clock: &Clock,
        parent: &Rc<Entity>,
        name: &str,
        config: HostConfig,
    ) -> Result<Rc<Self>, SimError> {
        if config.max_outstanding_pio == 0 || config.max_outstanding_pio > NUM_TAGS {
            return sim_error!("host {name}: max outstanding PIO must be in 1..={NUM_TAGS}");
        }

        let entity = Rc::new(Entity::new(parent, name));
        let memory_delay = Delay::new_and_register(
            engine,
            clock,
            &entity,
            "memory_delay",
            config.memory_latency_ticks,
        )?;
        let mut dma_response = OutPort::new(&entity, "dma_response");
        dma_response.connect(memory_delay.port_rx())?;

        let rc_self = Rc::new(Self {
            spawner: engine.spawner(),
            config,
            memory: Rc::new(RefCell::new(SparseMemory::new())),
            dma_served: Rc::new(Cell::new(0)),
            pio: Rc::new(PioState {
                outstanding: RefCell::new(HashMap::new()),
                results: RefCell::new(Vec::new()),
                changed: Repeated::default(),
            }),
            pio_tx: RefCell::new(Some(OutPort::new(&entity, "pio_tx"))),
            pio_rx: RefCell::new(Some(InPort::new(&entity, "pio_rx"))),
            dma_rx: RefCell::new(Some(InPort::new(&entity, "dma_rx"))),
            dma_response: RefCell::new(Some(dma_response)),
            memory_delay,
            entity,
        });
        engine.register(rc_self.clone());
        Ok(rc_self)
    }

    pub fn connect_port_pio_tx(&self, port_state: PortStateResult<Tlp>) -> SimResult {
        connect_tx!(self.pio_tx, connect ; port_state)
    }

    pub fn port_pio_rx(&self) -> PortStateResult<Tlp> {
        port_rx!(self.pio_rx, state)
    }

    pub fn port_dma_rx(&self) -> PortStateResult<Tlp> {
        port_rx!(self.dma_rx, state)
    }

    pub fn connect_port_dma_tx(&self, port_state: PortStateResult<Tlp>) -> SimResult {
        self.memory_delay.connect_port_tx(port_state)
    }

    pub fn read_memory(&self, address: u64, length: usize) -> Result<Vec<u8>, SimError> {
        self.memory.borrow().read(address, length)
    }

    pub fn write_memory(&self, address: u64, data: &[u8]) -> SimResult {
        self.memory.borrow_mut().write(address, data)
    }

    /// DMA requests handled, posted or not.
    #[must_use]
    pub fn num_dma_served(&self) -> usize {
        self.dma_served.get()
    }

    #[must_use]
    pub fn num_outstanding_pio(&self) -> usize {
        self.pio.outstanding.borrow().len()
    }

    /// The data returned by each completed PIO read, ordered by program index.
    #[must_use]
    pub fn pio_read_results(&self) -> Vec<(usize, Vec<u8>)> {
        let mut results = self.pio.results.borrow().clone();
        results.sort_by_key(|(index, _)| *index);
        results
    }
}

#[async_trait(?Send)]
impl Runnable for Host {
    async fn run(&self) -> SimResult {
        let dma_rx = take_option!(self.dma_rx);
        let dma_response = take_option!(self.dma_response);
        {
            let entity = self.entity.clone();
            let memory = self.memory.clone();
            let served = self.dma_served.clone();
            self.spawner.spawn(async move {
                run_dma_server(entity, memory, served, dma_rx, dma_response).await
            });
        }

        let pio_rx = take_option!(self.pio_rx);
        {
            let entity = self.entity.clone();
            let pio = self.pio.clone();
            self.spawner
                .spawn(async move { run_pio_completions(entity, pio, pio_rx).await });
        }

        let pio_tx = take_option!(self.pio_tx);
        for (index, op) in self.config.pio.iter().enumerate() {
            let tlp = match op {
                PioOp::Read { address, size } => {
                    while self.pio.outstanding.borrow().len() >= self.config.max_outstanding_pio {
                        self.pio.changed.listen().await;
                    }
                    let tag = {
                        let outstanding = self.pio.outstanding.borrow();
                        (0..NUM_TAGS as u16).find(|tag| !outstanding.contains_key(tag))
                    };
                    let Some(tag) = tag else {
                        return sim_error!("{}: no free PIO tag", self.entity);
                    };
                    self.pio.outstanding.borrow_mut().insert(tag, index);
                    Tlp::read(&self.entity, Bdf::HOST, tag, *address, *size)
                }
                PioOp::Write { address, data } => {
                    Tlp::write(&self.entity, Bdf::HOST, 0, *address, data.clone(), false)
                }
            };
            trace!(self.entity ; "PIO {} issue {}", index, tlp);
            pio_tx.put(tlp)?.await;
        }
        Ok(())
    }
}

async fn run_pio_completions(entity: Rc<Entity>, pio: Rc<PioState>, rx: InPort<Tlp>) -> SimResult {
    loop {
        let tlp = rx.get()?.await;
        if tlp.kind() != TlpKind::CompletionData || tlp.requester() != Bdf::HOST {
            return protocol_violation!(entity ; "{tlp} does not complete a host PIO read");
        }
        let index = pio.outstanding.borrow_mut().remove(&tlp.tag());
        let Some(index) = index else {
            return protocol_violation!(entity ; "{tlp} has unknown tag");
        };
        debug!(entity ; "PIO {} complete", index);
        pio.results.borrow_mut().push((index, tlp.into_data()));
        pio.changed.notify()?;
    }
}

async fn run_dma_server(
    entity: Rc<Entity>,
    memory: Rc<RefCell<SparseMemory>>,
    served: Rc<Cell<usize>>,
    rx: InPort<Tlp>,
    response: OutPort<Tlp>,
) -> SimResult {
    loop {
        let tlp = rx.get()?.await;
        if access_end(tlp.address(), tlp.length_bytes()).is_none() {
            return protocol_violation!(entity ; "{tlp} runs past the end of host memory");
        }
        let reply = match tlp.kind() {
            TlpKind::MemRead => {
                let data = memory.borrow().read(tlp.address(), tlp.length_bytes())?;
                Some(tlp.completion(&entity, data))
            }
            TlpKind::MemWrite => {
                memory.borrow_mut().write(tlp.address(), tlp.data())?;
                None
            }
            TlpKind::MemWriteNonPosted => {
                memory.borrow_mut().write(tlp.address(), tlp.data())?;
                Some(tlp.completion(&entity, Vec::new()))
            }
            TlpKind::Completion | TlpKind::CompletionData => {
                return protocol_violation!(entity ; "{tlp} sent to host memory");
            }
        };
        served.set(served.get() + 1);
        trace!(entity ; "DMA {}", tlp);

        if let Some(reply) = reply {
            response.put(reply)?.await;
        }
    }
}
