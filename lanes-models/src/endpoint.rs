// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! A memory-mapped endpoint device.
//!
//! The endpoint has a single fabric port carrying both programmed I/O from
//! the host and its own DMA. PIO targets the device memory behind its BAR
//! window. DMA is driven by a program of reads and writes to host
//! addresses; once every operation has completed the endpoint raises its
//! interrupt.
//!
//! # Ports
//!
//! Fabric port `0` only:
//!  - `request_rx`: PIO from the link.
//!  - `response_tx`: PIO completions, after `latency_ticks`.
//!  - `request_tx`: DMA requests.
//!  - `response_rx`: DMA completions.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;
use lanes_components::delay::Delay;
use lanes_components::{connect_tx, port_rx, take_option};
use lanes_engine::engine::Engine;
use lanes_engine::events::once::Once;
use lanes_engine::events::repeated::Repeated;
use lanes_engine::executor::Spawner;
use lanes_engine::port::{InPort, OutPort, PortStateResult};
use lanes_engine::sim_error;
use lanes_engine::time::clock::Clock;
use lanes_engine::traits::{Event, Runnable};
use lanes_engine::types::{SimError, SimResult};
use lanes_model_builder::{EntityDisplay, EntityGet};
use lanes_track::entity::Entity;
use lanes_track::{debug, info, trace};

use crate::bdf::Bdf;
use crate::memory::SparseMemory;
use crate::routing::AddressWindow;
use crate::tlp::{Tlp, TlpKind};
use crate::{FabricPorts, protocol_violation};

pub const DEFAULT_LATENCY_TICKS: usize = 10;
pub const DEFAULT_MAX_OUTSTANDING_DMA: usize = 4;

/// PCIe tags available to a requester.
pub const NUM_TAGS: usize = 256;

/// Legacy interrupt pin; `0` means the device uses no pin.
pub const MAX_INTERRUPT_PIN: u8 = 4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DmaOp {
    Read { address: u64, size: usize },
    Write { address: u64, data: Vec<u8> },
}

impl DmaOp {
    #[must_use]
    pub fn address(&self) -> u64 {
        match self {
            DmaOp::Read { address, .. } | DmaOp::Write { address, .. } => *address,
        }
    }
}

/// The outcome of one DMA operation: the bytes read, or empty for a write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DmaResult {
    pub index: usize,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct EndpointConfig {
    pub bdf: Bdf,
    pub interrupt_line: u8,
    pub interrupt_pin: u8,
    pub bar: AddressWindow,
    pub latency_ticks: usize,
    pub max_outstanding_dma: usize,
    pub dma: Vec<DmaOp>,
}

impl EndpointConfig {
    #[must_use]
    pub fn new(bdf: Bdf, bar: AddressWindow) -> Self {
        Self {
            bdf,
            interrupt_line: 0,
            interrupt_pin: 0,
            bar,
            latency_ticks: DEFAULT_LATENCY_TICKS,
            max_outstanding_dma: DEFAULT_MAX_OUTSTANDING_DMA,
            dma: Vec::new(),
        }
    }
}

struct DmaState {
    /// Tag -> index of the program entry it was issued for.
    outstanding: RefCell<HashMap<u16, usize>>,
    results: RefCell<Vec<DmaResult>>,
    completed: Cell<usize>,
    changed: Repeated,
}

impl DmaState {
    fn free_tag(&self) -> Option<u16> {
        let outstanding = self.outstanding.borrow();
        (0..NUM_TAGS as u16).find(|tag| !outstanding.contains_key(tag))
    }
}

#[derive(EntityDisplay, EntityGet)]
pub struct Endpoint {
    pub entity: Rc<Entity>,
    spawner: Spawner,
    config: EndpointConfig,
    memory: Rc<RefCell<SparseMemory>>,
    pio_handled: Rc<Cell<usize>>,
    dma: Rc<DmaState>,
    dma_done: Once,

    pio_rx: RefCell<Option<InPort<Tlp>>>,
    pio_response: RefCell<Option<OutPort<Tlp>>>,
    pio_delay: Rc<Delay<Tlp>>,
    dma_tx: RefCell<Option<OutPort<Tlp>>>,
    dma_rx: RefCell<Option<InPort<Tlp>>>,
}

impl Endpoint {
    pub fn new_and_register(
        engine: &Engine,
        clock: &Clock,
        parent: &Rc<Entity>,
        name: &str,
        config: EndpointConfig,
    ) -> Result<Rc<Self>, SimError> {
        if config.max_outstanding_dma == 0 || config.max_outstanding_dma > NUM_TAGS {
            return sim_error!(
                "endpoint {name}: max outstanding DMA must be in 1..={NUM_TAGS}"
            );
        }
        if config.bdf == Bdf::HOST {
            return sim_error!("endpoint {name}: {} is the host requester ID", Bdf::HOST);
        }
        if config.interrupt_pin > MAX_INTERRUPT_PIN {
            return sim_error!("endpoint {name}: invalid interrupt pin {}", config.interrupt_pin);
        }

        let entity = Rc::new(Entity::new(parent, name));
        let pio_delay = Delay::new_and_register(engine, clock, &entity, "pio_delay", config.latency_ticks)?;
        let mut pio_response = OutPort::new(&entity, "pio_response");
        pio_response.connect(pio_delay.port_rx())?;

        let rc_self = Rc::new(Self {
            spawner: engine.spawner(),
            config,
            memory: Rc::new(RefCell::new(SparseMemory::new())),
            pio_handled: Rc::new(Cell::new(0)),
            dma: Rc::new(DmaState {
                outstanding: RefCell::new(HashMap::new()),
                results: RefCell::new(Vec::new()),
                completed: Cell::new(0),
                changed: Repeated::default(),
            }),
            dma_done: Once::default(),
            pio_rx: RefCell::new(Some(InPort::new(&entity, "pio_rx"))),
            pio_response: RefCell::new(Some(pio_response)),
            pio_delay,
            dma_tx: RefCell::new(Some(OutPort::new(&entity, "dma_tx"))),
            dma_rx: RefCell::new(Some(InPort::new(&entity, "dma_rx"))),
            entity,
        });
        engine.register(rc_self.clone());
        Ok(rc_self)
    }

    #[must_use]
    pub fn bdf(&self) -> Bdf {
        self.config.bdf
    }

    #[must_use]
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Read device memory at an absolute address inside the BAR.
    pub fn read_memory(&self, address: u64, length: usize) -> Result<Vec<u8>, SimError> {
        let offset = self.bar_offset(address, length)?;
        self.memory.borrow().read(offset, length)
    }

    /// Write device memory at an absolute address inside the BAR.
    pub fn write_memory(&self, address: u64, data: &[u8]) -> SimResult {
        let offset = self.bar_offset(address, data.len())?;
        self.memory.borrow_mut().write(offset, data)
    }

    fn bar_offset(&self, address: u64, length: usize) -> Result<u64, SimError> {
        let bar = self.config.bar;
        if !bar.contains_access(address, length) {
            return sim_error!("{self}: {length} bytes at 0x{address:x} outside BAR {bar}");
        }
        Ok(address - bar.start())
    }

    #[must_use]
    pub fn num_pio_handled(&self) -> usize {
        self.pio_handled.get()
    }

    #[must_use]
    pub fn num_dma_completed(&self) -> usize {
        self.dma.completed.get()
    }

    #[must_use]
    pub fn num_dma_outstanding(&self) -> usize {
        self.dma.outstanding.borrow().len()
    }

    /// Results ordered by program index.
    #[must_use]
    pub fn dma_results(&self) -> Vec<DmaResult> {
        let mut results = self.dma.results.borrow().clone();
        results.sort_by_key(|r| r.index);
        results
    }

    /// Event triggered when the interrupt is raised at the end of the DMA
    /// program.
    #[must_use]
    pub fn dma_done(&self) -> Once {
        self.dma_done.clone()
    }

    #[must_use]
    pub fn interrupt_raised(&self) -> bool {
        self.dma_done.is_triggered()
    }
}

#[async_trait(?Send)]
impl Runnable for Endpoint {
    async fn run(&self) -> SimResult {
        let pio_rx = take_option!(self.pio_rx);
        let pio_response = take_option!(self.pio_response);
        {
            let entity = self.entity.clone();
            let bar = self.config.bar;
            let memory = self.memory.clone();
            let handled = self.pio_handled.clone();
            self.spawner.spawn(async move {
                run_pio(entity, bar, memory, handled, pio_rx, pio_response).await
            });
        }

        let dma_rx = take_option!(self.dma_rx);
        {
            let entity = self.entity.clone();
            let bdf = self.config.bdf;
            let program = self.config.dma.clone();
            let dma = self.dma.clone();
            let interrupt = Interrupt {
                line: self.config.interrupt_line,
                pin: self.config.interrupt_pin,
                done: self.dma_done.clone(),
            };
            self.spawner.spawn(async move {
                run_dma_completions(entity, bdf, program, dma, interrupt, dma_rx).await
            });
        }

        let dma_tx = take_option!(self.dma_tx);
        for (index, op) in self.config.dma.iter().enumerate() {
            while self.dma.outstanding.borrow().len() >= self.config.max_outstanding_dma {
                self.dma.changed.listen().await;
            }
            let Some(tag) = self.dma.free_tag() else {
                return sim_error!("{}: no free DMA tag", self.entity);
            };

            let tlp = match op {
                DmaOp::Read { address, size } => {
                    Tlp::read(&self.entity, self.config.bdf, tag, *address, *size)
                }
                DmaOp::Write { address, data } => {
                    Tlp::write(&self.entity, self.config.bdf, tag, *address, data.clone(), true)
                }
            };
            trace!(self.entity ; "DMA {} issue {}", index, tlp);
            self.dma.outstanding.borrow_mut().insert(tag, index);
            dma_tx.put(tlp)?.await;
        }
        Ok(())
    }
}

async fn run_pio(
    entity: Rc<Entity>,
    bar: AddressWindow,
    memory: Rc<RefCell<SparseMemory>>,
    handled: Rc<Cell<usize>>,
    rx: InPort<Tlp>,
    response: OutPort<Tlp>,
) -> SimResult {
    loop {
        let tlp = rx.get()?.await;
        if !tlp.kind().is_request() {
            return protocol_violation!(entity ; "{tlp} on PIO request path");
        }
        if !bar.contains_access(tlp.address(), tlp.length_bytes()) {
            return protocol_violation!(entity ; "PIO {tlp} outside BAR {bar}");
        }

        let offset = tlp.address() - bar.start();
        handled.set(handled.get() + 1);
        let reply = match tlp.kind() {
            TlpKind::MemRead => {
                let data = memory.borrow().read(offset, tlp.length_bytes())?;
                Some(tlp.completion(&entity, data))
            }
            TlpKind::MemWrite => {
                memory.borrow_mut().write(offset, tlp.data())?;
                None
            }
            TlpKind::MemWriteNonPosted => {
                memory.borrow_mut().write(offset, tlp.data())?;
                Some(tlp.completion(&entity, Vec::new()))
            }
            TlpKind::Completion | TlpKind::CompletionData => None,
        };
        debug!(entity ; "PIO {}", tlp);

        if let Some(reply) = reply {
            response.put(reply)?.await;
        }
    }
}

struct Interrupt {
    line: u8,
    pin: u8,
    done: Once,
}

async fn run_dma_completions(
    entity: Rc<Entity>,
    bdf: Bdf,
    program: Vec<DmaOp>,
    dma: Rc<DmaState>,
    interrupt: Interrupt,
    rx: InPort<Tlp>,
) -> SimResult {
    loop {
        let tlp = rx.get()?.await;
        if !tlp.kind().is_completion() || tlp.requester() != bdf {
            return protocol_violation!(entity ; "{tlp} is not a completion for {bdf}");
        }
        let index = dma.outstanding.borrow_mut().remove(&tlp.tag());
        let Some(index) = index else {
            return protocol_violation!(entity ; "{tlp} has unknown tag");
        };

        let data = match program.get(index) {
            Some(DmaOp::Read { size, .. }) => {
                if tlp.kind() != TlpKind::CompletionData || tlp.data().len() != *size {
                    return protocol_violation!(entity ; "{tlp} does not complete a {size} byte read");
                }
                tlp.into_data()
            }
            Some(DmaOp::Write { .. }) => {
                if tlp.kind() != TlpKind::Completion {
                    return protocol_violation!(entity ; "{tlp} does not complete a write");
                }
                Vec::new()
            }
            None => return sim_error!("{entity}: DMA index {index} outside program"),
        };

        dma.results.borrow_mut().push(DmaResult { index, data });
        dma.completed.set(dma.completed.get() + 1);
        dma.changed.notify()?;

        if dma.completed.get() == program.len() {
            info!(entity ; "DMA complete, raise interrupt line {} pin {}", interrupt.line, interrupt.pin);
            interrupt.done.notify()?;
        }
    }
}

impl FabricPorts for Endpoint {
    fn num_fabric_ports(&self) -> usize {
        1
    }

    fn connect_port_request_tx_i(&self, i: usize, port_state: PortStateResult<Tlp>) -> SimResult {
        if i != 0 {
            return sim_error!("{self}: no fabric port {i}");
        }
        connect_tx!(self.dma_tx, connect ; port_state)
    }

    fn port_request_rx_i(&self, i: usize) -> PortStateResult<Tlp> {
        if i != 0 {
            return sim_error!("{self}: no fabric port {i}");
        }
        port_rx!(self.pio_rx, state)
    }

    fn connect_port_response_tx_i(
        &self,
        i: usize,
        port_state: PortStateResult<Tlp>,
    ) -> SimResult {
        if i != 0 {
            return sim_error!("{self}: no fabric port {i}");
        }
        self.pio_delay.connect_port_tx(port_state)
    }

    fn port_response_rx_i(&self, i: usize) -> PortStateResult<Tlp> {
        if i != 0 {
            return sim_error!("{self}: no fabric port {i}");
        }
        port_rx!(self.dma_rx, state)
    }
}
