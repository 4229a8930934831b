// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Merge a number of inputs onto one output.
//!
//! Every input parks at most one value in its slot. Whenever the output is
//! free the [Arbitrate] policy picks one of the full slots. Inputs with a full
//! slot are back-pressured.
//!
//! # Ports
//!
//! This component has the following ports:
//!  - N [input ports](lanes_engine::port::InPort): `rx[i]` for `i in [0,
//!    N-1]`
//!  - One [output port](lanes_engine::port::OutPort): `tx`

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use lanes_engine::engine::Engine;
use lanes_engine::events::repeated::Repeated;
use lanes_engine::executor::Spawner;
use lanes_engine::port::{InPort, OutPort, PortStateResult};
use lanes_engine::sim_error;
use lanes_engine::traits::{Event, Runnable, SimObject};
use lanes_engine::types::{SimError, SimResult};
use lanes_model_builder::{EntityDisplay, EntityGet};
use lanes_track::entity::Entity;
use lanes_track::{enter, exit, trace};

use crate::{connect_tx, take_option};

pub mod policy;

/// Chooses which input is granted next.
pub trait Arbitrate {
    /// `ready[i]` is true when input `i` has a value waiting. Returns the
    /// input to grant, if any.
    fn grant(&mut self, ready: &[bool]) -> Option<usize>;
}

struct Slots<T> {
    values: RefCell<Vec<Option<T>>>,

    /// Notified whenever a slot is filled or emptied.
    changed: Repeated,
}

impl<T> Slots<T>
where
    T: SimObject,
{
    fn is_full(&self, index: usize) -> bool {
        self.values.borrow()[index].is_some()
    }

    fn take_granted(&self, policy: &mut dyn Arbitrate) -> Option<(usize, T)> {
        let mut values = self.values.borrow_mut();
        let ready: Vec<bool> = values.iter().map(Option::is_some).collect();
        let index = policy.grant(&ready)?;
        values.get_mut(index)?.take().map(|value| (index, value))
    }

    async fn fill_from(&self, entity: Rc<Entity>, index: usize, rx: InPort<T>) -> SimResult {
        loop {
            let value = rx.get()?.await;
            enter!(entity ; value.id());
            while self.is_full(index) {
                self.changed.listen().await;
            }
            self.values.borrow_mut()[index] = Some(value);
            self.changed.notify()?;
        }
    }
}

#[derive(EntityDisplay, EntityGet)]
pub struct Arbiter<T>
where
    T: SimObject,
{
    pub entity: Rc<Entity>,
    spawner: Spawner,
    rx: RefCell<Vec<InPort<T>>>,
    tx: RefCell<Option<OutPort<T>>>,
    policy: RefCell<Option<Box<dyn Arbitrate>>>,
    slots: Rc<Slots<T>>,
}

impl<T> Arbiter<T>
where
    T: SimObject,
{
    pub fn new_and_register(
        engine: &Engine,
        parent: &Rc<Entity>,
        name: &str,
        num_rx: usize,
        policy: Box<dyn Arbitrate>,
    ) -> Result<Rc<Self>, SimError> {
        let entity = Rc::new(Entity::new(parent, name));
        let rx = (0..num_rx)
            .map(|i| InPort::new(&entity, &format!("rx_{i}")))
            .collect();
        let tx = OutPort::new(&entity, "tx");
        let slots = Slots {
            values: RefCell::new((0..num_rx).map(|_| None).collect()),
            changed: Repeated::default(),
        };
        let rc_self = Rc::new(Self {
            entity,
            spawner: engine.spawner(),
            rx: RefCell::new(rx),
            tx: RefCell::new(Some(tx)),
            policy: RefCell::new(Some(policy)),
            slots: Rc::new(slots),
        });
        engine.register(rc_self.clone());
        Ok(rc_self)
    }

    pub fn connect_port_tx(&self, port_state: PortStateResult<T>) -> SimResult {
        connect_tx!(self.tx, connect ; port_state)
    }

    pub fn port_rx_i(&self, i: usize) -> PortStateResult<T> {
        match self.rx.borrow().get(i) {
            Some(rx) => rx.state(),
            None => sim_error!("{self}: no rx port {i}"),
        }
    }

    #[must_use]
    pub fn num_rx(&self) -> usize {
        self.slots.values.borrow().len()
    }
}

#[async_trait(?Send)]
impl<T> Runnable for Arbiter<T>
where
    T: SimObject,
{
    async fn run(&self) -> SimResult {
        let inputs: Vec<InPort<T>> = self.rx.borrow_mut().drain(..).collect();
        for (i, rx) in inputs.into_iter().enumerate() {
            let entity = self.entity.clone();
            let slots = self.slots.clone();
            self.spawner
                .spawn(async move { slots.fill_from(entity, i, rx).await });
        }

        let tx = take_option!(self.tx);
        let mut policy = take_option!(self.policy);
        loop {
            match self.slots.take_granted(policy.as_mut()) {
                Some((i, value)) => {
                    trace!(self.entity ; "grant {}: {}", i, value);
                    self.slots.changed.notify()?;
                    exit!(self.entity ; value.id());
                    tx.put(value)?.await;
                }
                None => self.slots.changed.listen().await,
            }
        }
    }
}
