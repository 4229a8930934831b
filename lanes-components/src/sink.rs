// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Accepts and counts everything sent to it.
//!
//! # Ports
//!
//! This component has:
//!  - One [input port](lanes_engine::port::InPort): `rx`

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use async_trait::async_trait;
use lanes_engine::engine::Engine;
use lanes_engine::port::{InPort, PortStateResult};
use lanes_engine::traits::{Runnable, SimObject};
use lanes_engine::types::{SimError, SimResult};
use lanes_model_builder::{EntityDisplay, EntityGet};
use lanes_track::enter;
use lanes_track::entity::Entity;

use crate::{port_rx, take_option};

#[derive(EntityDisplay, EntityGet)]
pub struct Sink<T>
where
    T: SimObject,
{
    pub entity: Rc<Entity>,
    num_sunk: Cell<usize>,
    record: Cell<bool>,
    values: RefCell<Vec<T>>,
    rx: RefCell<Option<InPort<T>>>,
}

impl<T> Sink<T>
where
    T: SimObject,
{
    pub fn new_and_register(
        engine: &Engine,
        parent: &Rc<Entity>,
        name: &str,
    ) -> Result<Rc<Self>, SimError> {
        let entity = Rc::new(Entity::new(parent, name));
        let rx = InPort::new(&entity, "rx");
        let rc_self = Rc::new(Self {
            entity,
            num_sunk: Cell::new(0),
            record: Cell::new(false),
            values: RefCell::new(Vec::new()),
            rx: RefCell::new(Some(rx)),
        });
        engine.register(rc_self.clone());
        Ok(rc_self)
    }

    /// Keep every value received from now on.
    pub fn record_values(&self) {
        self.record.set(true);
    }

    pub fn port_rx(&self) -> PortStateResult<T> {
        port_rx!(self.rx, state)
    }

    #[must_use]
    pub fn num_sunk(&self) -> usize {
        self.num_sunk.get()
    }

    #[must_use]
    pub fn values(&self) -> Vec<T> {
        self.values.borrow().clone()
    }
}

#[async_trait(?Send)]
impl<T> Runnable for Sink<T>
where
    T: SimObject,
{
    async fn run(&self) -> SimResult {
        let rx = take_option!(self.rx);
        loop {
            let value = rx.get()?.await;
            enter!(self.entity ; value.id());
            self.num_sunk.set(self.num_sunk.get() + 1);
            if self.record.get() {
                self.values.borrow_mut().push(value);
            }
        }
    }
}
