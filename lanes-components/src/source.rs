// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Sends a fixed sequence of values and then finishes.
//!
//! # Ports
//!
//! This component has:
//!  - One [output port](lanes_engine::port::OutPort): `tx`

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use lanes_engine::engine::Engine;
use lanes_engine::port::{OutPort, PortStateResult};
use lanes_engine::traits::{Runnable, SimObject};
use lanes_engine::types::{SimError, SimResult};
use lanes_model_builder::{EntityDisplay, EntityGet};
use lanes_track::entity::Entity;
use lanes_track::exit;

use crate::{connect_tx, take_option};

type Values<T> = Box<dyn Iterator<Item = T>>;

#[derive(EntityDisplay, EntityGet)]
pub struct Source<T>
where
    T: SimObject,
{
    pub entity: Rc<Entity>,
    values: RefCell<Option<Values<T>>>,
    tx: RefCell<Option<OutPort<T>>>,
}

impl<T> Source<T>
where
    T: SimObject,
{
    /// A source that sends everything `values` yields. Pass an empty
    /// collection for a source that never sends.
    pub fn new_and_register<I>(
        engine: &Engine,
        parent: &Rc<Entity>,
        name: &str,
        values: I,
    ) -> Result<Rc<Self>, SimError>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        let entity = Rc::new(Entity::new(parent, name));
        let tx = OutPort::new(&entity, "tx");
        let rc_self = Rc::new(Self {
            entity,
            values: RefCell::new(Some(Box::new(values.into_iter()))),
            tx: RefCell::new(Some(tx)),
        });
        engine.register(rc_self.clone());
        Ok(rc_self)
    }

    pub fn connect_port_tx(&self, port_state: PortStateResult<T>) -> SimResult {
        connect_tx!(self.tx, connect ; port_state)
    }
}

#[async_trait(?Send)]
impl<T> Runnable for Source<T>
where
    T: SimObject,
{
    async fn run(&self) -> SimResult {
        let values = take_option!(self.values);
        let tx = take_option!(self.tx);
        for value in values {
            exit!(self.entity ; value.id());
            tx.put(value)?.await;
        }
        Ok(())
    }
}
