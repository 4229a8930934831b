// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Steers each value from one input to one of several outputs.
//!
//! The choice is made by a [Route]. A route that returns an error stops the
//! simulation, which is how models report values that have nowhere to go.
//!
//! # Ports
//!
//! This component has:
//!  - One [input port](lanes_engine::port::InPort): `rx`
//!  - N [output ports](lanes_engine::port::OutPort): `tx[i]`

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

use async_trait::async_trait;
use lanes_engine::engine::Engine;
use lanes_engine::port::{InPort, OutPort, PortStateResult};
use lanes_engine::sim_error;
use lanes_engine::traits::{Runnable, SimObject};
use lanes_engine::types::{SimError, SimResult};
use lanes_model_builder::{EntityDisplay, EntityGet};
use lanes_track::entity::Entity;
use lanes_track::{enter, exit, trace};

use crate::{port_rx, take_option};

/// Picks the output a value leaves by.
pub trait Route<T> {
    fn route(&self, value: &T) -> Result<usize, SimError>;
}

impl<T, F> Route<T> for F
where
    F: Fn(&T) -> Result<usize, SimError>,
{
    fn route(&self, value: &T) -> Result<usize, SimError> {
        self(value)
    }
}

#[derive(EntityDisplay, EntityGet)]
pub struct Router<T>
where
    T: SimObject,
{
    pub entity: Rc<Entity>,
    rx: RefCell<Option<InPort<T>>>,
    tx: RefCell<Vec<OutPort<T>>>,
    route: Box<dyn Route<T>>,
}

impl<T> Router<T>
where
    T: SimObject,
{
    pub fn new_and_register(
        engine: &Engine,
        parent: &Rc<Entity>,
        name: &str,
        num_tx: usize,
        route: Box<dyn Route<T>>,
    ) -> Result<Rc<Self>, SimError> {
        let entity = Rc::new(Entity::new(parent, name));
        let rx = InPort::new(&entity, "rx");
        let tx = (0..num_tx)
            .map(|i| OutPort::new(&entity, &format!("tx_{i}")))
            .collect();
        let rc_self = Rc::new(Self {
            entity,
            rx: RefCell::new(Some(rx)),
            tx: RefCell::new(tx),
            route,
        });
        engine.register(rc_self.clone());
        Ok(rc_self)
    }

    pub fn connect_port_tx_i(&self, i: usize, port_state: PortStateResult<T>) -> SimResult {
        let mut tx = self.tx.borrow_mut();
        let Some(port) = tx.get_mut(i) else {
            return sim_error!("{self}: no tx port {i}");
        };
        port.connect(port_state)
    }

    pub fn port_rx(&self) -> PortStateResult<T> {
        port_rx!(self.rx, state)
    }
}

#[async_trait(?Send)]
impl<T> Runnable for Router<T>
where
    T: SimObject,
{
    async fn run(&self) -> SimResult {
        let tx = mem::take(&mut *self.tx.borrow_mut());
        let rx = take_option!(self.rx);

        loop {
            let value = rx.get()?.await;
            enter!(self.entity ; value.id());

            let i = self.route.route(&value)?;
            let Some(port) = tx.get(i) else {
                return sim_error!("{self}: {value:?} selected invalid egress index {i}");
            };
            trace!(self.entity ; "{value} to {port}");
            exit!(self.entity ; value.id());
            port.put(value)?.await;
        }
    }
}
