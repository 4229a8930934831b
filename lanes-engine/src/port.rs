// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Rendezvous ports used to connect components.
//!
//! An [`OutPort`] is connected to exactly one [`InPort`]. A `put` completes
//! once the value has been taken by the receiver, so a receiver that stops
//! calling `get` back-pressures the sender.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::{Future, poll_fn};
use std::rc::Rc;
use std::task::{Poll, Waker};

use lanes_track::connect;
use lanes_track::entity::Entity;

use crate::sim_error;
use crate::traits::SimObject;
use crate::types::{SimError, SimResult};

pub type PortStateResult<T> = Result<Rc<PortState<T>>, SimError>;

/// The single-value slot shared by a connected pair of ports.
pub struct PortState<T> {
    slot: RefCell<Option<T>>,
    receiver: RefCell<Option<Waker>>,
    sender: RefCell<Option<Waker>>,
    pub in_port_entity: Rc<Entity>,
}

fn wake(waker: &RefCell<Option<Waker>>) {
    if let Some(waker) = waker.borrow_mut().take() {
        waker.wake();
    }
}

pub struct InPort<T> {
    pub entity: Rc<Entity>,
    state: Rc<PortState<T>>,
    connected: Cell<bool>,
}

impl<T> fmt::Display for InPort<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.entity.fmt(f)
    }
}

impl<T> InPort<T>
where
    T: SimObject,
{
    #[must_use]
    pub fn new(parent: &Rc<Entity>, name: &str) -> Self {
        let entity = Rc::new(Entity::new(parent, name));
        let state = PortState {
            slot: RefCell::new(None),
            receiver: RefCell::new(None),
            sender: RefCell::new(None),
            in_port_entity: entity.clone(),
        };
        Self {
            entity,
            state: Rc::new(state),
            connected: Cell::new(false),
        }
    }

    /// Hand out the shared state so that an [`OutPort`] can connect.
    pub fn state(&self) -> PortStateResult<T> {
        if self.connected.replace(true) {
            return sim_error!("{self} already connected");
        }
        Ok(self.state.clone())
    }

    /// Take the next value, releasing its sender.
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn get(&self) -> Result<impl Future<Output = T> + use<T>, SimError> {
        if !self.connected.get() {
            return sim_error!("{self} not connected");
        }

        let state = self.state.clone();
        Ok(poll_fn(move |cx| {
            let value = state.slot.borrow_mut().take();
            match value {
                Some(value) => {
                    wake(&state.sender);
                    Poll::Ready(value)
                }
                None => {
                    *state.receiver.borrow_mut() = Some(cx.waker().clone());
                    Poll::Pending
                }
            }
        }))
    }
}

pub struct OutPort<T> {
    pub entity: Rc<Entity>,
    state: Option<Rc<PortState<T>>>,
}

impl<T> fmt::Display for OutPort<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.entity.fmt(f)
    }
}

impl<T> OutPort<T>
where
    T: SimObject,
{
    #[must_use]
    pub fn new(parent: &Rc<Entity>, name: &str) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, name)),
            state: None,
        }
    }

    pub fn connect(&mut self, port_state: PortStateResult<T>) -> SimResult {
        let port_state = port_state?;
        if self.state.is_some() {
            return sim_error!("{self} already connected");
        }

        connect!(self.entity ; port_state.in_port_entity);
        self.state = Some(port_state);
        Ok(())
    }

    /// Offer `value` to the receiver. Completes once it has been taken.
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn put(&self, value: T) -> Result<impl Future<Output = ()> + use<T>, SimError> {
        let Some(state) = self.state.clone() else {
            return sim_error!("{self} not connected");
        };

        let mut value = Some(value);
        Ok(poll_fn(move |cx| {
            let occupied = state.slot.borrow().is_some();
            match value.take() {
                Some(v) if !occupied => {
                    *state.slot.borrow_mut() = Some(v);
                    wake(&state.receiver);
                }
                Some(v) => value = Some(v),
                None if !occupied => return Poll::Ready(()),
                None => {}
            }
            *state.sender.borrow_mut() = Some(cx.waker().clone());
            Poll::Pending
        }))
    }
}
