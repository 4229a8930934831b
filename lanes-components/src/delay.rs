// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! A component that adds `delay_ticks` between receiving anything and sending
//! it on to its output.
//!
//! Values wait in a queue stamped with the tick they are due to leave, so a
//! value can be accepted every tick even when the latency is several ticks.
//! Input is back-pressured once `delay_ticks` values are in flight.
//!
//! # Ports
//!
//! This component has the following ports:
//!  - One [input port](lanes_engine::port::InPort): `rx`
//!  - One [output port](lanes_engine::port::OutPort): `tx`
//!
//! # Example
//!
//! ```rust
//! # use lanes_components::delay::Delay;
//! # use lanes_components::sink::Sink;
//! # use lanes_components::source::Source;
//! # use lanes_components::connect_port;
//! # use lanes_engine::run_simulation;
//! # use lanes_engine::test_helpers::start_test;
//! # use lanes_engine::types::SimResult;
//! #
//! # fn source_sink() -> SimResult {
//! #     let mut engine = start_test(file!());
//! #     let clock = engine.default_clock();
//! #     let top = engine.top().clone();
//! let source = Source::new_and_register(&engine, &top, "source", std::iter::repeat_n(500, 30))?;
//! let delay = Delay::new_and_register(&engine, &clock, &top, "delay", 3)?;
//! let sink = Sink::new_and_register(&engine, &top, "sink")?;
//!
//! connect_port!(source, tx => delay, rx)?;
//! connect_port!(delay, tx => sink, rx)?;
//!
//! run_simulation!(engine);
//! assert_eq!(sink.num_sunk(), 30);
//! #     Ok(())
//! # }
//! # source_sink().unwrap();
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use async_trait::async_trait;
use lanes_engine::engine::Engine;
use lanes_engine::events::repeated::Repeated;
use lanes_engine::executor::Spawner;
use lanes_engine::port::{InPort, OutPort, PortStateResult};
use lanes_engine::time::clock::Clock;
use lanes_engine::traits::{Event, Runnable, SimObject};
use lanes_engine::types::{SimError, SimResult};
use lanes_model_builder::{EntityDisplay, EntityGet};
use lanes_track::entity::Entity;
use lanes_track::{enter, exit};

use crate::{connect_tx, port_rx, take_option};

/// Values in flight with the tick each is due out.
struct InFlight<T> {
    queue: RefCell<VecDeque<(T, u64)>>,

    /// Notified whenever a value is added or removed.
    changed: Repeated,
}

impl<T> InFlight<T>
where
    T: SimObject,
{
    fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    fn next_due(&self) -> Option<u64> {
        self.queue.borrow().front().map(|(_, due)| *due)
    }

    async fn drain_to(&self, entity: Rc<Entity>, clock: Clock, tx: OutPort<T>) -> SimResult {
        loop {
            let Some(due) = self.next_due() else {
                self.changed.listen().await;
                continue;
            };
            let now = clock.tick_now();
            if due > now {
                clock.wait_ticks(due - now).await;
            }

            let Some((value, _)) = self.queue.borrow_mut().pop_front() else {
                continue;
            };
            exit!(entity ; value.id());
            tx.put(value)?.await;
            self.changed.notify()?;
        }
    }
}

#[derive(EntityDisplay, EntityGet)]
pub struct Delay<T>
where
    T: SimObject,
{
    pub entity: Rc<Entity>,
    spawner: Spawner,
    clock: Clock,
    delay_ticks: usize,
    rx: RefCell<Option<InPort<T>>>,
    tx: RefCell<Option<OutPort<T>>>,
    in_flight: Rc<InFlight<T>>,
}

impl<T> Delay<T>
where
    T: SimObject,
{
    pub fn new_and_register(
        engine: &Engine,
        clock: &Clock,
        parent: &Rc<Entity>,
        name: &str,
        delay_ticks: usize,
    ) -> Result<Rc<Self>, SimError> {
        let entity = Rc::new(Entity::new(parent, name));
        let rx = InPort::new(&entity, "rx");
        let tx = OutPort::new(&entity, "tx");
        let rc_self = Rc::new(Self {
            entity,
            spawner: engine.spawner(),
            clock: clock.clone(),
            delay_ticks,
            rx: RefCell::new(Some(rx)),
            tx: RefCell::new(Some(tx)),
            in_flight: Rc::new(InFlight {
                queue: RefCell::new(VecDeque::new()),
                changed: Repeated::default(),
            }),
        });
        engine.register(rc_self.clone());
        Ok(rc_self)
    }

    pub fn connect_port_tx(&self, port_state: PortStateResult<T>) -> SimResult {
        connect_tx!(self.tx, connect ; port_state)
    }

    pub fn port_rx(&self) -> PortStateResult<T> {
        port_rx!(self.rx, state)
    }

    #[must_use]
    pub fn delay_ticks(&self) -> usize {
        self.delay_ticks
    }
}

#[async_trait(?Send)]
impl<T> Runnable for Delay<T>
where
    T: SimObject,
{
    async fn run(&self) -> SimResult {
        let tx = take_option!(self.tx);
        let in_flight = self.in_flight.clone();
        let entity = self.entity.clone();
        let clock = self.clock.clone();
        self.spawner
            .spawn(async move { in_flight.drain_to(entity, clock, tx).await });

        let rx = take_option!(self.rx);
        let max_in_flight = self.delay_ticks.max(1);
        loop {
            let value = rx.get()?.await;
            enter!(self.entity ; value.id());

            let due = self.clock.tick_now() + self.delay_ticks as u64;
            self.in_flight.queue.borrow_mut().push_back((value, due));
            self.in_flight.changed.notify()?;

            while self.in_flight.len() >= max_in_flight {
                self.in_flight.changed.listen().await;
            }
        }
    }
}
