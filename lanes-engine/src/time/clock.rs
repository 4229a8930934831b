// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Clocks and the futures used to wait on them.
//!
//! A [`Clock`] counts whole ticks at a fixed frequency. Waiting tasks are
//! kept per tick in a [`BTreeMap`], so the clock can always hand the
//! [`Timeline`](super::simtime::Timeline) its earliest waiters.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// A task blocked on a clock.
pub struct Waiter {
    pub waker: Waker,

    /// Background waiters never keep a simulation running on their own.
    pub background: bool,
}

#[derive(Default)]
struct ClockState {
    now: Cell<u64>,
    waiters: RefCell<BTreeMap<u64, Vec<Waiter>>>,
}

#[derive(Clone)]
pub struct Clock {
    freq_mhz: f64,
    state: Rc<ClockState>,
}

impl Clock {
    #[must_use]
    pub fn new(freq_mhz: f64) -> Self {
        Self {
            freq_mhz,
            state: Rc::new(ClockState::default()),
        }
    }

    #[must_use]
    pub fn freq_mhz(&self) -> f64 {
        self.freq_mhz
    }

    #[must_use]
    pub fn tick_now(&self) -> u64 {
        self.state.now.get()
    }

    #[must_use]
    pub fn time_now_ns(&self) -> f64 {
        self.ticks_to_ns(self.tick_now())
    }

    #[must_use]
    pub fn ticks_to_ns(&self, ticks: u64) -> f64 {
        ticks as f64 * 1000.0 / self.freq_mhz
    }

    /// Wait `ticks` clock ticks.
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn wait_ticks(&self, ticks: u64) -> TickWait {
        self.wait(ticks, false)
    }

    /// Wait `ticks` clock ticks unless the rest of the simulation finishes
    /// first, in which case the wait never completes.
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn wait_ticks_or_exit(&self, ticks: u64) -> TickWait {
        self.wait(ticks, true)
    }

    fn wait(&self, ticks: u64, background: bool) -> TickWait {
        TickWait {
            state: self.state.clone(),
            until: self.tick_now() + ticks,
            background,
            queued: false,
        }
    }

    pub(crate) fn next_wake_ns(&self) -> Option<f64> {
        let waiters = self.state.waiters.borrow();
        waiters.keys().next().map(|tick| self.ticks_to_ns(*tick))
    }

    /// Move to the earliest tick with waiters and return them.
    pub(crate) fn advance(&self) -> Option<Vec<Waiter>> {
        let (tick, waiters) = self.state.waiters.borrow_mut().pop_first()?;
        debug_assert!(tick >= self.state.now.get());
        self.state.now.set(tick);
        Some(waiters)
    }

    /// Catch up with time moved on by another clock. Never passes a tick
    /// that still has waiters.
    pub(crate) fn catch_up(&self, now_ns: f64) {
        let tick = (now_ns * self.freq_mhz / 1000.0 + 1e-9).floor() as u64;
        let next = self.state.waiters.borrow().keys().next().copied();
        let tick = next.map_or(tick, |next| tick.min(next));
        if tick > self.state.now.get() {
            self.state.now.set(tick);
        }
    }

    pub(crate) fn only_background_waiting(&self) -> bool {
        let waiters = self.state.waiters.borrow();
        waiters.values().flatten().all(|w| w.background)
    }
}

/// Future returned by [`Clock::wait_ticks`] and
/// [`Clock::wait_ticks_or_exit`].
pub struct TickWait {
    state: Rc<ClockState>,
    until: u64,
    background: bool,
    queued: bool,
}

impl Future for TickWait {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.queued {
            // Spurious wakes leave the waiter queued on the clock
            return if self.state.now.get() >= self.until {
                Poll::Ready(())
            } else {
                Poll::Pending
            };
        }

        let waiter = Waiter {
            waker: cx.waker().clone(),
            background: self.background,
        };
        self.state
            .waiters
            .borrow_mut()
            .entry(self.until)
            .or_default()
            .push(waiter);
        self.queued = true;
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_to_ns() {
        assert_eq!(Clock::new(1000.0).ticks_to_ns(1), 1.0);
        assert_eq!(Clock::new(0.5).ticks_to_ns(1), 2000.0);
        assert_eq!(Clock::new(250.0).ticks_to_ns(3), 12.0);
    }

    #[test]
    fn idle_clock_has_no_next_wake() {
        let clock = Clock::new(1000.0);
        assert_eq!(clock.next_wake_ns(), None);
        assert!(clock.advance().is_none());
        assert!(clock.only_background_waiting());
    }

    #[test]
    fn catch_up_rounds_down_to_whole_ticks() {
        let clock = Clock::new(250.0);
        clock.catch_up(11.0);
        assert_eq!(clock.tick_now(), 2);
        clock.catch_up(12.0);
        assert_eq!(clock.tick_now(), 3);
        clock.catch_up(4.0);
        assert_eq!(clock.tick_now(), 3);
    }
}
