// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Provide an effective bandwidth limit for a component.
//!
//! A [RateLimiter] is given a [clock](lanes_engine::time::clock::Clock) and a
//! rate in bits per tick and works out how long a [TotalBytes] value
//! occupies an interface. Limiters are immutable, so one built with
//! [rc_limiter!](crate::rc_limiter) is shared by every channel of a link.
//!
//! ```rust
//! # use lanes_components::rc_limiter;
//! # use lanes_engine::engine::Engine;
//! # use lanes_track::tracker::dev_null_tracker;
//! let mut engine = Engine::new(&dev_null_tracker());
//! let clock = engine.clock_ghz(1.0);
//! let limiter = rc_limiter!(clock, 16);
//!
//! // A 4-byte value takes 2 ticks at 16 bits per tick
//! assert_eq!(limiter.ticks(&7_i32), 2);
//! ```

use lanes_engine::time::clock::Clock;
use lanes_engine::traits::TotalBytes;

/// Create a [RateLimiter] wrapped in an [Rc](std::rc::Rc).
#[macro_export]
macro_rules! rc_limiter {
    ($clock:expr, $bits_per_tick:expr) => {
        std::rc::Rc::new($crate::rate_limiter::RateLimiter::new($clock, $bits_per_tick))
    };
}

#[derive(Clone)]
pub struct RateLimiter {
    clock: Clock,

    /// Never zero.
    bits_per_tick: usize,
}

impl RateLimiter {
    /// A rate of zero is raised to one bit per tick.
    #[must_use]
    pub fn new(clock: Clock, bits_per_tick: usize) -> Self {
        Self {
            clock,
            bits_per_tick: bits_per_tick.max(1),
        }
    }

    /// Hold the caller for as long as `value` occupies the interface.
    pub async fn delay<T: TotalBytes>(&self, value: &T) {
        self.clock.wait_ticks(self.ticks(value) as u64).await;
    }

    /// Whole ticks needed to send `value`, rounded up.
    #[must_use]
    pub fn ticks<T: TotalBytes>(&self, value: &T) -> usize {
        (value.total_bytes() * 8).div_ceil(self.bits_per_tick)
    }

    #[must_use]
    pub fn bits_per_tick(&self) -> usize {
        self.bits_per_tick
    }
}
