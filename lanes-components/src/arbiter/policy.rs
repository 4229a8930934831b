// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Arbitration policies

use crate::arbiter::Arbitrate;

/// Grant inputs in turn, starting after the last input granted.
#[derive(Default)]
pub struct RoundRobin {
    next: usize,
}

impl RoundRobin {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Arbitrate for RoundRobin {
    fn grant(&mut self, ready: &[bool]) -> Option<usize> {
        let n = ready.len();
        let index = (self.next..self.next + n)
            .map(|i| i % n)
            .find(|&i| ready[i])?;
        self.next = (index + 1) % n;
        Some(index)
    }
}

/// Always grant the lowest-numbered input that has a value.
#[derive(Default)]
pub struct FixedPriority;

impl Arbitrate for FixedPriority {
    fn grant(&mut self, ready: &[bool]) -> Option<usize> {
        ready.iter().position(|&r| r)
    }
}
