// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Address windows and the routing tables built from them.

use std::collections::BTreeMap;
use std::fmt;

use lanes_engine::sim_error;
use lanes_engine::types::{SimError, SimResult};

/// A half-open address range `[start, start + size)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AddressWindow {
    start: u64,
    size: u64,
}

impl AddressWindow {
    /// Returns an error for empty windows or ones that wrap the address
    /// space.
    pub fn new(start: u64, size: u64) -> Result<Self, SimError> {
        if size == 0 {
            return sim_error!("empty window at 0x{start:x}");
        }
        if start.checked_add(size - 1).is_none() {
            return sim_error!("window at 0x{start:x} of 0x{size:x} bytes wraps");
        }
        Ok(Self { start, size })
    }

    #[must_use]
    pub fn start(&self) -> u64 {
        self.start
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The last address inside the window.
    #[must_use]
    pub fn last(&self) -> u64 {
        self.start + (self.size - 1)
    }

    #[must_use]
    pub fn contains(&self, address: u64) -> bool {
        address >= self.start && address <= self.last()
    }

    /// True if the whole access lies inside the window.
    #[must_use]
    pub fn contains_access(&self, address: u64, length: usize) -> bool {
        if length == 0 {
            return self.contains(address);
        }
        match address.checked_add(length as u64 - 1) {
            Some(end) => self.contains(address) && end <= self.last(),
            None => false,
        }
    }

    #[must_use]
    pub fn overlaps(&self, other: &AddressWindow) -> bool {
        self.start <= other.last() && other.start <= self.last()
    }
}

impl fmt::Display for AddressWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:x}, 0x{:x}]", self.start, self.last())
    }
}

/// Map disjoint address windows to port indices.
#[derive(Clone, Debug, Default)]
pub struct RoutingTable {
    // key = start address of window
    entries: BTreeMap<u64, (AddressWindow, usize)>,
}

impl RoutingTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `window` to `port`. Windows must not overlap.
    pub fn insert(&mut self, window: AddressWindow, port: usize) -> SimResult {
        let prev = self.entries.range(..=window.start()).next_back();
        let next = self.entries.range(window.start()..).next();
        for (_, (existing, _)) in prev.into_iter().chain(next) {
            if existing.overlaps(&window) {
                return sim_error!("{window} overlaps {existing}");
            }
        }
        self.entries.insert(window.start(), (window, port));
        Ok(())
    }

    #[must_use]
    pub fn lookup(&self, address: u64) -> Option<usize> {
        let (_, (window, port)) = self.entries.range(..=address).next_back()?;
        window.contains(address).then_some(*port)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &(AddressWindow, usize)> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(start: u64, size: u64) -> AddressWindow {
        AddressWindow::new(start, size).unwrap()
    }

    #[test]
    fn lookup() {
        let mut table = RoutingTable::new();
        table.insert(window(0x1000, 0x1000), 1).unwrap();
        table.insert(window(0x4000, 0x100), 2).unwrap();

        assert_eq!(table.lookup(0x0fff), None);
        assert_eq!(table.lookup(0x1000), Some(1));
        assert_eq!(table.lookup(0x1fff), Some(1));
        assert_eq!(table.lookup(0x2000), None);
        assert_eq!(table.lookup(0x40ff), Some(2));
        assert_eq!(table.lookup(0x4100), None);
    }

    #[test]
    fn overlap_rejected() {
        let mut table = RoutingTable::new();
        table.insert(window(0x1000, 0x1000), 1).unwrap();
        assert!(table.insert(window(0x1800, 0x1000), 2).is_err());
        assert!(table.insert(window(0x0800, 0x1000), 2).is_err());
        assert!(table.insert(window(0x2000, 0x1000), 2).is_ok());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn windows() {
        assert!(AddressWindow::new(0x1000, 0).is_err());
        assert!(AddressWindow::new(u64::MAX, 2).is_err());

        let w = window(0x1000, 0x100);
        assert!(w.contains_access(0x10fc, 4));
        assert!(!w.contains_access(0x10fd, 4));
        assert_eq!(w.to_string(), "[0x1000, 0x10ff]");
    }
}
