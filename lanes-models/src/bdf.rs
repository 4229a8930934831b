// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! PCI bus/device/function addresses.

use std::fmt;

pub const MAX_DEVICE: u8 = 31;
pub const MAX_FUNCTION: u8 = 7;

/// Bus, Device, Function.
///
/// Identifies a requester or completer on the fabric.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bdf {
    bus: u8,
    device: u8,
    function: u8,
}

impl Bdf {
    /// The requester ID used by the root complex for host-originated
    /// transactions.
    pub const HOST: Bdf = Bdf {
        bus: 0,
        device: 0,
        function: 0,
    };

    /// Returns `None` if the device or function are out of range.
    #[must_use]
    pub const fn new(bus: u8, device: u8, function: u8) -> Option<Self> {
        if device > MAX_DEVICE || function > MAX_FUNCTION {
            return None;
        }
        Some(Self {
            bus,
            device,
            function,
        })
    }

    #[must_use]
    pub fn bus(&self) -> u8 {
        self.bus
    }

    #[must_use]
    pub fn device(&self) -> u8 {
        self.device
    }

    #[must_use]
    pub fn function(&self) -> u8 {
        self.function
    }

    /// The 16-bit routing ID carried in TLP headers.
    #[must_use]
    pub fn routing_id(&self) -> u16 {
        (u16::from(self.bus) << 8) | (u16::from(self.device) << 3) | u16::from(self.function)
    }
}

impl fmt::Display for Bdf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}:{:02x}.{:x}", self.bus, self.device, self.function)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges() {
        assert!(Bdf::new(255, 31, 7).is_some());
        assert!(Bdf::new(0, 32, 0).is_none());
        assert!(Bdf::new(0, 0, 8).is_none());
    }

    #[test]
    fn display_and_routing_id() {
        let bdf = Bdf::new(3, 2, 1).unwrap();
        assert_eq!(bdf.to_string(), "03:02.1");
        assert_eq!(bdf.routing_id(), 0x0311);
        assert_eq!(Bdf::HOST.to_string(), "00:00.0");
    }
}
