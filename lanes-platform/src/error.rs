// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Topology errors.
//!
//! Validation reports every problem it finds rather than stopping at the
//! first one, so errors are returned as a [`TopologyErrors`] set.

use std::fmt;

use lanes_engine::types::SimError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TopologyError {
    #[error("unable to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("unable to parse topology: {0}")]
    Parse(String),

    #[error("duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },

    #[error("{component} has no downstream ports")]
    NoDownstreamPorts { component: String },

    #[error("link {link}: cannot parse binding '{binding}'")]
    InvalidBinding { link: String, binding: String },

    #[error("link {link}: no component for '{binding}'")]
    UnknownComponent { link: String, binding: String },

    #[error("link {link}: invalid port '{binding}': {reason}")]
    InvalidPort {
        link: String,
        binding: String,
        reason: String,
    },

    #[error("{binding} bound to both {first} and {second}")]
    PortBoundTwice {
        binding: String,
        first: String,
        second: String,
    },

    #[error("dangling port {binding}")]
    DanglingPort { binding: String },

    #[error("link {link} connects {component} to itself")]
    SelfLoop { link: String, component: String },

    #[error("link {link}: {problem}")]
    InvalidLink { link: String, problem: String },

    #[error("endpoint {endpoint}: invalid BDF {bus}:{device}.{function}")]
    InvalidBdf {
        endpoint: String,
        bus: u32,
        device: u32,
        function: u32,
    },

    #[error("endpoint {endpoint}: BDF {bdf} is the host requester ID")]
    ReservedBdf { endpoint: String, bdf: String },

    #[error("endpoints {first} and {second} share BDF {bdf}")]
    DuplicateBdf {
        bdf: String,
        first: String,
        second: String,
    },

    #[error("endpoint {endpoint}: invalid interrupt pin {pin}")]
    InvalidInterruptPin { endpoint: String, pin: u8 },

    #[error("endpoint {endpoint}: invalid BAR: {reason}")]
    InvalidWindow { endpoint: String, reason: String },

    #[error("BARs of {first} and {second} overlap")]
    OverlappingWindows { first: String, second: String },

    #[error("{owner}: program entry {index} moves {bytes} bytes over link {link} with max payload {max_payload}")]
    PayloadTooLarge {
        owner: String,
        index: usize,
        bytes: u64,
        link: String,
        max_payload: usize,
    },

    #[error("{component} is not reachable from the root complex")]
    Unreachable { component: String },

    #[error("{owner}: {reason}")]
    InvalidParameter { owner: String, reason: String },

    #[error("{0}")]
    Construction(String),
}

impl From<SimError> for TopologyError {
    fn from(error: SimError) -> Self {
        TopologyError::Construction(error.0)
    }
}

/// Every problem found with a topology.
#[derive(Debug, Default, PartialEq)]
pub struct TopologyErrors(pub Vec<TopologyError>);

impl TopologyErrors {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn push(&mut self, error: TopologyError) {
        self.0.push(error);
    }

    pub fn iter(&self) -> impl Iterator<Item = &TopologyError> {
        self.0.iter()
    }

    /// True if any error satisfies `f`.
    pub fn contains(&self, f: impl Fn(&TopologyError) -> bool) -> bool {
        self.0.iter().any(f)
    }
}

impl fmt::Display for TopologyErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid topology ({} errors)", self.0.len())?;
        for error in &self.0 {
            write!(f, "\n  {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for TopologyErrors {}

impl From<TopologyError> for TopologyErrors {
    fn from(error: TopologyError) -> Self {
        TopologyErrors(vec![error])
    }
}

impl From<SimError> for TopologyErrors {
    fn from(error: SimError) -> Self {
        TopologyError::from(error).into()
    }
}

impl From<TopologyErrors> for SimError {
    fn from(errors: TopologyErrors) -> Self {
        SimError(errors.to_string())
    }
}
