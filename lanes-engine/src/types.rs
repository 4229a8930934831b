// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Errors and the component handle shared by every crate.

use std::rc::Rc;

use thiserror::Error;

use crate::traits::Runnable;

/// A component the [`Engine`](crate::engine::Engine) spawns when a run
/// starts.
pub type Component = Rc<dyn Runnable>;

/// Return `Err(SimError)` with a formatted message.
#[macro_export]
macro_rules! sim_error {
    ($($arg:tt)+) => {
        Err($crate::types::SimError(format!($($arg)+)))
    };
}

/// Anything that stops a simulation. The message names the entity at fault.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("Error: {0}")]
pub struct SimError(pub String);

pub type SimResult = Result<(), SimError>;
