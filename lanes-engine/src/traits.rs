// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! A set of common traits used across the LANES engine.

use core::mem::size_of;
use std::fmt::{Debug, Display};

use async_trait::async_trait;
use lanes_track::Unique;

use crate::events::Listen;
use crate::types::SimResult;

/// The `TotalBytes` trait is used to determine how many bytes an object
/// represents
///
/// This trait is used to determine how much time an object will take to be
/// sent.
pub trait TotalBytes {
    fn total_bytes(&self) -> usize;
}

/// A super-trait that objects that are passed around the simulation have to
/// implement
///
///  - Clone:       Allows the application to keep copies of objects sent
///    around.
///  - Debug/Display: Allows objects to be logged.
///  - TotalBytes:  Allows rate limiting.
///  - Unique:      Allows objects to be tracked.
///  - 'static:     Futures require the objects they hold to be `'static`.
pub trait SimObject:
    Clone + Debug + Display + Unique + TotalBytes + 'static
{
}

// Implementations for basic types that can be sent around the simulation for
// testing

impl TotalBytes for i32 {
    fn total_bytes(&self) -> usize {
        size_of::<i32>()
    }
}

impl SimObject for i32 {}

impl TotalBytes for usize {
    fn total_bytes(&self) -> usize {
        size_of::<usize>()
    }
}

impl SimObject for usize {}

/// Something a task can wait on.
pub trait Event {
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    fn listen(&self) -> Listen;
}

/// The trait implemented by all components that the
/// [`Engine`](crate::engine::Engine) runs.
///
/// Components with nothing to do at run time keep the default.
#[async_trait(?Send)]
pub trait Runnable {
    async fn run(&self) -> SimResult {
        Ok(())
    }
}
