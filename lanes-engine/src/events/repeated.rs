// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! An event that can be triggered multiple times.

use std::rc::Rc;

use super::{EventState, Listen};
use crate::traits::Event;
use crate::types::SimResult;

#[derive(Clone, Default)]
pub struct Repeated {
    state: Rc<EventState>,
}

impl Repeated {
    pub fn notify(&self) -> SimResult {
        self.state.fire();
        Ok(())
    }
}

impl Event for Repeated {
    /// Notifications made before this call are not seen by the listener.
    fn listen(&self) -> Listen {
        self.state.listen_for(self.state.generation.get() + 1)
    }
}
