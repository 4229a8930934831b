// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! An event that can only be triggered once

use std::rc::Rc;

use super::{EventState, Listen};
use crate::sim_error;
use crate::traits::Event;
use crate::types::SimResult;

#[derive(Clone, Default)]
pub struct Once {
    state: Rc<EventState>,
}

impl Once {
    /// Trigger the event, waking all listeners.
    pub fn notify(&self) -> SimResult {
        if self.is_triggered() {
            return sim_error!("once event already triggered");
        }
        self.state.fire();
        Ok(())
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.state.generation.get() > 0
    }
}

impl Event for Once {
    fn listen(&self) -> Listen {
        self.state.listen_for(1)
    }
}
