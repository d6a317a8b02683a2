//! Output contract of [`crate::StateMachine::update`].
//!
//! Outputs carry the events emitted since the previous update returned,
//! including events raised by `start`/`trigger`/`go_to_state` between frames.
//! Listeners registered on the bus see the same events synchronously.

use serde::{Deserialize, Serialize};

use crate::events::{EventKind, MachineEvent};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Outputs {
    #[serde(default)]
    pub events: Vec<MachineEvent>,
}

impl Outputs {
    #[inline]
    pub fn clear(&mut self) {
        self.events.clear();
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }
}
