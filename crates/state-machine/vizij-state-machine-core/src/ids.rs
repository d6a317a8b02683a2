//! Identifiers and simple allocators for machine-owned handles.

use serde::{Deserialize, Serialize};

/// Handle returned by [`crate::EventBus::subscribe`]; pass it back to unsubscribe.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ListenerId(pub u32);

/// Monotonic allocator for ListenerId.
/// IDs are never reused within one bus, even after unsubscribe.
#[derive(Default, Debug)]
pub struct IdAllocator {
    next_listener: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_listener(&mut self) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener = self.next_listener.wrapping_add(1);
        id
    }

    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
