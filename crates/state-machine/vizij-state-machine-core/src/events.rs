//! Typed lifecycle events and a synchronous publish/subscribe bus.

use std::fmt;
use std::rc::Rc;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::ids::{IdAllocator, ListenerId};

/// Closed set of lifecycle notifications.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    StateEnter,
    StateExit,
    TransitionStart,
    TransitionEnd,
    AnimationEnd,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::StateEnter,
        EventKind::StateExit,
        EventKind::TransitionStart,
        EventKind::TransitionEnd,
        EventKind::AnimationEnd,
    ];

    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            Self::StateEnter => "stateEnter",
            Self::StateExit => "stateExit",
            Self::TransitionStart => "transitionStart",
            Self::TransitionEnd => "transitionEnd",
            Self::AnimationEnd => "animationEnd",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

/// Event payload. `from`/`to` are set for transition events, `animation` for
/// `animationEnd`. `timestamp` is machine time in milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub state_machine_id: String,
    pub current_state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation: Option<String>,
    pub timestamp: f64,
}

pub type Listener = Rc<dyn Fn(&MachineEvent)>;

/// Listeners keyed by event kind, called in subscription order.
#[derive(Default)]
pub struct EventBus {
    ids: IdAllocator,
    listeners: HashMap<EventKind, Vec<(ListenerId, Listener)>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<(EventKind, usize)> = self
            .listeners
            .iter()
            .map(|(k, v)| (*k, v.len()))
            .collect();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, kind: EventKind, listener: impl Fn(&MachineEvent) + 'static) -> ListenerId {
        let id = self.ids.alloc_listener();
        self.listeners
            .entry(kind)
            .or_default()
            .push((id, Rc::new(listener)));
        id
    }

    /// Returns false when `id` is not subscribed to `kind`.
    pub fn unsubscribe(&mut self, kind: EventKind, id: ListenerId) -> bool {
        let Some(list) = self.listeners.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(lid, _)| *lid != id);
        before != list.len()
    }

    pub fn emit(&self, event: &MachineEvent) {
        if let Some(list) = self.listeners.get(&event.kind) {
            for (_, listener) in list {
                listener(event);
            }
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map(Vec::len).unwrap_or(0)
    }

    /// Drop every listener and restart id allocation.
    pub fn clear(&mut self) {
        self.listeners.clear();
        self.ids.reset();
    }
}
