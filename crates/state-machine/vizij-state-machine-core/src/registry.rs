//! State and transition registry.
//!
//! States keep registration order; each source state owns a transition list
//! kept sorted by descending priority (stable, so ties keep insertion order).
//! Ids are resolved lazily: transitions may name states registered later.

use hashbrown::HashMap;
use indexmap::IndexMap;

use crate::descriptor::{StateDescriptor, TransitionDescriptor};

#[derive(Debug, Default)]
pub struct Registry {
    states: IndexMap<String, StateDescriptor>,
    transitions: HashMap<String, Vec<TransitionDescriptor>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite by id. Overwriting keeps the original position.
    pub fn add_state(&mut self, state: StateDescriptor) {
        if self.states.contains_key(&state.id) {
            log::debug!("overwriting state '{}'", state.id);
        }
        self.states.insert(state.id.clone(), state);
    }

    pub fn add_transition(&mut self, transition: TransitionDescriptor) {
        let list = self.transitions.entry(transition.from.clone()).or_default();
        list.push(transition);
        list.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Outgoing transitions in evaluation order.
    pub fn transitions_from(&self, state_id: &str) -> &[TransitionDescriptor] {
        self.transitions
            .get(state_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn find_transition(&self, from: &str, id: &str) -> Option<&TransitionDescriptor> {
        self.transitions_from(from).iter().find(|t| t.id == id)
    }

    pub fn state(&self, id: &str) -> Option<&StateDescriptor> {
        self.states.get(id)
    }

    #[inline]
    pub fn contains_state(&self, id: &str) -> bool {
        self.states.contains_key(id)
    }

    pub fn state_ids(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn clear(&mut self) {
        self.states.clear();
        self.transitions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_sorted_by_priority_ties_keep_order() {
        let mut reg = Registry::new();
        reg.add_transition(TransitionDescriptor::new("a", "idle", "x").with_priority(1));
        reg.add_transition(TransitionDescriptor::new("b", "idle", "y").with_priority(5));
        reg.add_transition(TransitionDescriptor::new("c", "idle", "z").with_priority(1));
        reg.add_transition(TransitionDescriptor::new("d", "idle", "w").with_priority(-2));
        let ids: Vec<&str> = reg
            .transitions_from("idle")
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(ids, ["b", "a", "c", "d"]);
    }

    #[test]
    fn unknown_state_has_no_transitions() {
        let reg = Registry::new();
        assert!(reg.transitions_from("ghost").is_empty());
        assert!(reg.find_transition("ghost", "t").is_none());
        assert!(reg.state("ghost").is_none());
    }

    #[test]
    fn overwrite_keeps_registration_order() {
        let mut reg = Registry::new();
        reg.add_state(StateDescriptor::new("idle"));
        reg.add_state(StateDescriptor::new("run"));
        reg.add_state(StateDescriptor::new("idle").with_name("Idle"));
        assert_eq!(reg.state_ids().collect::<Vec<_>>(), ["idle", "run"]);
        assert_eq!(reg.state("idle").and_then(|s| s.name.as_deref()), Some("Idle"));
        assert_eq!(reg.state_count(), 2);
    }

    #[test]
    fn dangling_targets_are_accepted() {
        let mut reg = Registry::new();
        reg.add_transition(TransitionDescriptor::new("t", "idle", "missing"));
        assert_eq!(reg.find_transition("idle", "t").map(|t| t.to.as_str()), Some("missing"));
        reg.clear();
        assert!(reg.transitions_from("idle").is_empty());
    }
}
