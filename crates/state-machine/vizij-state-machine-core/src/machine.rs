//! StateMachine: registry + binder + transition engine behind one facade.
//!
//! Meta states: Stopped → Running(Idle) ⇄ Running(Transitioning) → Stopped.
//! The in-flight transition is an `Option`, so at most one exists at a time.
//!
//! Methods:
//! - new, bind, start, stop, dispose
//! - update (advance tracks → transition or condition evaluation → on_update)
//! - trigger, go_to_state
//! - get_state, get_state_ids, get_available_transitions, get_animation_names
//! - add_state, add_transition, subscribe, unsubscribe

use serde::{Deserialize, Serialize};

use crate::binding::{NodeHandle, PlaybackBinder, TrackHandle};
use crate::config::{EffectConfig, MachineConfig};
use crate::descriptor::{StateDescriptor, TransitionCondition, TransitionDescriptor};
use crate::effect::{resolve_effect, sample_effect, Phase};
use crate::events::{EventBus, EventKind, MachineEvent};
use crate::ids::ListenerId;
use crate::outputs::Outputs;
use crate::registry::Registry;

/// Source track paused at transition start, with the clip time it held.
#[derive(Clone, Debug)]
struct PausedTrack {
    name: String,
    time: f32,
}

#[derive(Debug)]
struct ActiveTransition {
    descriptor: TransitionDescriptor,
    effect: EffectConfig,
    started_at: f64,
    progress: f32,
    phase: Phase,
    switched: bool,
    paused_track: Option<PausedTrack>,
}

/// Read-only view of the runtime state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSnapshot {
    pub current_state: String,
    pub previous_state: Option<String>,
    pub is_running: bool,
    pub is_transitioning: bool,
    pub transition_progress: f32,
    pub transition_phase: Phase,
    pub has_animation_switched: bool,
    pub active_transition: Option<String>,
    pub paused_track: Option<String>,
    /// Track the current state's playback is running on.
    pub active_track: Option<String>,
    /// Milliseconds spent in the current state.
    pub state_elapsed: f64,
}

#[derive(Debug)]
pub struct StateMachine {
    id: String,
    initial_state: String,
    default_effect: Option<EffectConfig>,
    switch_point: f32,
    debug: bool,

    registry: Registry,
    binder: PlaybackBinder,
    bus: EventBus,

    running: bool,
    clock_ms: f64,
    current: String,
    previous: Option<String>,
    state_entered_at: f64,
    active: Option<ActiveTransition>,
    // Owned playback: the state's own track, or the source track it resumed.
    active_track: Option<String>,

    // Events raised since the last update returned; moved into `outputs` per tick.
    pending: Vec<MachineEvent>,
    outputs: Outputs,
}

impl StateMachine {
    /// Build a machine from a static configuration. Malformed configurations are
    /// logged and degrade at use sites instead of failing here.
    pub fn new(cfg: MachineConfig) -> Self {
        if let Err(e) = cfg.validate() {
            log::warn!("state machine '{}': {e}", cfg.id);
        }
        let switch_point = cfg.effective_switch_point();
        let mut registry = Registry::new();
        for state in cfg.states {
            registry.add_state(state);
        }
        for transition in cfg.transitions {
            registry.add_transition(transition);
        }
        Self {
            current: cfg.initial_state.clone(),
            id: cfg.id,
            initial_state: cfg.initial_state,
            default_effect: cfg.default_effect,
            switch_point,
            debug: cfg.debug,
            registry,
            binder: PlaybackBinder::new(),
            bus: EventBus::new(),
            running: false,
            clock_ms: 0.0,
            previous: None,
            state_entered_at: 0.0,
            active: None,
            active_track: None,
            pending: Vec::new(),
            outputs: Outputs::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Attach the host node and its named tracks. Calling again re-binds cleanly.
    pub fn bind<I>(&mut self, node: NodeHandle, tracks: I)
    where
        I: IntoIterator<Item = (String, TrackHandle)>,
    {
        self.binder.bind(node, tracks);
        if self.debug {
            log::info!(
                "[{}] bound tracks {:?}",
                self.id,
                self.binder.track_names()
            );
        }
    }

    /// Enter the initial state. Returns false if already running, unbound, or
    /// the initial state is not registered.
    pub fn start(&mut self) -> bool {
        if self.running {
            log::debug!("[{}] start: already running", self.id);
            return false;
        }
        if !self.binder.is_bound() {
            log::warn!("[{}] start: no node bound", self.id);
            return false;
        }
        if !self.registry.contains_state(&self.initial_state) {
            log::warn!(
                "[{}] start: initial state '{}' is not registered",
                self.id,
                self.initial_state
            );
            return false;
        }
        self.running = true;
        self.active = None;
        self.previous = None;
        self.current = self.initial_state.clone();
        self.enter_current();
        if self.debug {
            log::info!("[{}] started in '{}'", self.id, self.current);
        }
        true
    }

    /// Hard halt: stops all playback and drops any in-flight transition without
    /// restoring opacity/scale.
    pub fn stop(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        if let Some(active) = self.active.take() {
            log::debug!(
                "[{}] stop: abandoning transition '{}' at {:.3}",
                self.id,
                active.descriptor.id,
                active.progress
            );
        }
        self.binder.stop_all();
        self.active_track = None;
        if self.debug {
            log::info!("[{}] stopped in '{}'", self.id, self.current);
        }
        true
    }

    /// Stop, clear registries and listeners, and release the node.
    pub fn dispose(&mut self) {
        self.stop();
        self.registry.clear();
        self.bus.clear();
        self.binder.unbind();
        self.pending.clear();
        self.outputs.clear();
        if self.debug {
            log::info!("[{}] disposed", self.id);
        }
    }

    /// Advance by `dt_ms` milliseconds. Never fails; negative or non-finite
    /// deltas count as zero.
    pub fn update(&mut self, dt_ms: f32) -> &Outputs {
        let dt = if dt_ms.is_finite() && dt_ms > 0.0 {
            dt_ms
        } else {
            0.0
        };

        if self.running {
            self.clock_ms += f64::from(dt);
            self.advance_tracks(dt);

            if self.active.is_some() {
                self.advance_transition();
            } else {
                self.evaluate_conditions();
            }

            if let Some(cb) = self
                .registry
                .state(&self.current)
                .and_then(|s| s.on_update.clone())
            {
                cb.call(dt);
            }
            log::trace!("[{}] tick {:.1}ms in '{}'", self.id, self.clock_ms, self.current);
        }

        self.outputs.clear();
        self.outputs.events.append(&mut self.pending);
        &self.outputs
    }

    /// Fire the transition `transition_id` out of the current state.
    pub fn trigger(&mut self, transition_id: &str) -> bool {
        if !self.running {
            log::warn!("[{}] trigger '{transition_id}': machine not running", self.id);
            return false;
        }
        if self.active.is_some() {
            log::warn!(
                "[{}] trigger '{transition_id}': a transition is already in flight",
                self.id
            );
            return false;
        }
        let Some(transition) = self
            .registry
            .find_transition(&self.current, transition_id)
            .cloned()
        else {
            log::warn!(
                "[{}] trigger: no transition '{transition_id}' from '{}'",
                self.id,
                self.current
            );
            return false;
        };
        self.start_transition(transition)
    }

    /// Jump to `state_id`, force-completing any in-flight transition first.
    /// With `with_effect` the jump runs as a synthesized transition.
    pub fn go_to_state(&mut self, state_id: &str, with_effect: bool) -> bool {
        if !self.running {
            log::warn!("[{}] go_to_state '{state_id}': machine not running", self.id);
            return false;
        }
        if !self.registry.contains_state(state_id) {
            log::warn!("[{}] go_to_state: unknown state '{state_id}'", self.id);
            return false;
        }
        if self.active.is_some() {
            self.force_complete();
        }
        if with_effect {
            let synthesized = TransitionDescriptor::new(
                format!("{}->{}", self.current, state_id),
                self.current.clone(),
                state_id,
            )
            .with_condition(TransitionCondition::Immediate);
            return self.start_transition(synthesized);
        }

        self.exit_current();
        let from = std::mem::replace(&mut self.current, state_id.to_string());
        self.previous = Some(from);
        self.enter_current();
        true
    }

    pub fn get_state(&self) -> RuntimeSnapshot {
        let active = self.active.as_ref();
        RuntimeSnapshot {
            current_state: self.current.clone(),
            previous_state: self.previous.clone(),
            is_running: self.running,
            is_transitioning: active.is_some(),
            transition_progress: active.map(|a| a.progress).unwrap_or(0.0),
            transition_phase: active.map(|a| a.phase).unwrap_or_default(),
            has_animation_switched: active.map(|a| a.switched).unwrap_or(false),
            active_transition: active.map(|a| a.descriptor.id.clone()),
            paused_track: active
                .and_then(|a| a.paused_track.as_ref())
                .map(|p| p.name.clone()),
            active_track: self.active_track.clone(),
            state_elapsed: self.clock_ms - self.state_entered_at,
        }
    }

    #[inline]
    pub fn current_state(&self) -> &str {
        &self.current
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[inline]
    pub fn is_transitioning(&self) -> bool {
        self.active.is_some()
    }

    pub fn get_state_ids(&self) -> Vec<String> {
        self.registry.state_ids().map(str::to_string).collect()
    }

    /// Outgoing transitions of `state_id` (default: the current state) in evaluation order.
    pub fn get_available_transitions(&self, state_id: Option<&str>) -> Vec<TransitionDescriptor> {
        let from = state_id.unwrap_or(&self.current);
        self.registry.transitions_from(from).to_vec()
    }

    pub fn get_animation_names(&self) -> Vec<String> {
        self.binder.track_names()
    }

    pub fn add_state(&mut self, state: StateDescriptor) {
        self.registry.add_state(state);
    }

    pub fn add_transition(&mut self, transition: TransitionDescriptor) {
        self.registry.add_transition(transition);
    }

    pub fn subscribe(
        &mut self,
        kind: EventKind,
        listener: impl Fn(&MachineEvent) + 'static,
    ) -> ListenerId {
        self.bus.subscribe(kind, listener)
    }

    pub fn unsubscribe(&mut self, kind: EventKind, id: ListenerId) -> bool {
        self.bus.unsubscribe(kind, id)
    }

    /// Host-side access to the binder (e.g. to inspect track state).
    pub fn binder(&self) -> &PlaybackBinder {
        &self.binder
    }
}

// Engine internals.
impl StateMachine {
    fn track_of(&self, state_id: &str) -> Option<String> {
        self.registry
            .state(state_id)
            .and_then(|s| s.animation.as_ref())
            .and_then(|b| self.binder.resolve(b))
    }

    fn advance_tracks(&mut self, dt: f32) {
        let ended = self.binder.advance(dt);
        if ended.is_empty() {
            return;
        }
        if let Some(track) = self.active_track.clone() {
            if ended.contains(&track) {
                self.emit(EventKind::AnimationEnd, None, None, Some(track));
            }
        }
    }

    fn condition_met(&self, condition: &TransitionCondition) -> bool {
        match condition {
            TransitionCondition::Immediate => false,
            TransitionCondition::AnimationEnd => self
                .active_track
                .as_deref()
                .map(|t| self.binder.has_ended(t))
                .unwrap_or(false),
            TransitionCondition::Timeout { ms } => {
                self.clock_ms - self.state_entered_at >= f64::from(*ms)
            }
            TransitionCondition::Custom(predicate) => predicate.eval(),
        }
    }

    fn evaluate_conditions(&mut self) {
        let candidate = self
            .registry
            .transitions_from(&self.current)
            .iter()
            .find(|t| self.condition_met(&t.condition))
            .cloned();
        if let Some(transition) = candidate {
            // Per-frame path: refusal logs at debug level.
            if !self.registry.contains_state(&transition.to) {
                log::debug!(
                    "[{}] '{}' is satisfied but targets unknown state '{}'",
                    self.id,
                    transition.id,
                    transition.to
                );
                return;
            }
            if self.debug {
                log::info!(
                    "[{}] condition '{}' met for '{}'",
                    self.id,
                    transition.condition.name(),
                    transition.id
                );
            }
            self.start_transition(transition);
        }
    }

    fn start_transition(&mut self, transition: TransitionDescriptor) -> bool {
        if self.active.is_some() {
            log::warn!(
                "[{}] cannot start '{}': a transition is already in flight",
                self.id,
                transition.id
            );
            return false;
        }
        let Some(target) = self.registry.state(&transition.to) else {
            log::warn!(
                "[{}] transition '{}' targets unknown state '{}'",
                self.id,
                transition.id,
                transition.to
            );
            return false;
        };
        let source = self.registry.state(&self.current).cloned();
        let effect = resolve_effect(
            transition.effect.as_ref(),
            target.enter_effect.as_ref(),
            source.as_ref().and_then(|s| s.exit_effect.as_ref()),
            self.default_effect.as_ref(),
        );

        self.binder.snapshot();
        let paused_track = self.active_track.clone().and_then(|name| {
            self.binder
                .pause(&name, None)
                .map(|time| PausedTrack { name, time })
        });

        if self.debug {
            log::info!(
                "[{}] transition '{}' {} -> {} ({:?}, {}ms, {})",
                self.id,
                transition.id,
                transition.from,
                transition.to,
                effect.kind,
                effect.duration,
                effect.easing.name()
            );
        }

        let on_start = transition.on_start.clone();
        let from = self.current.clone();
        let to = transition.to.clone();
        self.active = Some(ActiveTransition {
            descriptor: transition,
            effect,
            started_at: self.clock_ms,
            progress: 0.0,
            phase: Phase::FadeOut,
            switched: false,
            paused_track,
        });

        if let Some(cb) = on_start {
            cb.call();
        }
        if let Some(cb) = source.and_then(|s| s.on_exit) {
            cb.call();
        }
        self.emit(EventKind::StateExit, None, None, None);
        self.emit(EventKind::TransitionStart, Some(from), Some(to), None);
        true
    }

    fn advance_transition(&mut self) {
        let now = self.clock_ms;
        let switch_point = self.switch_point;
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let elapsed = (now - active.started_at) as f32;
        let progress = (elapsed / active.effect.duration).clamp(0.0, 1.0);
        active.progress = active.progress.max(progress);
        active.phase = Phase::at(active.progress, switch_point);

        let progress = active.progress;
        let effect = active.effect;
        let needs_switch = !active.switched && progress >= switch_point;

        if needs_switch {
            self.switch_animation();
        }
        let eased = effect.easing.apply(progress);
        self.binder
            .apply(sample_effect(&effect, progress, eased, switch_point));

        if progress >= 1.0 {
            self.complete_transition();
        }
    }

    /// Swap the source track for the target's, once per transition.
    fn switch_animation(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.switched {
            return;
        }
        active.switched = true;
        let paused = active.paused_track.take();
        let to = active.descriptor.to.clone();

        self.active_track = match self.track_of(&to) {
            Some(target_track) => {
                if let Some(p) = &paused {
                    if p.name != target_track {
                        self.binder.stop(&p.name);
                    }
                }
                self.binder.play(&target_track);
                Some(target_track)
            }
            // A trackless target keeps the source clip going and owns it from here on.
            None => paused.map(|p| {
                self.binder.resume(&p.name, p.time);
                p.name
            }),
        };
        if self.debug {
            log::info!("[{}] animation switched towards '{to}'", self.id);
        }
    }

    /// Land on the target immediately, running the switch if it is still pending.
    fn force_complete(&mut self) {
        let pending_switch = self.active.as_ref().map(|a| !a.switched).unwrap_or(false);
        if pending_switch {
            self.switch_animation();
        }
        self.complete_transition();
    }

    fn complete_transition(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        self.binder.restore();

        let ActiveTransition { descriptor, .. } = active;
        let from = std::mem::replace(&mut self.current, descriptor.to.clone());
        self.previous = Some(from.clone());
        self.state_entered_at = self.clock_ms;

        // The target track was started at the switch point; only the hook runs here.
        if let Some(cb) = self
            .registry
            .state(&self.current)
            .and_then(|s| s.on_enter.clone())
        {
            cb.call();
        }
        self.emit(EventKind::StateEnter, None, None, None);
        if let Some(cb) = descriptor.on_complete {
            cb.call();
        }
        self.emit(
            EventKind::TransitionEnd,
            Some(from),
            Some(descriptor.to),
            None,
        );
        if self.debug {
            log::info!("[{}] transition '{}' complete", self.id, descriptor.id);
        }
    }

    fn enter_current(&mut self) {
        self.state_entered_at = self.clock_ms;
        self.active_track = self.track_of(&self.current);
        if let Some(track) = &self.active_track {
            self.binder.play(track);
        }
        if let Some(cb) = self
            .registry
            .state(&self.current)
            .and_then(|s| s.on_enter.clone())
        {
            cb.call();
        }
        self.emit(EventKind::StateEnter, None, None, None);
    }

    fn exit_current(&mut self) {
        if let Some(cb) = self
            .registry
            .state(&self.current)
            .and_then(|s| s.on_exit.clone())
        {
            cb.call();
        }
        if let Some(track) = self.active_track.take() {
            self.binder.stop(&track);
        }
        self.emit(EventKind::StateExit, None, None, None);
    }

    fn emit(
        &mut self,
        kind: EventKind,
        from: Option<String>,
        to: Option<String>,
        animation: Option<String>,
    ) {
        let event = MachineEvent {
            kind,
            state_machine_id: self.id.clone(),
            current_state: self.current.clone(),
            previous_state: self.previous.clone(),
            from,
            to,
            animation,
            timestamp: self.clock_ms,
        };
        self.bus.emit(&event);
        self.pending.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{ClipTrack, SceneGroup};
    use crate::config::{EffectKind, DEFAULT_SWITCH_POINT};
    use crate::easing::Easing;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn machine() -> (StateMachine, Rc<RefCell<SceneGroup>>) {
        let cfg = MachineConfig::new("m", "idle")
            .with_state(StateDescriptor::new("idle").with_animation("idle"))
            .with_state(StateDescriptor::new("run").with_animation("run"))
            .with_transition(
                TransitionDescriptor::new("go", "idle", "run").with_effect(
                    EffectConfig::new(EffectKind::Fade, 100.0).with_easing(Easing::Linear),
                ),
            );
        let mut m = StateMachine::new(cfg);
        let node = Rc::new(RefCell::new(SceneGroup::with_materials(1)));
        let idle: TrackHandle = Rc::new(RefCell::new(ClipTrack::looping(1.0)));
        let run: TrackHandle = Rc::new(RefCell::new(ClipTrack::looping(1.0)));
        m.bind(
            node.clone(),
            vec![("idle".to_string(), idle), ("run".to_string(), run)],
        );
        (m, node)
    }

    #[test]
    fn start_requires_binding() {
        let mut m = StateMachine::new(
            MachineConfig::new("m", "idle").with_state(StateDescriptor::new("idle")),
        );
        assert!(!m.start());
        assert!(!m.is_running());
    }

    #[test]
    fn start_twice_is_rejected() {
        let (mut m, _) = machine();
        assert!(m.start());
        assert!(!m.start());
    }

    #[test]
    fn progress_is_clamped_and_monotonic() {
        let (mut m, _) = machine();
        m.start();
        assert!(m.trigger("go"));
        let mut last = 0.0;
        for _ in 0..4 {
            m.update(20.0);
            let p = m.get_state().transition_progress;
            assert!(p >= last);
            last = p;
        }
        m.update(f32::NAN);
        m.update(-50.0);
        assert_eq!(m.get_state().transition_progress, last);
    }

    #[test]
    fn stop_mid_transition_does_not_restore() {
        let (mut m, node) = machine();
        m.start();
        m.trigger("go");
        m.update(25.0);
        let dimmed = node.borrow().opacity().unwrap();
        assert!(dimmed < 1.0);
        assert!(m.stop());
        let s = m.get_state();
        assert!(!s.is_running && !s.is_transitioning);
        assert_eq!(node.borrow().opacity(), Some(dimmed));
        assert_eq!(s.current_state, "idle");
    }

    #[test]
    fn dispose_clears_everything() {
        let (mut m, _) = machine();
        m.start();
        m.subscribe(EventKind::StateEnter, |_| {});
        m.dispose();
        assert!(!m.is_running());
        assert!(m.get_state_ids().is_empty());
        assert!(m.get_animation_names().is_empty());
        assert!(m.get_available_transitions(Some("idle")).is_empty());
        assert!(!m.start());
    }

    #[test]
    fn default_switch_point_is_half() {
        let (m, _) = machine();
        assert_eq!(m.switch_point, DEFAULT_SWITCH_POINT);
    }
}
