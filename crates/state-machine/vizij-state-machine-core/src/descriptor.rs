//! State and transition descriptors.
//!
//! Descriptors are plain data (serde) plus optional host callbacks. Callbacks
//! are reference counted so descriptors stay cheap to clone and can be handed
//! back from queries; they are never serialized.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize, Serializer};

use crate::config::EffectConfig;

/// Zero-argument lifecycle hook (`on_enter`, `on_exit`, `on_start`, `on_complete`).
#[derive(Clone)]
pub struct Callback(Rc<dyn Fn()>);

impl Callback {
    pub fn new(f: impl Fn() + 'static) -> Self {
        Self(Rc::new(f))
    }

    #[inline]
    pub fn call(&self) {
        (self.0)()
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback(..)")
    }
}

/// Per-frame hook receiving the frame delta in milliseconds.
#[derive(Clone)]
pub struct UpdateCallback(Rc<dyn Fn(f32)>);

impl UpdateCallback {
    pub fn new(f: impl Fn(f32) + 'static) -> Self {
        Self(Rc::new(f))
    }

    #[inline]
    pub fn call(&self, dt_ms: f32) {
        (self.0)(dt_ms)
    }
}

impl fmt::Debug for UpdateCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UpdateCallback(..)")
    }
}

/// Guard for [`TransitionCondition::Custom`], re-evaluated on every idle frame.
#[derive(Clone)]
pub struct Predicate(Rc<dyn Fn() -> bool>);

impl Predicate {
    pub fn new(f: impl Fn() -> bool + 'static) -> Self {
        Self(Rc::new(f))
    }

    #[inline]
    pub fn eval(&self) -> bool {
        (self.0)()
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate(..)")
    }
}

// Serialized as a bare tag so descriptors holding a custom condition can still
// be reported to hosts.
impl Serialize for Predicate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_unit()
    }
}

/// Which playback track a state drives: by name, or by position in the bound track set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnimationBinding {
    Index(usize),
    Name(String),
}

impl From<&str> for AnimationBinding {
    fn from(s: &str) -> Self {
        Self::Name(s.to_string())
    }
}

impl From<usize> for AnimationBinding {
    fn from(i: usize) -> Self {
        Self::Index(i)
    }
}

/// Guard deciding when an idle machine leaves its current state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransitionCondition {
    /// Only fires through an explicit `trigger`; never evaluated as an auto-condition.
    #[default]
    Immediate,
    /// The current state's track has stopped after having run.
    AnimationEnd,
    /// Time spent in the current state reached `ms`.
    Timeout { ms: f32 },
    /// Host predicate; attached in code only.
    #[serde(skip_deserializing)]
    Custom(Predicate),
}

impl TransitionCondition {
    pub fn custom(f: impl Fn() -> bool + 'static) -> Self {
        Self::Custom(Predicate::new(f))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::AnimationEnd => "animationEnd",
            Self::Timeout { .. } => "timeout",
            Self::Custom(_) => "custom",
        }
    }
}

/// A named playback state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        alias = "animationTrackName",
        alias = "animationIndex",
        skip_serializing_if = "Option::is_none"
    )]
    pub animation: Option<AnimationBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enter_effect: Option<EffectConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_effect: Option<EffectConfig>,
    #[serde(skip)]
    pub on_enter: Option<Callback>,
    #[serde(skip)]
    pub on_exit: Option<Callback>,
    #[serde(skip)]
    pub on_update: Option<UpdateCallback>,
}

impl StateDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_animation(mut self, binding: impl Into<AnimationBinding>) -> Self {
        self.animation = Some(binding.into());
        self
    }

    pub fn with_enter_effect(mut self, effect: EffectConfig) -> Self {
        self.enter_effect = Some(effect);
        self
    }

    pub fn with_exit_effect(mut self, effect: EffectConfig) -> Self {
        self.exit_effect = Some(effect);
        self
    }

    pub fn on_enter(mut self, f: impl Fn() + 'static) -> Self {
        self.on_enter = Some(Callback::new(f));
        self
    }

    pub fn on_exit(mut self, f: impl Fn() + 'static) -> Self {
        self.on_exit = Some(Callback::new(f));
        self
    }

    pub fn on_update(mut self, f: impl Fn(f32) + 'static) -> Self {
        self.on_update = Some(UpdateCallback::new(f));
        self
    }
}

/// A directed, guarded edge between two states.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionDescriptor {
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub condition: TransitionCondition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<EffectConfig>,
    /// Higher values are evaluated first.
    #[serde(default)]
    pub priority: i32,
    #[serde(skip)]
    pub on_start: Option<Callback>,
    #[serde(skip)]
    pub on_complete: Option<Callback>,
}

impl TransitionDescriptor {
    pub fn new(id: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            to: to.into(),
            ..Self::default()
        }
    }

    pub fn with_condition(mut self, condition: TransitionCondition) -> Self {
        self.condition = condition;
        self
    }

    pub fn with_effect(mut self, effect: EffectConfig) -> Self {
        self.effect = Some(effect);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn on_start(mut self, f: impl Fn() + 'static) -> Self {
        self.on_start = Some(Callback::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl Fn() + 'static) -> Self {
        self.on_complete = Some(Callback::new(f));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    #[test]
    fn animation_binding_accepts_name_or_index_aliases() {
        let by_name: StateDescriptor =
            serde_json::from_value(json!({ "id": "walk", "animationTrackName": "Walk" }))
                .unwrap();
        assert_eq!(by_name.animation, Some(AnimationBinding::Name("Walk".into())));

        let by_index: StateDescriptor =
            serde_json::from_value(json!({ "id": "run", "animationIndex": 2 })).unwrap();
        assert_eq!(by_index.animation, Some(AnimationBinding::Index(2)));
    }

    #[test]
    fn conditions_parse_from_tagged_json() {
        let t: TransitionDescriptor = serde_json::from_value(json!({
            "id": "idle_to_run",
            "from": "idle",
            "to": "run",
            "condition": { "type": "timeout", "ms": 800 },
            "priority": 3
        }))
        .unwrap();
        assert!(matches!(t.condition, TransitionCondition::Timeout { ms } if ms == 800.0));
        assert_eq!(t.priority, 3);

        let t: TransitionDescriptor =
            serde_json::from_value(json!({ "id": "a", "from": "x", "to": "y" })).unwrap();
        assert!(matches!(t.condition, TransitionCondition::Immediate));
        assert_eq!(t.priority, 0);

        let bad = serde_json::from_value::<TransitionCondition>(json!({ "type": "custom" }));
        assert!(bad.is_err());
    }

    #[test]
    fn custom_condition_serializes_as_tag_only() {
        let c = TransitionCondition::custom(|| true);
        assert_eq!(serde_json::to_value(&c).unwrap(), json!({ "type": "custom" }));
    }

    #[test]
    fn callbacks_survive_clone() {
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let s = StateDescriptor::new("idle").on_enter(move || h.set(h.get() + 1));
        let copy = s.clone();
        s.on_enter.as_ref().unwrap().call();
        copy.on_enter.as_ref().unwrap().call();
        assert_eq!(hits.get(), 2);
    }
}
