//! Static machine configuration and transition effect settings.

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use crate::descriptor::{StateDescriptor, TransitionDescriptor};
use crate::easing::Easing;
use crate::error::MachineError;

/// Progress at which the source track is swapped for the target track.
pub const DEFAULT_SWITCH_POINT: f32 = 0.5;

/// Duration used when an effect is configured with a non-positive or non-finite duration.
pub const DEFAULT_DURATION_MS: f32 = 500.0;

/// Visual blend applied while transitioning.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EffectKind {
    None,
    #[default]
    Fade,
    Scale,
    FadeScale,
}

impl EffectKind {
    #[inline]
    pub fn fades(self) -> bool {
        matches!(self, Self::Fade | Self::FadeScale)
    }

    #[inline]
    pub fn scales(self) -> bool {
        matches!(self, Self::Scale | Self::FadeScale)
    }
}

fn default_duration_ms() -> f32 {
    DEFAULT_DURATION_MS
}

fn default_opacity_range() -> [f32; 2] {
    [0.0, 1.0]
}

fn default_scale_range() -> [f32; 2] {
    [0.8, 1.0]
}

fn default_switch_point() -> f32 {
    DEFAULT_SWITCH_POINT
}

/// Effect settings for one transition. Ranges are `[min, max]`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectConfig {
    #[serde(rename = "type", default)]
    pub kind: EffectKind,
    /// Milliseconds.
    #[serde(default = "default_duration_ms")]
    pub duration: f32,
    #[serde(default)]
    pub easing: Easing,
    #[serde(default = "default_opacity_range")]
    pub opacity_range: [f32; 2],
    #[serde(default = "default_scale_range")]
    pub scale_range: [f32; 2],
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            kind: EffectKind::Fade,
            duration: DEFAULT_DURATION_MS,
            easing: Easing::Linear,
            opacity_range: default_opacity_range(),
            scale_range: default_scale_range(),
        }
    }
}

impl EffectConfig {
    /// Last entry of the resolution chain, used when nothing else configures an effect.
    pub fn builtin() -> Self {
        Self {
            kind: EffectKind::Fade,
            duration: DEFAULT_DURATION_MS,
            easing: Easing::EaseOutCubic,
            opacity_range: [0.3, 1.0],
            scale_range: default_scale_range(),
        }
    }

    pub fn new(kind: EffectKind, duration_ms: f32) -> Self {
        Self {
            kind,
            duration: duration_ms,
            ..Self::default()
        }
    }

    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    pub fn with_opacity_range(mut self, min: f32, max: f32) -> Self {
        self.opacity_range = [min, max];
        self
    }

    pub fn with_scale_range(mut self, min: f32, max: f32) -> Self {
        self.scale_range = [min, max];
        self
    }

    /// Replace values the engine cannot run with safe defaults.
    pub fn sanitized(mut self) -> Self {
        if !(self.duration.is_finite() && self.duration > 0.0) {
            log::warn!(
                "effect duration {} is not a positive number of ms, using {}",
                self.duration,
                DEFAULT_DURATION_MS
            );
            self.duration = DEFAULT_DURATION_MS;
        }
        if !self.opacity_range.iter().all(|v| v.is_finite()) {
            log::warn!("effect opacity range {:?} is not finite", self.opacity_range);
            self.opacity_range = default_opacity_range();
        }
        if !self.scale_range.iter().all(|v| v.is_finite()) {
            log::warn!("effect scale range {:?} is not finite", self.scale_range);
            self.scale_range = default_scale_range();
        }
        self
    }
}

/// Construction-time description of a machine.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfig {
    pub id: String,
    pub initial_state: String,
    #[serde(default)]
    pub states: Vec<StateDescriptor>,
    #[serde(default)]
    pub transitions: Vec<TransitionDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_effect: Option<EffectConfig>,
    /// Gates lifecycle tracing only.
    #[serde(default)]
    pub debug: bool,
    /// Progress in (0, 1) at which the animation track switch happens.
    #[serde(default = "default_switch_point")]
    pub switch_point: f32,
}

impl MachineConfig {
    pub fn new(id: impl Into<String>, initial_state: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            initial_state: initial_state.into(),
            states: Vec::new(),
            transitions: Vec::new(),
            default_effect: None,
            debug: false,
            switch_point: DEFAULT_SWITCH_POINT,
        }
    }

    pub fn with_state(mut self, state: StateDescriptor) -> Self {
        self.states.push(state);
        self
    }

    pub fn with_transition(mut self, transition: TransitionDescriptor) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn with_default_effect(mut self, effect: EffectConfig) -> Self {
        self.default_effect = Some(effect);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_switch_point(mut self, switch_point: f32) -> Self {
        self.switch_point = switch_point;
        self
    }

    /// Switch point clamped to the open interval the effect math needs.
    pub fn effective_switch_point(&self) -> f32 {
        if self.switch_point.is_finite() && self.switch_point > 0.0 && self.switch_point < 1.0 {
            self.switch_point
        } else {
            log::warn!(
                "switch point {} outside (0, 1), using {}",
                self.switch_point,
                DEFAULT_SWITCH_POINT
            );
            DEFAULT_SWITCH_POINT
        }
    }

    /// Structural checks. Dangling transition endpoints are not errors: they are
    /// resolved lazily and refused at transition time.
    pub fn validate(&self) -> Result<(), MachineError> {
        if self.id.is_empty() {
            return Err(MachineError::EmptyMachineId);
        }
        let mut seen = HashSet::with_capacity(self.states.len());
        for state in &self.states {
            if state.id.is_empty() {
                return Err(MachineError::EmptyStateId);
            }
            if !seen.insert(state.id.as_str()) {
                return Err(MachineError::DuplicateState {
                    id: state.id.clone(),
                });
            }
        }
        if !seen.contains(self.initial_state.as_str()) {
            return Err(MachineError::UnknownInitialState {
                id: self.initial_state.clone(),
            });
        }
        Ok(())
    }
}

/// Parse and validate a JSON machine configuration (camelCase keys).
/// Callbacks and custom predicates are attached afterwards in code.
pub fn parse_machine_config_json(s: &str) -> Result<MachineConfig, MachineError> {
    let cfg: MachineConfig = serde_json::from_str(s)?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::TransitionCondition;

    #[test]
    fn effect_defaults_fill_missing_fields() {
        let e: EffectConfig = serde_json::from_str(r#"{ "type": "fadeScale" }"#).unwrap();
        assert_eq!(e.kind, EffectKind::FadeScale);
        assert_eq!(e.duration, DEFAULT_DURATION_MS);
        assert_eq!(e.easing, Easing::Linear);
        assert_eq!(e.opacity_range, [0.0, 1.0]);
        assert_eq!(e.scale_range, [0.8, 1.0]);
    }

    #[test]
    fn unknown_easing_in_effect_degrades_to_linear() {
        let e: EffectConfig =
            serde_json::from_str(r#"{ "type": "fade", "duration": 300, "easing": "wobble" }"#)
                .unwrap();
        assert_eq!(e.easing, Easing::Linear);
        assert_eq!(e.duration, 300.0);
    }

    #[test]
    fn builtin_effect_matches_documented_fallback() {
        let b = EffectConfig::builtin();
        assert_eq!(b.kind, EffectKind::Fade);
        assert_eq!(b.duration, 500.0);
        assert_eq!(b.easing, Easing::EaseOutCubic);
        assert_eq!(b.opacity_range, [0.3, 1.0]);
    }

    #[test]
    fn sanitize_replaces_bad_duration() {
        let e = EffectConfig::new(EffectKind::Scale, 0.0).sanitized();
        assert_eq!(e.duration, DEFAULT_DURATION_MS);
        let e = EffectConfig::new(EffectKind::Scale, f32::NAN).sanitized();
        assert_eq!(e.duration, DEFAULT_DURATION_MS);
        let e = EffectConfig::new(EffectKind::Scale, 120.0).sanitized();
        assert_eq!(e.duration, 120.0);
    }

    #[test]
    fn switch_point_out_of_range_falls_back() {
        let cfg = MachineConfig::new("m", "idle").with_switch_point(1.5);
        assert_eq!(cfg.effective_switch_point(), DEFAULT_SWITCH_POINT);
        let cfg = MachineConfig::new("m", "idle").with_switch_point(0.25);
        assert_eq!(cfg.effective_switch_point(), 0.25);
    }

    #[test]
    fn validate_reports_structural_problems() {
        let cfg = MachineConfig::new("m", "idle");
        assert_eq!(
            cfg.validate(),
            Err(MachineError::UnknownInitialState { id: "idle".into() })
        );

        let cfg = MachineConfig::new("m", "idle")
            .with_state(StateDescriptor::new("idle"))
            .with_state(StateDescriptor::new("idle"));
        assert_eq!(
            cfg.validate(),
            Err(MachineError::DuplicateState { id: "idle".into() })
        );

        let cfg = MachineConfig::new("", "idle").with_state(StateDescriptor::new("idle"));
        assert_eq!(cfg.validate(), Err(MachineError::EmptyMachineId));

        let cfg = MachineConfig::new("m", "idle")
            .with_state(StateDescriptor::new("idle"))
            .with_transition(TransitionDescriptor::new("t", "idle", "nowhere"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn parses_full_document() {
        let json = r#"{
            "id": "robot",
            "initialState": "idle",
            "debug": true,
            "defaultEffect": { "type": "scale", "duration": 250 },
            "states": [
                { "id": "idle", "animationTrackName": "Idle" },
                { "id": "run", "name": "Running", "animationIndex": 1 }
            ],
            "transitions": [
                { "id": "idle_to_run", "from": "idle", "to": "run",
                  "condition": { "type": "animationEnd" } }
            ]
        }"#;
        let cfg = parse_machine_config_json(json).unwrap();
        assert_eq!(cfg.id, "robot");
        assert!(cfg.debug);
        assert_eq!(cfg.switch_point, DEFAULT_SWITCH_POINT);
        assert_eq!(cfg.states.len(), 2);
        assert_eq!(cfg.default_effect.map(|e| e.kind), Some(EffectKind::Scale));
        assert!(matches!(
            cfg.transitions[0].condition,
            TransitionCondition::AnimationEnd
        ));
    }

    #[test]
    fn parse_errors_surface_as_machine_errors() {
        assert!(matches!(
            parse_machine_config_json("not json"),
            Err(MachineError::Parse(_))
        ));
    }
}
