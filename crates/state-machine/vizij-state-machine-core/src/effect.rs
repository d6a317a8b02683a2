//! Effect resolution and sampling.
//!
//! Opacity and scale follow a V around the switch point: `max` at progress 0,
//! `min` at the switch point, back to `max` at progress 1. Sampling is pure;
//! the binder applies the result to the node.

use serde::{Deserialize, Serialize};

use crate::config::EffectConfig;

/// Half of a transition relative to the switch point.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    #[default]
    FadeOut,
    FadeIn,
}

impl Phase {
    #[inline]
    pub fn at(progress: f32, switch_point: f32) -> Self {
        if progress < switch_point {
            Self::FadeOut
        } else {
            Self::FadeIn
        }
    }
}

/// Channel values for one frame; `None` leaves the channel untouched.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct EffectSample {
    pub opacity: Option<f32>,
    pub scale: Option<f32>,
}

/// Linear interpolation of scalars.
#[inline]
pub fn lerp_f32(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

// Phase follows raw progress while the blend follows eased progress, so the
// local parameter is clamped per phase: an early-overshooting curve holds at
// the dip until the switch point instead of crossing it. Scale and opacity
// share this clamp and stay within their configured ranges.
#[inline]
fn v_shape(range: [f32; 2], eased: f32, phase: Phase, switch_point: f32) -> f32 {
    let [min, max] = range;
    match phase {
        Phase::FadeOut => {
            let local = (eased / switch_point).clamp(0.0, 1.0);
            lerp_f32(max, min, local)
        }
        Phase::FadeIn => {
            let local = ((eased - switch_point) / (1.0 - switch_point)).clamp(0.0, 1.0);
            lerp_f32(min, max, local)
        }
    }
}

/// Sample an effect. `progress` picks the phase, `eased` drives the blend.
pub fn sample_effect(
    effect: &EffectConfig,
    progress: f32,
    eased: f32,
    switch_point: f32,
) -> EffectSample {
    let phase = Phase::at(progress, switch_point);
    let opacity = effect
        .kind
        .fades()
        .then(|| v_shape(effect.opacity_range, eased, phase, switch_point).clamp(0.0, 1.0));
    let scale = effect
        .kind
        .scales()
        .then(|| v_shape(effect.scale_range, eased, phase, switch_point));
    EffectSample { opacity, scale }
}

/// First configured effect wins: transition, target enter, source exit,
/// machine default, then [`EffectConfig::builtin`].
pub fn resolve_effect(
    transition: Option<&EffectConfig>,
    target_enter: Option<&EffectConfig>,
    source_exit: Option<&EffectConfig>,
    machine_default: Option<&EffectConfig>,
) -> EffectConfig {
    transition
        .or(target_enter)
        .or(source_exit)
        .or(machine_default)
        .copied()
        .unwrap_or_else(EffectConfig::builtin)
        .sanitized()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EffectKind, DEFAULT_SWITCH_POINT};
    use crate::easing::Easing;

    const SP: f32 = DEFAULT_SWITCH_POINT;

    fn approx(a: f32, b: f32) {
        assert!((a - b).abs() <= 1e-5, "left={a} right={b}");
    }

    #[test]
    fn fade_dips_to_min_at_switch_point() {
        let fx = EffectConfig::new(EffectKind::Fade, 1000.0).with_opacity_range(0.2, 0.9);
        approx(sample_effect(&fx, 0.0, 0.0, SP).opacity.unwrap(), 0.9);
        approx(sample_effect(&fx, 0.25, 0.25, SP).opacity.unwrap(), 0.55);
        approx(sample_effect(&fx, 0.5, 0.5, SP).opacity.unwrap(), 0.2);
        approx(sample_effect(&fx, 0.75, 0.75, SP).opacity.unwrap(), 0.55);
        approx(sample_effect(&fx, 1.0, 1.0, SP).opacity.unwrap(), 0.9);
        assert!(sample_effect(&fx, 0.5, 0.5, SP).scale.is_none());
    }

    #[test]
    fn scale_follows_same_shape() {
        let fx = EffectConfig::new(EffectKind::Scale, 400.0);
        let s = sample_effect(&fx, 0.5, 0.5, SP);
        assert!(s.opacity.is_none());
        approx(s.scale.unwrap(), 0.8);
        approx(sample_effect(&fx, 1.0, 1.0, SP).scale.unwrap(), 1.0);
    }

    #[test]
    fn fade_scale_computes_both_from_same_eased_value() {
        let fx = EffectConfig::new(EffectKind::FadeScale, 400.0);
        let s = sample_effect(&fx, 0.25, 0.25, SP);
        approx(s.opacity.unwrap(), 0.5);
        approx(s.scale.unwrap(), 0.9);
    }

    #[test]
    fn none_touches_nothing() {
        let fx = EffectConfig::new(EffectKind::None, 400.0);
        assert_eq!(sample_effect(&fx, 0.5, 0.5, SP), EffectSample::default());
    }

    #[test]
    fn overshooting_easing_is_clamped_per_phase() {
        let fx = EffectConfig::new(EffectKind::Fade, 400.0);
        let eased = Easing::EaseOutCubic.apply(0.4);
        assert!(eased > SP);
        approx(sample_effect(&fx, 0.4, eased, SP).opacity.unwrap(), 0.0);
    }

    #[test]
    fn elastic_scale_stays_within_configured_range() {
        let fx = EffectConfig::new(EffectKind::Scale, 400.0).with_easing(Easing::EaseOutElastic);
        for i in 0..=100 {
            let p = i as f32 / 100.0;
            let s = sample_effect(&fx, p, fx.easing.apply(p), SP).scale.unwrap();
            assert!((0.8 - 1e-6..=1.0 + 1e-6).contains(&s), "progress={p} scale={s}");
        }
        let out_cubic = Easing::EaseOutCubic.apply(0.4);
        let s = sample_effect(&fx, 0.4, out_cubic, SP).scale.unwrap();
        approx(s, 0.8);
    }

    #[test]
    fn shifted_switch_point_moves_the_dip() {
        let fx = EffectConfig::new(EffectKind::Fade, 400.0);
        approx(sample_effect(&fx, 0.25, 0.25, 0.25).opacity.unwrap(), 0.0);
        approx(sample_effect(&fx, 0.625, 0.625, 0.25).opacity.unwrap(), 0.5);
    }

    #[test]
    fn resolution_order() {
        let t = EffectConfig::new(EffectKind::Scale, 100.0);
        let enter = EffectConfig::new(EffectKind::FadeScale, 200.0);
        let exit = EffectConfig::new(EffectKind::None, 300.0);
        let def = EffectConfig::new(EffectKind::Fade, 400.0);
        assert_eq!(resolve_effect(Some(&t), Some(&enter), Some(&exit), Some(&def)).duration, 100.0);
        assert_eq!(resolve_effect(None, Some(&enter), Some(&exit), Some(&def)).duration, 200.0);
        assert_eq!(resolve_effect(None, None, Some(&exit), Some(&def)).duration, 300.0);
        assert_eq!(resolve_effect(None, None, None, Some(&def)).duration, 400.0);
        assert_eq!(resolve_effect(None, None, None, None), EffectConfig::builtin());
    }
}
