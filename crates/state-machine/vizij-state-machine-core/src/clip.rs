//! Reference collaborators: a time-based clip and a flat material group.
//!
//! Hosts without their own mixer (the wasm adapter, tests, benches) drive the
//! machine with these. Hosts with a scene graph implement the traits directly.

use serde::{Deserialize, Serialize};

use crate::binding::{OpacityChannel, PlaybackTrack, SceneNode};

/// A clip of fixed duration (seconds) that either stops at its end or wraps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipTrack {
    pub duration: f32,
    pub looping: bool,
    pub time: f32,
    pub running: bool,
}

impl ClipTrack {
    pub fn new(duration: f32, looping: bool) -> Self {
        Self {
            duration: duration.max(0.0),
            looping,
            time: 0.0,
            running: false,
        }
    }

    pub fn once(duration: f32) -> Self {
        Self::new(duration, false)
    }

    pub fn looping(duration: f32) -> Self {
        Self::new(duration, true)
    }
}

impl PlaybackTrack for ClipTrack {
    fn play(&mut self) {
        self.running = true;
    }

    fn pause(&mut self) {
        self.running = false;
    }

    fn stop(&mut self) {
        self.running = false;
        self.time = 0.0;
    }

    fn time(&self) -> f32 {
        self.time
    }

    fn set_time(&mut self, seconds: f32) {
        self.time = seconds.max(0.0);
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn advance(&mut self, dt_seconds: f32) {
        if !self.running {
            return;
        }
        self.time += dt_seconds;
        if self.time < self.duration {
            return;
        }
        if self.looping && self.duration > 0.0 {
            self.time %= self.duration;
        } else {
            self.time = self.duration;
            self.running = false;
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub opacity: f32,
    pub transparent: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            transparent: false,
        }
    }
}

impl OpacityChannel for Material {
    fn opacity(&self) -> f32 {
        self.opacity
    }

    fn set_opacity(&mut self, value: f32) {
        self.opacity = value;
    }

    fn is_transparent(&self) -> bool {
        self.transparent
    }

    fn set_transparent(&mut self, transparent: bool) {
        self.transparent = transparent;
    }
}

/// Node with a uniform list of materials.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneGroup {
    pub scale: [f32; 3],
    pub materials: Vec<Material>,
}

impl Default for SceneGroup {
    fn default() -> Self {
        Self {
            scale: [1.0, 1.0, 1.0],
            materials: Vec::new(),
        }
    }
}

impl SceneGroup {
    pub fn with_materials(count: usize) -> Self {
        Self {
            materials: vec![Material::default(); count],
            ..Self::default()
        }
    }

    /// Opacity of the first material; materials move together under effects.
    pub fn opacity(&self) -> Option<f32> {
        self.materials.first().map(|m| m.opacity)
    }
}

impl SceneNode for SceneGroup {
    fn scale(&self) -> [f32; 3] {
        self.scale
    }

    fn set_scale(&mut self, scale: [f32; 3]) {
        self.scale = scale;
    }

    fn visit_opacity_channels(&mut self, visitor: &mut dyn FnMut(&mut dyn OpacityChannel)) {
        for m in &mut self.materials {
            visitor(m);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn once_clip_stops_at_end() {
        let mut c = ClipTrack::once(1.0);
        c.play();
        c.advance(0.6);
        assert!(c.is_running());
        c.advance(0.6);
        assert!(!c.is_running());
        assert_eq!(c.time(), 1.0);
    }

    #[test]
    fn looping_clip_wraps() {
        let mut c = ClipTrack::looping(1.0);
        c.play();
        c.advance(1.25);
        assert!(c.is_running());
        assert!((c.time() - 0.25).abs() < 1e-5);
    }

    #[test]
    fn paused_clip_holds_time() {
        let mut c = ClipTrack::once(2.0);
        c.play();
        c.advance(0.5);
        c.pause();
        c.advance(1.0);
        assert_eq!(c.time(), 0.5);
        c.stop();
        assert_eq!(c.time(), 0.0);
    }
}
