//! Playback binder and host collaborator traits.
//!
//! The host owns its scene node and playback tracks; the binder keeps shared
//! handles to them. Track time is clip time in seconds, machine time is
//! milliseconds; [`PlaybackBinder::advance`] converts between the two.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::descriptor::AnimationBinding;
use crate::effect::EffectSample;

/// One opacity-capable leaf of the bound node (a material in most hosts).
pub trait OpacityChannel {
    fn opacity(&self) -> f32;
    fn set_opacity(&mut self, value: f32);
    fn is_transparent(&self) -> bool;
    fn set_transparent(&mut self, transparent: bool);
}

/// Controllable scene node. Visitation order must be stable between calls;
/// snapshots are matched to leaves by position.
pub trait SceneNode {
    fn scale(&self) -> [f32; 3];
    fn set_scale(&mut self, scale: [f32; 3]);
    fn visit_opacity_channels(&mut self, visitor: &mut dyn FnMut(&mut dyn OpacityChannel));
}

/// One named clip bound to the node.
pub trait PlaybackTrack {
    /// Start or continue from the current time.
    fn play(&mut self);
    /// Halt, keeping the current time.
    fn pause(&mut self);
    /// Halt and rewind.
    fn stop(&mut self);
    /// Clip time in seconds.
    fn time(&self) -> f32;
    fn set_time(&mut self, seconds: f32);
    fn is_running(&self) -> bool;
    /// Advance clip time. Hosts whose own mixer advances clips keep the no-op.
    fn advance(&mut self, _dt_seconds: f32) {}
}

pub type NodeHandle = Rc<RefCell<dyn SceneNode>>;
pub type TrackHandle = Rc<RefCell<dyn PlaybackTrack>>;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ChannelSnapshot {
    pub opacity: f32,
    pub transparent: bool,
}

/// Captured visual state of a node, restored verbatim after a transition.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeSnapshot {
    pub channels: Vec<ChannelSnapshot>,
    pub scale: [f32; 3],
}

struct TrackController {
    handle: TrackHandle,
    paused: bool,
    /// Played or resumed and not yet observed stopping.
    active: bool,
    ended: bool,
}

impl TrackController {
    fn new(handle: TrackHandle) -> Self {
        Self {
            handle,
            paused: false,
            active: false,
            ended: false,
        }
    }
}

/// Binds a node and its named tracks; exposes per-track control and the
/// opacity/scale channels used by transition effects.
#[derive(Default)]
pub struct PlaybackBinder {
    node: Option<NodeHandle>,
    tracks: IndexMap<String, TrackController>,
    snapshot: Option<NodeSnapshot>,
}

impl fmt::Debug for PlaybackBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackBinder")
            .field("bound", &self.node.is_some())
            .field("tracks", &self.tracks.keys().collect::<Vec<_>>())
            .field("snapshot", &self.snapshot)
            .finish()
    }
}

impl PlaybackBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a node and its tracks. Re-binding stops and drops the previous set.
    pub fn bind<I>(&mut self, node: NodeHandle, tracks: I)
    where
        I: IntoIterator<Item = (String, TrackHandle)>,
    {
        if self.node.is_some() {
            log::debug!("re-binding playback binder");
            self.unbind();
        }
        self.tracks = tracks
            .into_iter()
            .map(|(name, handle)| (name, TrackController::new(handle)))
            .collect();
        self.node = Some(node);
        self.snapshot();
    }

    /// Stop every track and release the node.
    pub fn unbind(&mut self) {
        self.stop_all();
        self.tracks.clear();
        self.node = None;
        self.snapshot = None;
    }

    #[inline]
    pub fn is_bound(&self) -> bool {
        self.node.is_some()
    }

    pub fn track_names(&self) -> Vec<String> {
        self.tracks.keys().cloned().collect()
    }

    pub fn has_track(&self, name: &str) -> bool {
        self.tracks.contains_key(name)
    }

    /// Resolve a state's binding to a bound track name.
    pub fn resolve(&self, binding: &AnimationBinding) -> Option<String> {
        match binding {
            AnimationBinding::Name(name) => self.has_track(name).then(|| name.clone()),
            AnimationBinding::Index(i) => self.tracks.get_index(*i).map(|(name, _)| name.clone()),
        }
    }

    /// Rewind to 0 and play.
    pub fn play(&mut self, name: &str) -> bool {
        let Some(ctrl) = self.tracks.get_mut(name) else {
            log::warn!("play: unknown track '{name}'");
            return false;
        };
        {
            let mut track = ctrl.handle.borrow_mut();
            track.stop();
            track.set_time(0.0);
            track.play();
        }
        ctrl.paused = false;
        ctrl.active = true;
        ctrl.ended = false;
        true
    }

    /// Pause, optionally seeking to `at_time` first. Returns the clip time the track holds.
    pub fn pause(&mut self, name: &str, at_time: Option<f32>) -> Option<f32> {
        let Some(ctrl) = self.tracks.get_mut(name) else {
            log::warn!("pause: unknown track '{name}'");
            return None;
        };
        let mut track = ctrl.handle.borrow_mut();
        if let Some(t) = at_time {
            track.set_time(t);
        }
        track.pause();
        ctrl.paused = true;
        Some(track.time())
    }

    /// Continue a track from `from_time` seconds.
    pub fn resume(&mut self, name: &str, from_time: f32) -> bool {
        let Some(ctrl) = self.tracks.get_mut(name) else {
            log::warn!("resume: unknown track '{name}'");
            return false;
        };
        {
            let mut track = ctrl.handle.borrow_mut();
            track.set_time(from_time);
            track.play();
        }
        ctrl.paused = false;
        ctrl.active = true;
        ctrl.ended = false;
        true
    }

    pub fn stop(&mut self, name: &str) -> bool {
        let Some(ctrl) = self.tracks.get_mut(name) else {
            log::warn!("stop: unknown track '{name}'");
            return false;
        };
        ctrl.handle.borrow_mut().stop();
        ctrl.paused = false;
        ctrl.active = false;
        ctrl.ended = false;
        true
    }

    pub fn stop_all(&mut self) {
        for ctrl in self.tracks.values_mut() {
            ctrl.handle.borrow_mut().stop();
            ctrl.paused = false;
            ctrl.active = false;
            ctrl.ended = false;
        }
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.tracks
            .get(name)
            .map(|c| c.handle.borrow().is_running())
            .unwrap_or(false)
    }

    /// True once a played track has stopped on its own, until it is played again.
    pub fn has_ended(&self, name: &str) -> bool {
        self.tracks.get(name).map(|c| c.ended).unwrap_or(false)
    }

    /// Forward `dt_ms` to every track and return the names of tracks that ended this frame.
    pub fn advance(&mut self, dt_ms: f32) -> Vec<String> {
        let dt_s = dt_ms / 1000.0;
        let mut ended = Vec::new();
        for (name, ctrl) in self.tracks.iter_mut() {
            let running = {
                let mut track = ctrl.handle.borrow_mut();
                track.advance(dt_s);
                track.is_running()
            };
            if ctrl.active && !ctrl.paused && !running {
                ctrl.active = false;
                ctrl.ended = true;
                ended.push(name.clone());
            }
        }
        ended
    }

    /// Capture every leaf's opacity/transparency and the node scale.
    pub fn snapshot(&mut self) -> bool {
        let Some(node) = &self.node else {
            return false;
        };
        let mut node = node.borrow_mut();
        let mut channels = Vec::new();
        node.visit_opacity_channels(&mut |ch| {
            channels.push(ChannelSnapshot {
                opacity: ch.opacity(),
                transparent: ch.is_transparent(),
            });
        });
        self.snapshot = Some(NodeSnapshot {
            channels,
            scale: node.scale(),
        });
        true
    }

    /// Write the last snapshot back to the node exactly.
    pub fn restore(&mut self) -> bool {
        let (Some(node), Some(snap)) = (&self.node, &self.snapshot) else {
            return false;
        };
        let mut node = node.borrow_mut();
        let mut idx = 0usize;
        node.visit_opacity_channels(&mut |ch| {
            if let Some(saved) = snap.channels.get(idx) {
                ch.set_opacity(saved.opacity);
                ch.set_transparent(saved.transparent);
            }
            idx += 1;
        });
        if idx != snap.channels.len() {
            log::debug!(
                "restore: node has {idx} opacity channels, snapshot has {}",
                snap.channels.len()
            );
        }
        node.set_scale(snap.scale);
        true
    }

    /// Apply `value` to every opacity channel, enabling transparency first when needed.
    pub fn set_opacity(&mut self, value: f32) {
        let Some(node) = &self.node else {
            return;
        };
        let value = value.clamp(0.0, 1.0);
        node.borrow_mut().visit_opacity_channels(&mut |ch| {
            if value < 1.0 && !ch.is_transparent() {
                ch.set_transparent(true);
            }
            ch.set_opacity(value);
        });
    }

    /// Scale relative to the snapshot scale; repeated calls never accumulate.
    pub fn set_uniform_scale(&mut self, factor: f32) {
        let Some(node) = &self.node else {
            return;
        };
        let mut node = node.borrow_mut();
        let base = match &self.snapshot {
            Some(snap) => snap.scale,
            None => node.scale(),
        };
        node.set_scale([base[0] * factor, base[1] * factor, base[2] * factor]);
    }

    pub fn apply(&mut self, sample: EffectSample) {
        if let Some(opacity) = sample.opacity {
            self.set_opacity(opacity);
        }
        if let Some(scale) = sample.scale {
            self.set_uniform_scale(scale);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{ClipTrack, SceneGroup};

    fn bound(materials: usize) -> (Rc<RefCell<SceneGroup>>, Rc<RefCell<ClipTrack>>, PlaybackBinder) {
        let node = Rc::new(RefCell::new(SceneGroup::with_materials(materials)));
        let clip = Rc::new(RefCell::new(ClipTrack::once(1.0)));
        let mut binder = PlaybackBinder::new();
        let track: TrackHandle = clip.clone();
        binder.bind(node.clone(), vec![("walk".to_string(), track)]);
        (node, clip, binder)
    }

    #[test]
    fn scale_is_relative_to_snapshot() {
        let (node, _, mut binder) = bound(1);
        node.borrow_mut().scale = [2.0, 2.0, 2.0];
        binder.snapshot();
        binder.set_uniform_scale(0.5);
        binder.set_uniform_scale(0.5);
        assert_eq!(node.borrow().scale, [1.0, 1.0, 1.0]);
        binder.restore();
        assert_eq!(node.borrow().scale, [2.0, 2.0, 2.0]);
    }

    #[test]
    fn opacity_enables_transparency_and_restore_undoes_it() {
        let (node, _, mut binder) = bound(3);
        binder.set_opacity(0.4);
        for m in &node.borrow().materials {
            assert!(m.transparent);
            assert_eq!(m.opacity, 0.4);
        }
        binder.restore();
        for m in &node.borrow().materials {
            assert!(!m.transparent);
            assert_eq!(m.opacity, 1.0);
        }
    }

    #[test]
    fn pause_and_resume_preserve_time() {
        let (_, clip, mut binder) = bound(1);
        assert!(binder.play("walk"));
        binder.advance(400.0);
        let saved = binder.pause("walk", None).unwrap();
        assert!((saved - 0.4).abs() < 1e-5);
        binder.advance(400.0);
        assert!((clip.borrow().time() - 0.4).abs() < 1e-5);
        assert!(binder.resume("walk", saved));
        assert!(clip.borrow().is_running());
    }

    #[test]
    fn end_is_detected_once_and_not_for_paused_tracks() {
        let (_, _, mut binder) = bound(1);
        binder.play("walk");
        binder.pause("walk", None);
        assert!(binder.advance(2000.0).is_empty());
        binder.resume("walk", 0.5);
        assert_eq!(binder.advance(600.0), vec!["walk".to_string()]);
        assert!(binder.has_ended("walk"));
        assert!(binder.advance(16.0).is_empty());
        binder.play("walk");
        assert!(!binder.has_ended("walk"));
    }

    #[test]
    fn unknown_track_is_a_noop() {
        let (_, _, mut binder) = bound(1);
        assert!(!binder.play("fly"));
        assert!(binder.pause("fly", None).is_none());
        assert!(!binder.resume("fly", 0.0));
        assert!(!binder.stop("fly"));
    }

    #[test]
    fn resolve_by_name_and_index() {
        let (_, _, binder) = bound(1);
        assert_eq!(
            binder.resolve(&AnimationBinding::Index(0)),
            Some("walk".to_string())
        );
        assert_eq!(binder.resolve(&AnimationBinding::Index(4)), None);
        assert_eq!(binder.resolve(&AnimationBinding::from("walk")), Some("walk".into()));
        assert_eq!(binder.resolve(&AnimationBinding::from("run")), None);
    }

    #[test]
    fn rebind_replaces_tracks() {
        let (_, clip, mut binder) = bound(1);
        binder.play("walk");
        let node = Rc::new(RefCell::new(SceneGroup::with_materials(1)));
        let other: TrackHandle = Rc::new(RefCell::new(ClipTrack::looping(2.0)));
        binder.bind(node, vec![("run".to_string(), other)]);
        assert!(!clip.borrow().is_running());
        assert_eq!(binder.track_names(), vec!["run".to_string()]);
    }
}
