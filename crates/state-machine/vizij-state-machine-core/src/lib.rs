//! Vizij State Machine Core (engine-agnostic)
//!
//! Drives timed transitions between named playback states of a scene node:
//! a registry of states and prioritized transitions, a binder over the host's
//! node and playback tracks, and an engine that advances a single in-flight
//! transition per frame (opacity/scale blending plus a hard track switch at the
//! switch point). Hosts call [`StateMachine::update`] once per frame.

pub mod binding;
pub mod clip;
pub mod config;
pub mod descriptor;
pub mod easing;
pub mod effect;
pub mod error;
pub mod events;
pub mod ids;
pub mod machine;
pub mod outputs;
pub mod registry;

// Re-exports for consumers (adapters)
pub use binding::{
    NodeHandle, NodeSnapshot, OpacityChannel, PlaybackBinder, PlaybackTrack, SceneNode,
    TrackHandle,
};
pub use clip::{ClipTrack, Material, SceneGroup};
pub use config::{
    parse_machine_config_json, EffectConfig, EffectKind, MachineConfig, DEFAULT_DURATION_MS,
    DEFAULT_SWITCH_POINT,
};
pub use descriptor::{
    AnimationBinding, Callback, Predicate, StateDescriptor, TransitionCondition,
    TransitionDescriptor, UpdateCallback,
};
pub use easing::Easing;
pub use effect::{EffectSample, Phase};
pub use error::MachineError;
pub use events::{EventBus, EventKind, Listener, MachineEvent};
pub use ids::ListenerId;
pub use machine::{RuntimeSnapshot, StateMachine};
pub use outputs::Outputs;
pub use registry::Registry;
