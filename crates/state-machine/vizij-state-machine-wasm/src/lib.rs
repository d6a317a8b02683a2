use std::cell::RefCell;
use std::rc::Rc;

use js_sys::{Function, JSON};
use serde::{Deserialize, Serialize};
use serde_wasm_bindgen as swb;
use wasm_bindgen::prelude::*;

use vizij_state_machine_core::{
    parse_machine_config_json, ClipTrack, EventKind, ListenerId, MachineEvent, PlaybackTrack,
    SceneGroup, StateDescriptor, StateMachine, TrackHandle, TransitionCondition,
    TransitionDescriptor,
};

/// Clip description passed to `bind`. Duration is in seconds.
#[derive(Debug, Deserialize)]
struct TrackSpec {
    name: String,
    duration: f32,
    #[serde(default)]
    looping: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrackFrame<'a> {
    name: &'a str,
    time: f32,
    running: bool,
}

/// Per-update payload: events plus the visual channels the host applies to its scene.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Frame<'a> {
    events: &'a [MachineEvent],
    opacity: Option<f32>,
    transparent: bool,
    scale: [f32; 3],
    tracks: Vec<TrackFrame<'a>>,
}

#[wasm_bindgen]
pub struct VizijStateMachine {
    core: StateMachine,
    node: Rc<RefCell<SceneGroup>>,
    tracks: Vec<(String, Rc<RefCell<ClipTrack>>)>,
}

fn jsvalue_is_undefined_or_null(v: &JsValue) -> bool {
    v.is_undefined() || v.is_null()
}

fn stringify(value: &JsValue, what: &str) -> Result<String, JsError> {
    JSON::stringify(value)
        .map_err(|e| JsError::new(&format!("{what} stringify error: {:?}", e)))?
        .as_string()
        .ok_or_else(|| JsError::new(&format!("{what}: stringify produced non-string")))
}

fn parse_kind(kind: &str) -> Result<EventKind, JsError> {
    EventKind::from_name(kind).ok_or_else(|| JsError::new(&format!("unknown event kind '{kind}'")))
}

#[wasm_bindgen]
impl VizijStateMachine {
    /// Create a machine from a JSON config object.
    /// Example:
    ///   new VizijStateMachine({ id: "hero", initialState: "idle", states: [...], transitions: [...] })
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<VizijStateMachine, JsError> {
        console_error_panic_hook::set_once();

        if jsvalue_is_undefined_or_null(&config) {
            return Err(JsError::new("config is null/undefined"));
        }
        let text = stringify(&config, "config")?;
        let cfg = parse_machine_config_json(&text)
            .map_err(|e| JsError::new(&format!("config error: {e}")))?;

        Ok(VizijStateMachine {
            core: StateMachine::new(cfg),
            node: Rc::new(RefCell::new(SceneGroup::with_materials(1))),
            tracks: Vec::new(),
        })
    }

    /// Bind clips `[{ name, duration, looping }]`. `materials` sets how many
    /// opacity channels the internal node carries (default 1).
    #[wasm_bindgen]
    pub fn bind(&mut self, tracks: JsValue, materials: Option<u32>) -> Result<(), JsError> {
        let specs: Vec<TrackSpec> = if jsvalue_is_undefined_or_null(&tracks) {
            Vec::new()
        } else {
            swb::from_value(tracks).map_err(|e| JsError::new(&format!("tracks error: {e}")))?
        };
        let count = materials.unwrap_or(1) as usize;
        self.node = Rc::new(RefCell::new(SceneGroup::with_materials(count)));
        self.tracks = specs
            .into_iter()
            .map(|s| (s.name, Rc::new(RefCell::new(ClipTrack::new(s.duration, s.looping)))))
            .collect();
        let handles: Vec<(String, TrackHandle)> = self
            .tracks
            .iter()
            .map(|(name, clip)| {
                let handle: TrackHandle = clip.clone();
                (name.clone(), handle)
            })
            .collect();
        self.core.bind(self.node.clone(), handles);
        Ok(())
    }

    #[wasm_bindgen]
    pub fn start(&mut self) -> bool {
        self.core.start()
    }

    #[wasm_bindgen]
    pub fn stop(&mut self) -> bool {
        self.core.stop()
    }

    /// Step by dt (milliseconds). Returns `{ events, opacity, transparent, scale, tracks }`.
    #[wasm_bindgen]
    pub fn update(&mut self, dt: f32) -> Result<JsValue, JsError> {
        let out = self.core.update(dt);
        let node = self.node.borrow();
        let frame = Frame {
            events: &out.events,
            opacity: node.opacity(),
            transparent: node.materials.iter().any(|m| m.transparent),
            scale: node.scale,
            tracks: self
                .tracks
                .iter()
                .map(|(name, clip)| {
                    let clip = clip.borrow();
                    TrackFrame {
                        name,
                        time: clip.time(),
                        running: clip.is_running(),
                    }
                })
                .collect(),
        };
        swb::to_value(&frame).map_err(|e| JsError::new(&format!("outputs error: {e}")))
    }

    #[wasm_bindgen]
    pub fn trigger(&mut self, transition_id: String) -> bool {
        self.core.trigger(&transition_id)
    }

    /// Jump to `stateId`. `withEffect` defaults to true (synthesized cross-fade).
    #[wasm_bindgen(js_name = goToState)]
    pub fn go_to_state(&mut self, state_id: String, with_effect: Option<bool>) -> bool {
        self.core.go_to_state(&state_id, with_effect.unwrap_or(true))
    }

    #[wasm_bindgen(js_name = getState)]
    pub fn get_state(&self) -> Result<JsValue, JsError> {
        swb::to_value(&self.core.get_state())
            .map_err(|e| JsError::new(&format!("state error: {e}")))
    }

    #[wasm_bindgen(js_name = getStateIds)]
    pub fn get_state_ids(&self) -> Vec<String> {
        self.core.get_state_ids()
    }

    #[wasm_bindgen(js_name = getAvailableTransitions)]
    pub fn get_available_transitions(&self, state_id: Option<String>) -> Result<JsValue, JsError> {
        let list = self.core.get_available_transitions(state_id.as_deref());
        swb::to_value(&list).map_err(|e| JsError::new(&format!("transitions error: {e}")))
    }

    #[wasm_bindgen(js_name = getAnimationNames)]
    pub fn get_animation_names(&self) -> Vec<String> {
        self.core.get_animation_names()
    }

    /// Register a state from a JSON descriptor.
    #[wasm_bindgen(js_name = addState)]
    pub fn add_state(&mut self, state: JsValue) -> Result<(), JsError> {
        let desc: StateDescriptor =
            swb::from_value(state).map_err(|e| JsError::new(&format!("state error: {e}")))?;
        self.core.add_state(desc);
        Ok(())
    }

    /// Register a transition from a JSON descriptor.
    #[wasm_bindgen(js_name = addTransition)]
    pub fn add_transition(&mut self, transition: JsValue) -> Result<(), JsError> {
        let desc: TransitionDescriptor = swb::from_value(transition)
            .map_err(|e| JsError::new(&format!("transition error: {e}")))?;
        self.core.add_transition(desc);
        Ok(())
    }

    /// Register a transition guarded by `predicate() -> boolean`, polled every idle frame.
    /// A throwing or non-boolean predicate counts as false.
    #[wasm_bindgen(js_name = addCustomTransition)]
    pub fn add_custom_transition(
        &mut self,
        transition: JsValue,
        predicate: Function,
    ) -> Result<(), JsError> {
        let desc: TransitionDescriptor = swb::from_value(transition)
            .map_err(|e| JsError::new(&format!("transition error: {e}")))?;
        let condition = TransitionCondition::custom(move || {
            predicate
                .call0(&JsValue::UNDEFINED)
                .ok()
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
        });
        self.core.add_transition(desc.with_condition(condition));
        Ok(())
    }

    /// Subscribe `listener(event)` to an event kind ("stateEnter", "transitionEnd", ...).
    /// Returns a listener id for `off`.
    #[wasm_bindgen]
    pub fn on(&mut self, kind: String, listener: Function) -> Result<u32, JsError> {
        let kind = parse_kind(&kind)?;
        let id = self.core.subscribe(kind, move |event| {
            if let Ok(payload) = swb::to_value(event) {
                let _ = listener.call1(&JsValue::UNDEFINED, &payload);
            }
        });
        Ok(id.0)
    }

    #[wasm_bindgen]
    pub fn off(&mut self, kind: String, id: u32) -> Result<bool, JsError> {
        let kind = parse_kind(&kind)?;
        Ok(self.core.unsubscribe(kind, ListenerId(id)))
    }

    /// Stop and release registries, listeners and bound clips.
    #[wasm_bindgen]
    pub fn dispose(&mut self) {
        self.core.dispose();
        self.tracks.clear();
    }
}

/// ABI guard for npm wrappers.
#[wasm_bindgen]
pub fn abi_version() -> u32 {
    1
}
