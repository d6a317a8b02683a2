use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(rename = "state-machines")]
    state_machines: HashMap<String, MachineEntry>,
    #[serde(rename = "clip-sets", default)]
    clip_sets: HashMap<String, String>,
}

/// A machine config, optionally paired with the clip set it was authored against.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MachineEntry {
    Path(String),
    Detailed {
        config: String,
        #[serde(default)]
        clips: Option<String>,
    },
}

impl MachineEntry {
    fn config(&self) -> &str {
        match self {
            MachineEntry::Path(path) => path,
            MachineEntry::Detailed { config, .. } => config,
        }
    }

    fn clips(&self) -> Option<&str> {
        match self {
            MachineEntry::Path(_) => None,
            MachineEntry::Detailed { clips, .. } => clips.as_deref(),
        }
    }
}

/// Playback track description used to bind fixture machines.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ClipSpec {
    pub name: String,
    /// Seconds.
    pub duration: f32,
    #[serde(default)]
    pub looping: bool,
}

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
}

fn resolve_path(rel: &str) -> PathBuf {
    fixtures_root().join(rel)
}

fn read_to_string(rel: &str) -> Result<String> {
    let path = resolve_path(rel);
    fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture at {}", path.display()))
}

fn load_json<T: DeserializeOwned>(rel: &str) -> Result<T> {
    let text = read_to_string(rel)?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse JSON fixture {rel}"))
}

fn lookup<'a, T>(map: &'a HashMap<String, T>, kind: &str, name: &str) -> Result<&'a T> {
    map.get(name)
        .ok_or_else(|| anyhow!("unknown {kind} fixture '{name}'"))
}

pub mod state_machines {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.state_machines.keys().cloned().collect()
    }

    pub fn json(name: &str) -> Result<String> {
        let entry = lookup(&MANIFEST.state_machines, "state machine", name)?;
        read_to_string(entry.config())
    }

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let entry = lookup(&MANIFEST.state_machines, "state machine", name)?;
        super::load_json(entry.config())
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        let entry = lookup(&MANIFEST.state_machines, "state machine", name)?;
        Ok(resolve_path(entry.config()))
    }

    /// Clip set paired with the machine, if the manifest names one.
    pub fn clips(name: &str) -> Result<Option<Vec<ClipSpec>>> {
        let entry = lookup(&MANIFEST.state_machines, "state machine", name)?;
        match entry.clips() {
            Some(rel) => super::load_json(rel).map(Some),
            None => Ok(None),
        }
    }
}

pub mod clip_sets {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.clip_sets.keys().cloned().collect()
    }

    pub fn load(name: &str) -> Result<Vec<ClipSpec>> {
        let rel = lookup(&MANIFEST.clip_sets, "clip set", name)?;
        super::load_json(rel)
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        let rel = lookup(&MANIFEST.clip_sets, "clip set", name)?;
        Ok(resolve_path(rel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_manifest_entry_resolves() {
        for key in state_machines::keys() {
            let text = state_machines::json(&key).unwrap();
            assert!(serde_json::from_str::<serde_json::Value>(&text).is_ok(), "{key}");
            state_machines::clips(&key).unwrap();
        }
        for key in clip_sets::keys() {
            assert!(!clip_sets::load(&key).unwrap().is_empty(), "{key}");
        }
    }

    #[test]
    fn unknown_fixture_is_an_error() {
        assert!(state_machines::json("missing").is_err());
        assert!(clip_sets::path("missing").is_err());
    }
}
