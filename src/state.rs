//! `enabledmods.json`: the persisted name → enabled map the game reads at launch.
//!
//! Reads default to enabled, but the first toggle of an unseen name stores `false`. Every
//! write rewrites the whole file; there is no merge with concurrent writers. A file that
//! no longer parses reads as empty and rejects `set`/`toggle` until it is regenerated.

use crate::error::{ModError, ModResult};
use crate::game::GamePaths;
use indexmap::IndexMap;
use serde_json::Value;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

type StateMap = IndexMap<String, Value>;

#[derive(Debug, Clone)]
pub struct StateStore {
    file: PathBuf,
    mods_dir: PathBuf,
}

impl StateStore {
    pub fn new(paths: &GamePaths) -> Self {
        Self {
            file: paths.state_file.clone(),
            mods_dir: paths.mods_dir.clone(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file
    }

    /// An unparsable file reads as empty, so every name comes back enabled until the file
    /// is regenerated.
    pub fn get(&self, name: &str) -> ModResult<bool> {
        let data = match self.load() {
            Ok(data) => data,
            Err(err @ ModError::State { .. }) => {
                warn!("{err:#}; treating every mod as enabled");
                StateMap::new()
            }
            Err(err) => return Err(err),
        };
        Ok(!matches!(data.get(name), Some(Value::Bool(false))))
    }

    pub fn set(&self, name: &str, enabled: bool) -> ModResult<()> {
        let mut data = self.load()?;
        data.insert(name.to_string(), Value::Bool(enabled));
        self.save(&data)?;
        debug!(name, enabled, "mod state set");
        Ok(())
    }

    pub fn enable(&self, name: &str) -> ModResult<()> {
        self.set(name, true)
    }

    pub fn disable(&self, name: &str) -> ModResult<()> {
        self.set(name, false)
    }

    /// Flips a stored value, or stores `false` for a name that has no entry yet. A stored
    /// `null` counts as no entry.
    /// Returns the new state.
    pub fn toggle(&self, name: &str) -> ModResult<bool> {
        let mut data = self.load()?;
        let enabled = match data.get(name) {
            Some(Value::Null) | None => false,
            Some(value) => !truthy(value),
        };
        data.insert(name.to_string(), Value::Bool(enabled));
        self.save(&data)?;
        debug!(name, enabled, "mod state toggled");
        Ok(enabled)
    }

    /// Replaces the whole map with `name → true` for every given name. Prior disabled
    /// entries are lost.
    pub fn regenerate<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> ModResult<()> {
        self.ensure_file()?;
        let data: StateMap = names
            .into_iter()
            .map(|name| (name.to_string(), Value::Bool(true)))
            .collect();
        self.save(&data)?;
        debug!(entries = data.len(), "mod state regenerated");
        Ok(())
    }

    fn ensure_file(&self) -> ModResult<()> {
        if !self.mods_dir.exists() {
            fs::create_dir_all(&self.mods_dir)?;
        }
        if !self.file.exists() {
            fs::write(&self.file, "{}")?;
        }
        Ok(())
    }

    fn load(&self) -> ModResult<StateMap> {
        self.ensure_file()?;
        let raw = fs::read_to_string(&self.file)?;
        let raw = raw.trim_start_matches('\u{feff}');
        if raw.trim().is_empty() {
            return Ok(StateMap::new());
        }
        serde_json::from_str(raw).map_err(|err| ModError::state(&self.file, err))
    }

    fn save(&self, data: &StateMap) -> ModResult<()> {
        let raw = serde_json::to_string(data).map_err(|err| ModError::state(&self.file, err))?;
        fs::write(&self.file, raw)?;
        Ok(())
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map_or(true, |n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
