//! Persistent storage for the learned bandit state
//!
//! The state is one small JSON document,
//! `{"counts": {...}, "values": {...}, "epsilon": 0.2}`, rewritten whole on
//! every save. Writes go to a sibling temp file first and are renamed into
//! place so a crash never leaves a half-written policy behind.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::Deserialize;
use tracing::debug;

use super::bandit::{DEFAULT_EPSILON, PolicyState};
use super::types::StrategyKind;
use crate::error::{Error, Result};

/// Durable home of the bandit state
pub trait PolicyStore: Send + Sync {
    /// Previously saved state, `None` when nothing was saved yet
    fn load(&self) -> Result<Option<PolicyState>>;

    /// Replace the saved state
    fn save(&self, state: &PolicyState) -> Result<()>;
}

/// On-disk shape; arm names are kept as strings so unknown arms can be skipped
#[derive(Debug, Deserialize)]
struct PolicyFile {
    #[serde(default)]
    counts: BTreeMap<String, f64>,
    #[serde(default)]
    values: BTreeMap<String, f64>,
    #[serde(default = "default_epsilon")]
    epsilon: f64,
}

fn default_epsilon() -> f64 {
    DEFAULT_EPSILON
}

impl PolicyFile {
    fn into_state(self) -> PolicyState {
        let mut state = PolicyState::with_epsilon(self.epsilon);

        for (name, count) in self.counts {
            match name.parse::<StrategyKind>() {
                Ok(kind) if count.is_finite() => {
                    state.counts.insert(kind, count.max(1.0).round() as u64);
                }
                Ok(_) => {}
                Err(_) => debug!(arm = %name, "Ignoring unknown arm in policy file"),
            }
        }
        for (name, value) in self.values {
            if let Ok(kind) = name.parse::<StrategyKind>() {
                state.values.insert(kind, value);
            }
        }

        // `with_epsilon` clamps, but a NaN in the file needs the default
        state.epsilon = self.epsilon;
        state.sanitized()
    }
}

/// JSON file policy store
#[derive(Debug, Clone)]
pub struct JsonPolicyStore {
    path: PathBuf,
}

impl JsonPolicyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "policy.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl PolicyStore for JsonPolicyStore {
    fn load(&self) -> Result<Option<PolicyState>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(None);
        }

        let file: PolicyFile = serde_json::from_str(&contents).map_err(|e| {
            Error::PolicyStore(format!("{} is not a valid policy file: {}", self.path.display(), e))
        })?;

        debug!(path = %self.path.display(), "Loaded policy state");
        Ok(Some(file.into_state()))
    }

    fn save(&self, state: &PolicyState) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let contents = serde_json::to_string_pretty(state)?;
        let temp = self.temp_path();
        fs::write(&temp, contents)?;
        fs::rename(&temp, &self.path)?;

        debug!(path = %self.path.display(), epsilon = state.epsilon, "Saved policy state");
        Ok(())
    }
}

/// In-memory policy store for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryPolicyStore {
    state: RwLock<Option<PolicyState>>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: PolicyState) -> Self {
        Self {
            state: RwLock::new(Some(state)),
        }
    }
}

impl PolicyStore for MemoryPolicyStore {
    fn load(&self) -> Result<Option<PolicyState>> {
        Ok(self
            .state
            .read()
            .map_err(|_| Error::PolicyStore("policy lock poisoned".to_string()))?
            .clone())
    }

    fn save(&self, state: &PolicyState) -> Result<()> {
        *self
            .state
            .write()
            .map_err(|_| Error::PolicyStore("policy lock poisoned".to_string()))? =
            Some(state.clone());
        Ok(())
    }
}
