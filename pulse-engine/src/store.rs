//! Key-value persistence for weights, signal history and configuration.
//!
//! Values are stored as raw JSON strings under fixed keys. Loading never fails:
//! a missing key yields the default and a corrupt value is logged and replaced.

use crate::{
    config::DetectorConfig,
    error::StoreError,
    learner::{Signal, WeightTable},
};
use fnv::FnvHashMap;
use parking_lot::Mutex;
use serde::{Serialize, de::DeserializeOwned};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

pub const WEIGHTS_KEY: &str = "mlConditionWeights";
pub const HISTORY_KEY: &str = "quantumSignalSuccessHistory";
pub const CONFIG_KEY: &str = "quantumAccumulationConfig";

/// Raw string storage addressed by key
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Process-local store, used by tests and when no state directory is configured
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<FnvHashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path(key)?;
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path(key)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|source| StoreError::Io {
                key: key.to_string(),
                source,
            })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

/// Decode a stored JSON value.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    store
        .get(key)?
        .map(|raw| {
            serde_json::from_str(&raw).map_err(|source| StoreError::Serde {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
}

/// Encode and store a JSON value.
pub fn save_json<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value).map_err(|source| StoreError::Serde {
        key: key.to_string(),
        source,
    })?;
    store.set(key, &raw)
}

/// Everything that survives a restart or a context change
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedState {
    pub weights: WeightTable,
    pub history: Vec<Signal>,
    pub config: DetectorConfig,
}

impl PersistedState {
    /// Load every key, falling back to defaults on missing or corrupt values.
    pub fn load(store: &dyn KeyValueStore) -> Self {
        Self {
            weights: load_or_default(store, WEIGHTS_KEY),
            history: load_or_default(store, HISTORY_KEY),
            config: load_or_default(store, CONFIG_KEY),
        }
    }

    pub fn save_weights(store: &dyn KeyValueStore, weights: &WeightTable) -> Result<(), StoreError> {
        save_json(store, WEIGHTS_KEY, weights)
    }

    pub fn save_history(store: &dyn KeyValueStore, history: &[Signal]) -> Result<(), StoreError> {
        save_json(store, HISTORY_KEY, &history)
    }

    pub fn save_config(store: &dyn KeyValueStore, config: &DetectorConfig) -> Result<(), StoreError> {
        save_json(store, CONFIG_KEY, config)
    }

    /// Rewrite the stored config with defaults and return them.
    pub fn reset_config(store: &dyn KeyValueStore) -> Result<DetectorConfig, StoreError> {
        let config = DetectorConfig::default();
        Self::save_config(store, &config)?;
        Ok(config)
    }
}

fn load_or_default<T: DeserializeOwned + Default>(store: &dyn KeyValueStore, key: &str) -> T {
    match load_json(store, key) {
        Ok(Some(value)) => value,
        Ok(None) => {
            debug!(key, "no stored value, using defaults");
            T::default()
        }
        Err(error) => {
            warn!(key, %error, "failed to load stored value, using defaults");
            T::default()
        }
    }
}
