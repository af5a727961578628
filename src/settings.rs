//! User settings store
//!
//! A small key→value store with per-key validation and defaults, persisted
//! as JSON in the user's data directory. Keys are a closed set; writing an
//! unknown key or a value of the wrong shape is rejected.

use crate::error::{ConvosyncError, Result};
use crate::providers::{default_model, ProviderModel};
use directories::ProjectDirs;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Key holding the user's selected completion model
pub const CURRENT_MODEL_KEY: &str = "current_model";

/// Key-validated settings store
pub struct SettingsStore {
    path: Option<PathBuf>,
    values: Mutex<HashMap<String, Value>>,
}

impl SettingsStore {
    /// Create a store persisted in the user's data directory
    pub fn new() -> Result<Self> {
        let proj_dirs = ProjectDirs::from("com", "convosync", "convosync")
            .ok_or_else(|| ConvosyncError::Settings("could not determine data directory".into()))?;
        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir).map_err(|e| {
            ConvosyncError::Settings(format!("failed to create data directory: {e}"))
        })?;
        Self::new_with_path(data_dir.join("settings.json"))
    }

    /// Create a store persisted at a specific path, loading existing values
    pub fn new_with_path<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let values = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConvosyncError::Settings(format!("failed to read settings: {e}")))?;
            serde_json::from_str(&contents)
                .map_err(|e| ConvosyncError::Settings(format!("failed to parse settings: {e}")))?
        } else {
            HashMap::new()
        };
        Ok(Self {
            path: Some(path),
            values: Mutex::new(values),
        })
    }

    /// Create an unpersisted store, useful for tests and ephemeral sessions
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: Mutex::new(HashMap::new()),
        }
    }

    fn values(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read a setting, falling back to the key's default
    ///
    /// # Errors
    ///
    /// Returns an error for keys outside the known set.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        if !is_known_key(key) {
            return Err(ConvosyncError::Settings(format!("unknown settings key: {key}")).into());
        }
        if let Some(value) = self.values().get(key) {
            return Ok(Some(value.clone()));
        }
        Ok(default_value(key))
    }

    /// Write a setting after validating its shape for the key
    ///
    /// # Errors
    ///
    /// Returns an error for unknown keys, mis-shaped values, or a failed
    /// write of the backing file.
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        validate(key, &value)?;
        let snapshot = {
            let mut values = self.values();
            values.insert(key.to_string(), value);
            values.clone()
        };
        if let Some(path) = &self.path {
            let contents = serde_json::to_string_pretty(&snapshot)?;
            std::fs::write(path, contents)
                .map_err(|e| ConvosyncError::Settings(format!("failed to write settings: {e}")))?;
        }
        Ok(())
    }
}

fn is_known_key(key: &str) -> bool {
    key == CURRENT_MODEL_KEY
}

fn validate(key: &str, value: &Value) -> Result<()> {
    match key {
        CURRENT_MODEL_KEY => {
            serde_json::from_value::<ProviderModel>(value.clone()).map_err(|e| {
                ConvosyncError::Settings(format!("invalid value for {key}: {e}"))
            })?;
            Ok(())
        }
        _ => Err(ConvosyncError::Settings(format!("unknown settings key: {key}")).into()),
    }
}

fn default_value(key: &str) -> Option<Value> {
    match key {
        CURRENT_MODEL_KEY => serde_json::to_value(default_model()).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_unset_key_returns_default_model() {
        let store = SettingsStore::in_memory();
        let value = store
            .get(CURRENT_MODEL_KEY)
            .expect("get failed")
            .expect("default present");
        let model: ProviderModel = serde_json::from_value(value).expect("model shape");
        assert_eq!(model.id, "gpt-5-nano");
    }

    #[test]
    fn test_set_then_get_round_trips() {
        let store = SettingsStore::in_memory();
        let model = ProviderModel::openai("gpt-5", "GPT 5");
        store
            .set(CURRENT_MODEL_KEY, serde_json::to_value(&model).expect("json"))
            .expect("set failed");
        let value = store
            .get(CURRENT_MODEL_KEY)
            .expect("get failed")
            .expect("value present");
        let loaded: ProviderModel = serde_json::from_value(value).expect("model shape");
        assert_eq!(loaded, model);
    }

    #[test]
    fn test_set_rejects_wrong_shape() {
        let store = SettingsStore::in_memory();
        let result = store.set(CURRENT_MODEL_KEY, serde_json::json!({"bogus": true}));
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let store = SettingsStore::in_memory();
        assert!(store.get("nope").is_err());
        assert!(store.set("nope", Value::Null).is_err());
    }

    #[test]
    fn test_persists_to_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        let model = ProviderModel::openai("gpt-5", "GPT 5");
        {
            let store = SettingsStore::new_with_path(&path).expect("store");
            store
                .set(CURRENT_MODEL_KEY, serde_json::to_value(&model).expect("json"))
                .expect("set failed");
        }

        let reloaded = SettingsStore::new_with_path(&path).expect("store");
        let value = reloaded
            .get(CURRENT_MODEL_KEY)
            .expect("get failed")
            .expect("value present");
        let loaded: ProviderModel = serde_json::from_value(value).expect("model shape");
        assert_eq!(loaded, model);
    }
}
