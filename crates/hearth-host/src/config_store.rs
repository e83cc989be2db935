use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{HostError, HostResult};

/// A script's persisted configuration document
pub type ConfigMap = serde_json::Map<String, serde_json::Value>;

pub const CONFIG_FILE_NAME: &str = "config.json";

/// Persists per-script configuration
pub trait ConfigStore {
    /// A script without stored configuration gets an empty map
    fn load(&self, script_id: &str, data_folder: &Path) -> HostResult<ConfigMap>;

    fn save(&self, script_id: &str, data_folder: &Path, config: &ConfigMap) -> HostResult<()>;
}

/// Stores `config.json` in the script's data folder, pretty printed
#[derive(Debug, Clone, Default)]
pub struct JsonConfigStore;

impl JsonConfigStore {
    pub fn new() -> Self {
        Self
    }

    pub fn config_path(data_folder: &Path) -> PathBuf {
        data_folder.join(CONFIG_FILE_NAME)
    }
}

impl ConfigStore for JsonConfigStore {
    fn load(&self, _script_id: &str, data_folder: &Path) -> HostResult<ConfigMap> {
        let path = Self::config_path(data_folder);

        if !path.exists() {
            return Ok(ConfigMap::new());
        }

        let content = fs::read_to_string(&path).map_err(|e| HostError::io(&path, e))?;
        let config = serde_json::from_str(&content)
            .map_err(|source| HostError::Config { path: path.clone(), source })?;
        debug!(target: "scripting", "Loaded config from {}", path.display());
        Ok(config)
    }

    fn save(&self, _script_id: &str, data_folder: &Path, config: &ConfigMap) -> HostResult<()> {
        let path = Self::config_path(data_folder);

        fs::create_dir_all(data_folder).map_err(|e| HostError::io(data_folder, e))?;

        let content = serde_json::to_string_pretty(config)
            .map_err(|source| HostError::Config { path: path.clone(), source })?;
        fs::write(&path, content).map_err(|e| HostError::io(&path, e))?;
        debug!(target: "scripting", "Saved config to {}", path.display());
        Ok(())
    }
}

/// Keeps configuration in memory only
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    entries: RefCell<HashMap<String, ConfigMap>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, script_id: &str) -> Option<ConfigMap> {
        self.entries.borrow().get(script_id).cloned()
    }

    pub fn insert(&self, script_id: impl Into<String>, config: ConfigMap) {
        self.entries.borrow_mut().insert(script_id.into(), config);
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self, script_id: &str, _data_folder: &Path) -> HostResult<ConfigMap> {
        Ok(self.get(script_id).unwrap_or_default())
    }

    fn save(&self, script_id: &str, _data_folder: &Path, config: &ConfigMap) -> HostResult<()> {
        self.insert(script_id, config.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample() -> ConfigMap {
        match json!({"greeting": "hello", "count": 3, "nested": {"on": true}}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_missing_file_is_empty_config() {
        let temp = TempDir::new().unwrap();
        let store = JsonConfigStore::new();
        assert!(store.load("nothing", temp.path()).unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let folder = temp.path().join("greeter");
        let store = JsonConfigStore::new();

        store.save("greeter", &folder, &sample()).unwrap();
        let path = folder.join("config.json");
        assert_eq!(JsonConfigStore::config_path(&folder), path);
        assert!(path.exists());
        // Pretty printed
        assert!(fs::read_to_string(&path).unwrap().contains("\n  "));

        assert_eq!(store.load("greeter", &folder).unwrap(), sample());
    }

    #[test]
    fn test_non_object_document_is_config_error() {
        let temp = TempDir::new().unwrap();
        let store = JsonConfigStore::new();
        fs::write(temp.path().join("config.json"), "[1, 2]").unwrap();

        let err = store.load("bad", temp.path()).unwrap_err();
        assert!(matches!(err, HostError::Config { .. }));
        assert!(!err.is_caller_error());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryConfigStore::new();
        let folder = Path::new("unused");
        assert!(store.load("a", folder).unwrap().is_empty());
        store.save("a", folder, &sample()).unwrap();
        assert_eq!(store.load("a", folder).unwrap(), sample());
    }
}
