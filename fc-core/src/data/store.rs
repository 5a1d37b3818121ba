//! Configuration persistence
//!
//! The daemon never touches the configuration file directly; it goes through
//! a [`ConfigStore`] so `set_config` and `reload` can be exercised in tests
//! without a filesystem.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info};

use fc_error::{FanctlError, Result};

use super::config::{ConfigData, DEFAULT_CONFIG_JSON};

/// Where a configuration document is loaded from and saved to
#[cfg_attr(test, mockall::automock)]
pub trait ConfigStore: Send + Sync {
    /// Load and validate the current document
    fn load(&self) -> Result<ConfigData>;

    /// Persist a document that already passed validation
    fn save(&self, data: &ConfigData) -> Result<()>;

    /// Human-readable location, used in logs
    fn location(&self) -> String;
}

/// JSON file on disk
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the bundled default configuration if the file does not exist yet
    ///
    /// Returns `true` when the file was created.
    pub fn install_default_if_missing(&self) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }
        write_atomic(&self.path, DEFAULT_CONFIG_JSON)?;
        info!(path = %self.path.display(), "Installed default configuration");
        Ok(true)
    }
}

impl ConfigStore for JsonFileStore {
    fn load(&self) -> Result<ConfigData> {
        let content = fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => FanctlError::config(format!(
                "configuration file {} does not exist",
                self.path.display()
            )),
            _ => FanctlError::FileRead {
                path: self.path.clone(),
                source: e,
            },
        })?;

        let data = ConfigData::from_json(&content)?;
        debug!(
            path = %self.path.display(),
            strategies = data.strategies.len(),
            "Loaded configuration"
        );
        Ok(data)
    }

    fn save(&self, data: &ConfigData) -> Result<()> {
        let json = data.to_json_pretty()?;
        write_atomic(&self.path, &json)?;
        debug!(path = %self.path.display(), "Saved configuration");
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Write to a temp file next to `path`, sync, then rename over it
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| FanctlError::FileWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }

    let temp_path = path.with_extension("json.tmp");
    let write_err = |e| FanctlError::FileWrite {
        path: temp_path.clone(),
        source: e,
    };

    let mut file = fs::File::create(&temp_path).map_err(write_err)?;
    file.write_all(contents.as_bytes()).map_err(write_err)?;
    file.write_all(b"\n").map_err(write_err)?;
    file.sync_all().map_err(write_err)?;
    drop(file);

    fs::rename(&temp_path, path).map_err(|e| FanctlError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })
}

/// In-process store, used when embedding the daemon and in tests
#[derive(Debug)]
pub struct MemoryConfigStore {
    current: Mutex<ConfigData>,
}

impl MemoryConfigStore {
    pub fn new(data: ConfigData) -> Self {
        Self {
            current: Mutex::new(data),
        }
    }

    /// Replace the stored document without validation, like an external edit
    pub fn replace(&self, data: ConfigData) {
        *self.current.lock() = data;
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<ConfigData> {
        let data = self.current.lock().clone();
        data.validate()?;
        Ok(data)
    }

    fn save(&self, data: &ConfigData) -> Result<()> {
        *self.current.lock() = data.clone();
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_install_default_then_load() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("config.json"));

        assert!(store.install_default_if_missing().unwrap());
        assert!(!store.install_default_if_missing().unwrap());

        let data = store.load().unwrap();
        assert_eq!(data.default_strategy, "lazy");
        assert_eq!(data.strategy_on_discharging, "laziest");
    }

    #[test]
    fn test_save_is_atomic_and_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let store = JsonFileStore::new(&path);

        let mut data = ConfigData::builtin().unwrap();
        data.default_strategy = "medium".into();
        store.save(&data).unwrap();

        assert!(!path.with_extension("json.tmp").exists());
        let on_disk = fs::read_to_string(&path).unwrap();
        assert!(on_disk.contains("\"defaultStrategy\": \"medium\""));
        assert_eq!(store.load().unwrap(), data);
    }

    #[test]
    fn test_missing_file_is_config_parse() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));
        assert!(matches!(store.load(), Err(FanctlError::ConfigParse(_))));
    }

    #[test]
    fn test_invalid_file_is_config_parse() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"defaultStrategy": "x", "strategies": {}}"#).unwrap();
        let store = JsonFileStore::new(&path);
        assert!(matches!(store.load(), Err(FanctlError::ConfigParse(_))));
    }

    #[test]
    fn test_memory_store_validates_on_load() {
        let store = MemoryConfigStore::new(ConfigData::builtin().unwrap());
        assert!(store.load().is_ok());

        let mut broken = ConfigData::builtin().unwrap();
        broken.default_strategy = "missing".into();
        store.replace(broken);
        assert!(matches!(store.load(), Err(FanctlError::ConfigParse(_))));
    }
}
