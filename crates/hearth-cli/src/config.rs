use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use hearth_host::{StaticTypes, BOOTSTRAP_MODULE_ID};
use hearth_runtime::{TypeDescriptor, TypeKind};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const CONFIG_FILE_NAME: &str = "hearth.toml";

pub const EXAMPLE_CONFIG: &str = r#"# Hearth Configuration

# Where modules, scripts and logs live. Defaults to the platform data directory.
# data_dir = "/srv/hearth"
# modules_dir = "/srv/hearth/modules"
# scripts_dir = "/srv/hearth/scripts"

# File extensions loaded as modules and scripts
extensions = ["js"]

# Module every script requires first; empty to disable
bootstrap_module = "finally"

# Only host types under this namespace can be imported by scripts
root_namespace = "org.example"

# Scheduler tick length
tick_interval_ms = 50

[logging]
file = true

[[host_types]]
name = "org.example.Player"

[[host_types]]
name = "org.example.event.PlayerJoinEvent"
kind = "event"
"#;

#[derive(Debug)]
pub enum ConfigLoadError {
    NotFound,
    ParseError(String),
    IoError(String),
}

impl std::fmt::Display for ConfigLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigLoadError::NotFound => write!(f, "Config file not found"),
            ConfigLoadError::ParseError(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigLoadError::IoError(msg) => write!(f, "IO error reading config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigLoadError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also log to `<data dir>/logs/hearth.log`
    #[serde(default = "default_true")]
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { file: true }
    }
}

/// A host type scripts may import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostTypeConfig {
    /// Qualified name
    pub name: String,
    #[serde(default)]
    pub kind: TypeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HearthConfig {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub modules_dir: Option<PathBuf>,
    #[serde(default)]
    pub scripts_dir: Option<PathBuf>,

    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    #[serde(default = "default_bootstrap_module")]
    pub bootstrap_module: String,

    #[serde(default)]
    pub root_namespace: String,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub host_types: Vec<HostTypeConfig>,
}

fn default_true() -> bool {
    true
}

fn default_extensions() -> Vec<String> {
    vec!["js".to_string()]
}

fn default_bootstrap_module() -> String {
    BOOTSTRAP_MODULE_ID.to_string()
}

fn default_tick_interval_ms() -> u64 {
    50
}

impl Default for HearthConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            modules_dir: None,
            scripts_dir: None,
            extensions: default_extensions(),
            bootstrap_module: default_bootstrap_module(),
            root_namespace: String::new(),
            tick_interval_ms: default_tick_interval_ms(),
            logging: LoggingConfig::default(),
            host_types: Vec::new(),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "hearth")
}

impl HearthConfig {
    pub fn config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        if !path.exists() {
            return Err(ConfigLoadError::NotFound);
        }

        let content =
            fs::read_to_string(path).map_err(|e| ConfigLoadError::IoError(e.to_string()))?;
        let config =
            toml::from_str(&content).map_err(|e| ConfigLoadError::ParseError(e.to_string()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(&self)?;
        fs::write(path, content)?;
        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Write the example configuration to `path`, never overwriting
    pub fn create_example(path: &Path) -> std::io::Result<()> {
        if path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("Config file already exists at {}", path.display()),
            ));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, EXAMPLE_CONFIG)?;
        info!("Created example config at {}", path.display());
        Ok(())
    }

    /// `data_dir`, else the platform data directory, else `./hearth`
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(|| project_dirs().map(|dirs| dirs.data_dir().to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("hearth"))
    }

    pub fn modules_dir(&self) -> PathBuf {
        self.modules_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("modules"))
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.scripts_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("scripts"))
    }

    pub fn log_file(&self) -> Option<PathBuf> {
        self.logging
            .file
            .then(|| self.data_dir().join("logs").join("hearth.log"))
    }

    pub fn bootstrap(&self) -> Option<&str> {
        let id = self.bootstrap_module.trim();
        (!id.is_empty()).then_some(id)
    }

    pub fn host_types(&self) -> StaticTypes {
        StaticTypes::new(
            self.host_types
                .iter()
                .map(|ty| TypeDescriptor::new(ty.name.clone(), ty.kind))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_host::HostTypes;
    use tempfile::TempDir;

    #[test]
    fn test_example_config_parses() {
        let config: HearthConfig = toml::from_str(EXAMPLE_CONFIG).unwrap();
        assert_eq!(config.extensions, vec!["js"]);
        assert_eq!(config.bootstrap(), Some("finally"));
        assert_eq!(config.root_namespace, "org.example");
        assert_eq!(config.tick_interval_ms, 50);
        assert!(config.logging.file);

        let types = config.host_types().list_public_types("org.example");
        assert_eq!(types.len(), 2);
        assert_eq!(types[0].simple_name, "Player");
        assert!(!types[0].is_event());
        assert!(types[1].is_event());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: HearthConfig = toml::from_str("").unwrap();
        assert_eq!(config, HearthConfig::default());
    }

    #[test]
    fn test_directories_follow_data_dir() {
        let config: HearthConfig = toml::from_str(
            "data_dir = \"/srv/hearth\"\nscripts_dir = \"/opt/scripts\"\nbootstrap_module = \"\"\n[logging]\nfile = false",
        )
        .unwrap();
        assert_eq!(config.modules_dir(), PathBuf::from("/srv/hearth/modules"));
        assert_eq!(config.scripts_dir(), PathBuf::from("/opt/scripts"));
        assert_eq!(config.bootstrap(), None);
        assert_eq!(config.log_file(), None);
    }

    #[test]
    fn test_load_missing_and_invalid() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        assert!(matches!(
            HearthConfig::load(&path),
            Err(ConfigLoadError::NotFound)
        ));

        fs::write(&path, "tick_interval_ms = \"fast\"").unwrap();
        assert!(matches!(
            HearthConfig::load(&path),
            Err(ConfigLoadError::ParseError(_))
        ));
    }

    #[test]
    fn test_example_written_once_and_saved_config_reloads() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join(CONFIG_FILE_NAME);

        HearthConfig::create_example(&path).unwrap();
        assert!(HearthConfig::create_example(&path).is_err());

        let mut config = HearthConfig::load(&path).unwrap();
        config.tick_interval_ms = 100;
        config.save(&path).unwrap();
        assert_eq!(HearthConfig::load(&path).unwrap(), config);
    }
}
