use crate::dbus::BusType;
use directories::ProjectDirs;
use ini::Ini;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to find config directory")]
    NoConfigDir,

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to parse config: {0}")]
    IniError(#[from] ini::ParseError),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

/// Legacy per-user configuration file of the command-line client.
const LEGACY_USER_FILE: &str = ".cdemu";

/// System-wide configuration file.
const SYSTEM_FILE: &str = "/etc/cdemu.conf";

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub applet: AppletConfig,
}

/// Settings shared by both clients.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DefaultsConfig {
    /// Bus used by the command-line client: "session" or "system".
    ///
    /// Kept as text so an unknown value only produces a warning at startup.
    #[serde(default = "default_bus")]
    pub bus: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self { bus: default_bus() }
    }
}

fn default_bus() -> String {
    BusType::default().as_str().to_string()
}

/// Tray applet settings, written back when toggled from the menu.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppletConfig {
    #[serde(default = "default_true")]
    pub show_notifications: bool,

    #[serde(default)]
    pub use_system_bus: bool,
}

impl Default for AppletConfig {
    fn default() -> Self {
        Self {
            show_notifications: true,
            use_system_bus: false,
        }
    }
}

impl AppletConfig {
    pub fn bus(&self) -> BusType {
        if self.use_system_bus {
            BusType::System
        } else {
            BusType::Session
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    fn project_dirs() -> Result<ProjectDirs, ConfigError> {
        ProjectDirs::from("net", "cdemu", "cdemu").ok_or(ConfigError::NoConfigDir)
    }

    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        Ok(Self::project_dirs()?.config_dir().to_path_buf())
    }

    /// Get the data directory path (for logs and crash reports)
    pub fn data_dir() -> Result<PathBuf, ConfigError> {
        Ok(Self::project_dirs()?.data_dir().to_path_buf())
    }

    /// Get the per-user config file path
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Candidate files, most specific first.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(path) = Self::config_path() {
            paths.push(path);
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(LEGACY_USER_FILE));
        }
        paths.push(PathBuf::from(SYSTEM_FILE));
        paths
    }

    /// First existing file among `paths`.
    pub fn find(paths: &[PathBuf]) -> Option<&Path> {
        paths.iter().map(PathBuf::as_path).find(|p| p.is_file())
    }

    /// Load one file: `.toml` files as TOML, anything else as legacy INI.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&contents)?
        } else {
            Self::from_ini(&contents)?
        };
        debug!("Config loaded from: {}", path.display());
        Ok(config)
    }

    /// Parse the INI layout of `~/.cdemu` and `/etc/cdemu.conf`.
    ///
    /// Only `[defaults] bus` is read; values are unquoted.
    pub fn from_ini(contents: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(contents)?;
        let mut config = Self::default();
        if let Some(bus) = ini.section(Some("defaults")).and_then(|s| s.get("bus")) {
            config.defaults.bus = bus.trim().to_string();
        }
        Ok(config)
    }

    /// Load the first config file found, falling back to defaults.
    ///
    /// A file that exists but cannot be read yields defaults plus a warning
    /// for the caller to show.
    pub fn load() -> (Self, Option<String>) {
        Self::load_first(&Self::search_paths())
    }

    pub fn load_first(paths: &[PathBuf]) -> (Self, Option<String>) {
        let Some(path) = Self::find(paths) else {
            return (Self::default(), None);
        };

        match Self::load_from(path) {
            Ok(config) => (config, None),
            Err(e) => (
                Self::default(),
                Some(format!(
                    "Failed to load configuration from file '{}': {}",
                    path.display(),
                    e
                )),
            ),
        }
    }

    /// Bus for the command-line client, with a warning if the setting is unknown.
    pub fn bus(&self) -> (BusType, Option<String>) {
        BusType::resolve(&self.defaults.bus)
    }

    /// Save to the per-user config path.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;

        info!("Config saved to: {}", path.display());
        Ok(())
    }
}
