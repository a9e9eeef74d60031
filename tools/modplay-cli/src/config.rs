//! Settings persistence (config.toml)
//!
//! Values are kept as strings in one table per section, the same shape the
//! plugin's in-memory store uses. Integers written by hand are accepted
//! when loading.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hashbrown::HashMap;
use modplay_input::config::SettingsTable;
use modplay_input::{ConfigStore, MemoryConfig};
use tracing::{debug, warn};

/// Settings store backed by a TOML file
pub struct TomlConfig {
    path: Option<PathBuf>,
    settings: MemoryConfig,
}

/// Platform config file: `<config dir>/modplay/config.toml`
pub fn default_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "modplay")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

impl TomlConfig {
    /// Load settings from `path` (or the platform default)
    ///
    /// A missing file yields an empty store. A file that does not parse is
    /// reported and ignored.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = path.or_else(default_path);
        let table = match &path {
            Some(path) if path.exists() => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                parse(&text).unwrap_or_else(|e| {
                    warn!(path = %path.display(), error = %e, "ignoring malformed settings file");
                    SettingsTable::new()
                })
            }
            _ => SettingsTable::new(),
        };
        debug!(path = ?path, sections = table.len(), "settings loaded");
        Ok(Self {
            path,
            settings: MemoryConfig::from_table(table),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write every value back to the settings file
    pub fn save(&self) -> Result<()> {
        let path = self
            .path
            .as_ref()
            .context("No settings file location (no home directory?)")?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let text = toml::to_string_pretty(&self.settings.snapshot())
            .context("Failed to serialize settings")?;
        std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
        debug!(path = %path.display(), "settings saved");
        Ok(())
    }
}

fn parse(text: &str) -> Result<SettingsTable, toml::de::Error> {
    let raw: HashMap<String, HashMap<String, toml::Value>> = toml::from_str(text)?;
    Ok(raw
        .into_iter()
        .map(|(section, values)| {
            let values = values
                .into_iter()
                .map(|(key, value)| {
                    let text = match value {
                        toml::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (key, text)
                })
                .collect();
            (section, values)
        })
        .collect())
}

impl ConfigStore for TomlConfig {
    fn set_defaults(&self, section: &str, defaults: &[(&str, &str)]) {
        self.settings.set_defaults(section, defaults);
    }

    fn get_int(&self, section: &str, key: &str) -> i32 {
        self.settings.get_int(section, key)
    }

    fn set_int(&self, section: &str, key: &str, value: i32) {
        self.settings.set_int(section, key, value);
    }

    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.settings.get_string(section, key)
    }
}
