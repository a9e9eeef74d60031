//! In-memory settings store

use std::sync::RwLock;

use hashbrown::HashMap;

use crate::host::ConfigStore;

/// Section -> key -> value
pub type SettingsTable = HashMap<String, HashMap<String, String>>;

/// [`ConfigStore`] kept in process memory
#[derive(Debug, Default)]
pub struct MemoryConfig {
    table: RwLock<SettingsTable>,
}

impl MemoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store built from existing values
    pub fn from_table(table: SettingsTable) -> Self {
        Self {
            table: RwLock::new(table),
        }
    }

    /// Copy of every stored value
    pub fn snapshot(&self) -> SettingsTable {
        self.table.read().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn set_string(&self, section: &str, key: &str, value: &str) {
        if let Ok(mut table) = self.table.write() {
            table
                .entry(section.to_string())
                .or_default()
                .insert(key.to_string(), value.to_string());
        }
    }
}

impl ConfigStore for MemoryConfig {
    fn set_defaults(&self, section: &str, defaults: &[(&str, &str)]) {
        let Ok(mut table) = self.table.write() else {
            return;
        };
        let entries = table.entry(section.to_string()).or_default();
        for (key, value) in defaults {
            entries
                .entry((*key).to_string())
                .or_insert_with(|| (*value).to_string());
        }
    }

    fn get_int(&self, section: &str, key: &str) -> i32 {
        self.get_string(section, key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    fn set_int(&self, section: &str, key: &str, value: i32) {
        self.set_string(section, key, &value.to_string());
    }

    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        let table = self.table.read().ok()?;
        table.get(section)?.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_do_not_overwrite() {
        let config = MemoryConfig::new();
        config.set_int("modplay", "interpolator", 0);
        config.set_defaults("modplay", &[("interpolator", "2"), ("stereo_separation", "70")]);
        assert_eq!(config.get_int("modplay", "interpolator"), 0);
        assert_eq!(config.get_int("modplay", "stereo_separation"), 70);
    }

    #[test]
    fn test_missing_and_unparsable_read_as_zero() {
        let config = MemoryConfig::new();
        assert_eq!(config.get_int("modplay", "nothing"), 0);
        config.set_string("modplay", "word", "loud");
        assert_eq!(config.get_int("modplay", "word"), 0);
        assert_eq!(config.get_string("modplay", "word").as_deref(), Some("loud"));
    }

    #[test]
    fn test_sections_are_separate() {
        let config = MemoryConfig::new();
        config.set_int("a", "x", 1);
        config.set_int("b", "x", 2);
        assert_eq!(config.get_int("a", "x"), 1);
        assert_eq!(config.get_int("b", "x"), 2);
        assert_eq!(config.snapshot().len(), 2);
    }
}
