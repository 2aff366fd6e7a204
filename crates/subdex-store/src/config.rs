use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Tunables for the index store.
///
/// Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Pretty-print the JSON written to the index file.
    pub pretty: bool,
    /// Capacity of the broadcast channel carrying [`StoreEvent`]s.
    ///
    /// [`StoreEvent`]: crate::StoreEvent
    pub event_capacity: usize,
    /// `fsync` the replacement file before it is renamed over the index.
    pub sync_on_write: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            pretty: true,
            event_capacity: 64,
            sync_on_write: true,
        }
    }
}

impl StoreConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Render the configuration as TOML.
    pub fn to_toml_string(&self) -> StoreResult<String> {
        toml::to_string(self).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Reject values the store cannot run with.
    pub fn validate(&self) -> StoreResult<()> {
        if self.event_capacity == 0 {
            return Err(StoreError::Config("event_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = StoreConfig::default();
        assert!(c.pretty);
        assert_eq!(c.event_capacity, 64);
        assert!(c.sync_on_write);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let c = StoreConfig::from_toml_str("pretty = false\n").unwrap();
        assert!(!c.pretty);
        assert_eq!(c.event_capacity, 64);
    }

    #[test]
    fn zero_capacity_rejected() {
        let result = StoreConfig::from_toml_str("event_capacity = 0");
        assert!(matches!(result, Err(StoreError::Config(_))));
    }

    #[test]
    fn malformed_toml_rejected() {
        let result = StoreConfig::from_toml_str("pretty = ");
        assert!(matches!(result, Err(StoreError::Config(_))));
    }

    #[test]
    fn toml_roundtrip() {
        let c = StoreConfig {
            pretty: false,
            event_capacity: 8,
            sync_on_write: false,
        };
        let text = c.to_toml_string().unwrap();
        assert_eq!(StoreConfig::from_toml_str(&text).unwrap(), c);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subdex.toml");
        std::fs::write(&path, "sync_on_write = false").unwrap();
        let c = StoreConfig::load(&path).unwrap();
        assert!(!c.sync_on_write);
    }
}
