use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of actor ids the engine knows about.
pub const DEFAULT_OWNER_COUNT: usize = 0x2B2;

/// Nesting depth the context stack tracks before sharing parent tables.
pub const DEFAULT_STACK_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn parse(path: &Path, source: serde_json::Error) -> Self {
        ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotContextConfig {
    pub owner_count: usize,
    pub stack_capacity: usize,
    /// Most recent slot events kept for inspection; 0 keeps none. Counters
    /// are kept either way.
    pub event_trail: usize,
}

impl Default for SlotContextConfig {
    fn default() -> Self {
        Self {
            owner_count: DEFAULT_OWNER_COUNT,
            stack_capacity: DEFAULT_STACK_CAPACITY,
            event_trail: 0,
        }
    }
}

impl SlotContextConfig {
    /// Reads a JSON config; a missing path yields the defaults.
    pub fn from_json_file(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path).map_err(|err| ConfigError::io(path, err))?;
        let config: SlotContextConfig =
            serde_json::from_str(&raw).map_err(|err| ConfigError::parse(path, err))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.owner_count == 0 {
            return Err(ConfigError::Invalid("owner_count must be at least 1".into()));
        }
        if self.owner_count > usize::from(u16::MAX) + 1 {
            return Err(ConfigError::Invalid(format!(
                "owner_count {} exceeds the 16-bit owner id space",
                self.owner_count
            )));
        }
        if self.stack_capacity == 0 {
            return Err(ConfigError::Invalid(
                "stack_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_path_uses_defaults() {
        let config = SlotContextConfig::from_json_file(None).expect("defaults");
        assert_eq!(config.owner_count, DEFAULT_OWNER_COUNT);
        assert_eq!(config.stack_capacity, 64);
        assert_eq!(config.event_trail, 0);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("slots.json");
        fs::write(&path, r#"{ "stack_capacity": 8 }"#).expect("write config");

        let config = SlotContextConfig::from_json_file(Some(&path)).expect("config");
        assert_eq!(config.stack_capacity, 8);
        assert_eq!(config.event_trail, 0);
        assert_eq!(config.owner_count, DEFAULT_OWNER_COUNT);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("slots.json");
        fs::write(&path, r#"{ "stack_capacity": 0 }"#).expect("write config");

        let err = SlotContextConfig::from_json_file(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unreadable_file_reports_path() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("missing.json");
        let err = SlotContextConfig::from_json_file(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("missing.json"));
    }
}
