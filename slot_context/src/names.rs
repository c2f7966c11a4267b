use std::{collections::BTreeMap, fs, path::Path};

use crate::config::ConfigError;
use crate::store::OwnerId;

/// Human readable labels for owner ids, used by logs and reports.
#[derive(Debug, Default, Clone)]
pub struct OwnerNames {
    names: BTreeMap<OwnerId, String>,
    by_label: BTreeMap<String, OwnerId>,
}

impl OwnerNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `{ "0x00EC": "En_Rd", "236": "..." }`. A missing path yields an
    /// empty table.
    pub fn from_json_file(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut names = OwnerNames::new();
        let Some(path) = path else {
            return Ok(names);
        };
        let raw = fs::read_to_string(path).map_err(|err| ConfigError::io(path, err))?;
        let map: BTreeMap<String, String> =
            serde_json::from_str(&raw).map_err(|err| ConfigError::parse(path, err))?;
        for (key, label) in map {
            let owner = parse_owner_id(&key).ok_or_else(|| {
                ConfigError::Invalid(format!("{}: bad owner id key {key:?}", path.display()))
            })?;
            names.insert(owner, label);
        }
        Ok(names)
    }

    pub fn insert(&mut self, owner: OwnerId, label: impl Into<String>) {
        let label = label.into();
        if let Some(previous) = self.names.insert(owner, label.clone()) {
            self.by_label.remove(&previous.to_ascii_lowercase());
        }
        self.by_label.insert(label.to_ascii_lowercase(), owner);
    }

    pub fn extend(&mut self, other: &OwnerNames) {
        for (owner, label) in &other.names {
            self.insert(*owner, label.clone());
        }
    }

    pub fn name(&self, owner: OwnerId) -> Option<&str> {
        self.names.get(&owner).map(String::as_str)
    }

    /// Name when known, hex id otherwise.
    pub fn label(&self, owner: OwnerId) -> String {
        match self.name(owner) {
            Some(name) => name.to_string(),
            None => owner.to_string(),
        }
    }

    /// `En_Rd (0x00EC)` style label.
    pub fn describe(&self, owner: OwnerId) -> String {
        match self.name(owner) {
            Some(name) => format!("{name} ({owner})"),
            None => owner.to_string(),
        }
    }

    /// Resolves a label or a numeric id (`0x00EC` or `236`).
    pub fn lookup(&self, label: &str) -> Option<OwnerId> {
        let trimmed = label.trim();
        self.by_label
            .get(&trimmed.to_ascii_lowercase())
            .copied()
            .or_else(|| parse_owner_id(trimmed))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

pub fn parse_owner_id(text: &str) -> Option<OwnerId> {
    let text = text.trim();
    let value = match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(hex) => u16::from_str_radix(hex, 16).ok()?,
        None => text.parse::<u16>().ok()?,
    };
    Some(OwnerId(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn labels_fall_back_to_hex() {
        let mut names = OwnerNames::new();
        names.insert(OwnerId(0xEC), "En_Rd");
        assert_eq!(names.label(OwnerId(0xEC)), "En_Rd");
        assert_eq!(names.describe(OwnerId(0xEC)), "En_Rd (0x00EC)");
        assert_eq!(names.label(OwnerId(0x12)), "0x0012");
    }

    #[test]
    fn lookup_accepts_names_and_numbers() {
        let mut names = OwnerNames::new();
        names.insert(OwnerId(0xEC), "En_Rd");
        assert_eq!(names.lookup("en_rd"), Some(OwnerId(0xEC)));
        assert_eq!(names.lookup("0x0010"), Some(OwnerId(0x10)));
        assert_eq!(names.lookup("17"), Some(OwnerId(17)));
        assert_eq!(names.lookup("En_Unknown"), None);
    }

    #[test]
    fn renaming_drops_the_old_label() {
        let mut names = OwnerNames::new();
        names.insert(OwnerId(1), "Old");
        names.insert(OwnerId(1), "New");
        assert_eq!(names.lookup("old"), None);
        assert_eq!(names.lookup("new"), Some(OwnerId(1)));
    }

    #[test]
    fn loads_json_table() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("names.json");
        fs::write(&path, r#"{ "0x00EC": "En_Rd", "16": "En_Test" }"#).expect("write names");

        let names = OwnerNames::from_json_file(Some(&path)).expect("names");
        assert_eq!(names.len(), 2);
        assert_eq!(names.name(OwnerId(16)), Some("En_Test"));
    }

    #[test]
    fn bad_key_is_reported() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("names.json");
        fs::write(&path, r#"{ "player": "Player" }"#).expect("write names");
        assert!(OwnerNames::from_json_file(Some(&path)).is_err());
    }
}
