//! Instance identifiers.
//!
//! An instance is one installed copy of a remote agent, named by the build
//! `ident` plus a per-install `instance` id. On disk and at the query surface
//! the pair is flattened to `ident_instance`, which is used verbatim as the
//! repository and transfer file name. Because idents may themselves contain
//! underscores the key is never split back into its parts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{TypesError, SIDECAR_SUFFIXES};

/// Filesystem-safe key naming one device instance.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstanceId(String);

impl InstanceId {
    /// Build the key for an `(ident, instance)` pair.
    pub fn new(ident: &str, instance: &str) -> Result<Self, TypesError> {
        validate_component(ident)?;
        validate_component(instance)?;
        Self::from_key(&format!("{ident}_{instance}"))
    }

    /// Validate an already flattened key, e.g. a repository file name.
    pub fn from_key(key: &str) -> Result<Self, TypesError> {
        validate_component(key)?;
        if SIDECAR_SUFFIXES.iter().any(|s| key.ends_with(s)) {
            return Err(TypesError::InvalidInstance(key.to_string()));
        }
        Ok(Self(key.to_string()))
    }

    /// The flattened `ident_instance` key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate_component(value: &str) -> Result<(), TypesError> {
    let valid = !value.is_empty()
        && !value.starts_with('.')
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'));
    if valid {
        Ok(())
    } else {
        Err(TypesError::InvalidInstance(value.to_string()))
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for InstanceId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key(s)
    }
}

impl TryFrom<String> for InstanceId {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_key(&value)
    }
}

impl From<InstanceId> for String {
    fn from(id: InstanceId) -> Self {
        id.0
    }
}

impl AsRef<str> for InstanceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_joins_with_underscore() {
        let id = InstanceId::new("RCS_0000000001", "a1b2c3d4").expect("valid");
        assert_eq!(id.as_str(), "RCS_0000000001_a1b2c3d4");
        assert_eq!(id.to_string(), "RCS_0000000001_a1b2c3d4");
    }

    #[test]
    fn test_rejects_path_traversal() {
        assert!(InstanceId::new("..", "x").is_err());
        assert!(InstanceId::new("ident", "a/b").is_err());
        assert!(InstanceId::from_key("../etc/passwd").is_err());
        assert!(InstanceId::from_key("").is_err());
    }

    #[test]
    fn test_rejects_quotes_and_spaces() {
        assert!(InstanceId::new("ident'; DROP TABLE info;--", "x").is_err());
        assert!(InstanceId::new("ident", "with space").is_err());
    }

    #[test]
    fn test_rejects_sidecar_names() {
        assert!(InstanceId::from_key("RCS_1_abc-journal").is_err());
        assert!(InstanceId::from_key("RCS_1_abc-wal").is_err());
        assert!(InstanceId::from_key("RCS_1_abc-shm").is_err());
        assert!(InstanceId::from_key("RCS_1_abc-journaled").is_ok());
    }

    #[test]
    fn test_serde_as_string() {
        let id = InstanceId::new("RCS_1", "abc").expect("valid");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"RCS_1_abc\"");
        let back: InstanceId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
        assert!(serde_json::from_str::<InstanceId>("\"../x\"").is_err());
    }
}
