use serde::{Deserialize, Serialize};
use std::fmt;

/// Deterministic configuration ID (BLAKE3 of the canonical JSON of a config).
///
/// Identical configurations always produce identical IDs, across runs and
/// platforms, so sweep outputs can be joined and cached by ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConfigId(pub String);

impl ConfigId {
    pub fn from_hash(hash: &str) -> Self {
        Self(hash.to_string())
    }

    /// Hash any serializable configuration.
    ///
    /// Struct fields serialize in declaration order, so the JSON is canonical
    /// for the config types in this crate (none of them contain hash maps).
    pub fn of<T: Serialize>(config: &T) -> Self {
        let json = serde_json::to_vec(config).expect("configuration must serialize");
        Self(blake3::hash(&json).to_hex().to_string())
    }

    /// First 12 hex characters, for log lines and file names.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
