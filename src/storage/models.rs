use serde::{Deserialize, Serialize};

/// Owner id used for fixture and replayed records with no known visitor.
pub const SYSTEM_OWNER: i64 = 0;

/// Historical fixture record prepended to the in-memory and file backends.
pub const SEED_SHORT_KEY: &str = "d41d8cd98f";
pub const SEED_ORIGINAL_URL: &str = "https://practicum.yandex.ru/";

/// A stored mapping between a short key and its long URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    pub short_key: String,
    pub original_url: String,
    pub owner_id: i64,
    #[serde(default)]
    pub retired: bool,
}

/// Result of [`crate::storage::Store::put`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// The mapping did not exist and was stored under this key.
    Created(String),
    /// The long URL was already shortened; carries the existing key.
    Conflict(String),
}

impl PutOutcome {
    pub fn short_key(&self) -> &str {
        match self {
            PutOutcome::Created(key) | PutOutcome::Conflict(key) => key,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, PutOutcome::Conflict(_))
    }
}

/// Result of a short-key lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedUrl {
    pub original_url: String,
    pub retired: bool,
}

/// What a backend can and cannot keep across restarts.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreCapabilities {
    /// Mappings survive a process restart.
    pub persistent: bool,
    /// Retirement survives a process restart.
    pub persists_retirement: bool,
    /// Ownership survives a process restart.
    pub persists_owner: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_outcome_accessors() {
        let created = PutOutcome::Created("abc".to_string());
        let conflict = PutOutcome::Conflict("def".to_string());
        assert_eq!(created.short_key(), "abc");
        assert!(!created.is_conflict());
        assert_eq!(conflict.short_key(), "def");
        assert!(conflict.is_conflict());
    }
}
