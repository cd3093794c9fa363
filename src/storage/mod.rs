//! URL mapping storage.
//!
//! [`Store`] is the contract every backend fulfils; [`StoreSelector`]
//! builds the one the configuration asks for.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::{BackendKind, StorageConfig};
use crate::errors::{Result, ShortenerError};

pub mod backend;
pub mod file;
pub mod memory;
pub mod models;

pub use backend::RelationalStore;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use models::{
    PutOutcome, ResolvedUrl, SEED_ORIGINAL_URL, SEED_SHORT_KEY, SYSTEM_OWNER, StoreCapabilities,
    UrlRecord,
};

/// Persistence contract for short-key mappings.
///
/// Implementations are shared between request handlers and deletion
/// workers, so every method takes `&self`.
#[async_trait]
pub trait Store: Send + Sync {
    /// Stores `short_key -> original_url` for `owner_id` unless the long
    /// URL is already known, in which case the existing key is returned
    /// as [`PutOutcome::Conflict`] and nothing changes.
    async fn put(&self, short_key: &str, original_url: &str, owner_id: i64) -> Result<PutOutcome>;

    /// `None` when the key was never stored. Retired keys still resolve.
    async fn resolve_short(&self, short_key: &str) -> Result<Option<ResolvedUrl>>;

    async fn resolve_long(&self, original_url: &str) -> Result<Option<String>>;

    /// Every record owned by `owner_id`, retired ones included.
    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<UrlRecord>>;

    /// Retires the keys in `short_keys` owned by `owner_id`. Keys owned
    /// by someone else or unknown are ignored. Returns how many records
    /// changed state.
    async fn retire_batch(&self, short_keys: &[String], owner_id: i64) -> Result<u64>;

    async fn health_check(&self) -> Result<()>;

    /// Flushes and releases resources. Later writes fail.
    async fn shutdown(&self) -> Result<()>;

    fn backend_name(&self) -> &'static str;

    fn capabilities(&self) -> StoreCapabilities;
}

pub struct StoreSelector;

impl StoreSelector {
    /// Builds and health-checks the configured backend.
    ///
    /// Any failure here is fatal to startup.
    pub async fn create(config: &StorageConfig) -> Result<Arc<dyn Store>> {
        let kind = config.resolve_backend();
        let store: Arc<dyn Store> = match kind {
            BackendKind::Memory => Arc::new(MemoryStore::new(config.seed)),
            BackendKind::File => {
                if config.file_path.trim().is_empty() {
                    return Err(ShortenerError::config(
                        "File backend selected but storage.file_path is empty",
                    ));
                }
                Arc::new(FileStore::open(config.file_path.trim(), config.seed)?)
            }
            BackendKind::Database => Arc::new(RelationalStore::connect(config).await.map_err(
                |e| match e {
                    ShortenerError::DatabaseConfig(_) => e,
                    other => ShortenerError::backend_unreachable(other.message()),
                },
            )?),
        };

        if let Err(e) = store.health_check().await {
            warn!("{} backend failed its startup health check", kind);
            return Err(ShortenerError::backend_unreachable(e.message()));
        }

        let caps = store.capabilities();
        if !caps.persistent {
            warn!("Using in-memory storage; mappings are lost on restart");
        } else if !caps.persists_retirement {
            warn!(
                "{} backend does not persist retirement or ownership across restarts",
                store.backend_name()
            );
        }
        info!("Storage backend selected: {}", store.backend_name());
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_selects_memory_by_default() {
        let store = StoreSelector::create(&StorageConfig::default()).await.unwrap();
        assert_eq!(store.backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_selects_file_from_path() {
        let dir = TempDir::new().unwrap();
        let mut config = StorageConfig::default();
        config.file_path = dir.path().join("links.json").display().to_string();

        let store = StoreSelector::create(&config).await.unwrap();
        assert_eq!(store.backend_name(), "file");
        assert!(store.capabilities().persistent);
    }

    #[tokio::test]
    async fn test_file_backend_without_path_is_config_error() {
        let config = StorageConfig::file("  ");
        let err = StoreSelector::create(&config).await.err().unwrap();
        assert!(matches!(err, ShortenerError::Config(_)));
    }

    #[tokio::test]
    async fn test_unknown_dsn_is_rejected() {
        let config = StorageConfig::database("redis://localhost");
        let err = StoreSelector::create(&config).await.err().unwrap();
        assert!(matches!(err, ShortenerError::DatabaseConfig(_)));
    }
}
