//! SeaORM storage backend
//!
//! Relational store over SQLite, MySQL/MariaDB or PostgreSQL. Every
//! operation goes through [`retry::with_retry`] and is bounded by the
//! configured per-attempt deadline.

mod connection;
mod converters;
mod mutations;
mod query;
pub mod retry;

use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use tracing::{info, warn};

use super::Store;
use super::models::{PutOutcome, ResolvedUrl, StoreCapabilities, UrlRecord};
use crate::config::StorageConfig;
use crate::errors::{Result, ShortenerError};

pub use connection::{connect_generic, connect_sqlite, infer_backend_from_url, run_migrations};
pub use converters::{model_to_record, new_active_model};

/// 规范化 backend 名称
fn normalize_backend_name(backend: &str) -> &'static str {
    match backend {
        "sqlite" => "sqlite",
        "mysql" | "mariadb" => "mysql",
        _ => "postgres",
    }
}

/// SeaORM-based storage backend
#[derive(Clone)]
pub struct RelationalStore {
    db: DatabaseConnection,
    backend_name: &'static str,
    /// 重试配置
    retry_config: retry::RetryConfig,
}

impl RelationalStore {
    /// Connects, runs migrations and returns a ready store.
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let database_url = config.database_url.trim();
        if database_url.is_empty() {
            return Err(ShortenerError::database_config("Database URL is not set"));
        }

        let backend_name = normalize_backend_name(&infer_backend_from_url(database_url)?);
        let db = if backend_name == "sqlite" {
            connect_sqlite(database_url).await?
        } else {
            connect_generic(config, backend_name).await?
        };

        run_migrations(&db).await?;

        let storage = Self {
            db,
            backend_name,
            retry_config: retry::RetryConfig::from(config),
        };
        info!("{} storage initialized", backend_name.to_uppercase());
        Ok(storage)
    }

    pub fn sql_backend(&self) -> &'static str {
        self.backend_name
    }
}

#[async_trait]
impl Store for RelationalStore {
    async fn put(&self, short_key: &str, original_url: &str, owner_id: i64) -> Result<PutOutcome> {
        self.insert_if_absent(short_key, original_url, owner_id).await
    }

    async fn resolve_short(&self, short_key: &str) -> Result<Option<ResolvedUrl>> {
        self.find_by_short(short_key).await
    }

    async fn resolve_long(&self, original_url: &str) -> Result<Option<String>> {
        self.find_by_original(original_url).await
    }

    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<UrlRecord>> {
        self.find_by_owner(owner_id).await
    }

    async fn retire_batch(&self, short_keys: &[String], owner_id: i64) -> Result<u64> {
        self.mark_retired(short_keys, owner_id).await
    }

    async fn health_check(&self) -> Result<()> {
        let deadline = std::time::Duration::from_millis(self.retry_config.timeout_ms);
        match tokio::time::timeout(deadline, self.db.ping()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ShortenerError::backend_unreachable(format!(
                "{} ping failed: {}",
                self.backend_name, e
            ))),
            Err(_) => Err(ShortenerError::timeout(format!(
                "{} ping exceeded {}ms",
                self.backend_name, self.retry_config.timeout_ms
            ))),
        }
    }

    async fn shutdown(&self) -> Result<()> {
        if let Err(e) = self.db.clone().close().await {
            warn!("Error while closing {} pool: {}", self.backend_name, e);
            return Err(e.into());
        }
        info!("{} connection pool closed", self.backend_name.to_uppercase());
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "database"
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            persistent: true,
            persists_retirement: true,
            persists_owner: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_backend_name() {
        assert_eq!(normalize_backend_name("mariadb"), "mysql");
        assert_eq!(normalize_backend_name("sqlite"), "sqlite");
        assert_eq!(normalize_backend_name("postgres"), "postgres");
    }

    #[tokio::test]
    async fn test_empty_url_rejected() {
        let err = RelationalStore::connect(&StorageConfig::database(""))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ShortenerError::DatabaseConfig(_)));
    }

    #[tokio::test]
    async fn test_in_memory_sqlite_round_trip() {
        let store = RelationalStore::connect(&StorageConfig::database("sqlite::memory:"))
            .await
            .unwrap();
        assert_eq!(store.sql_backend(), "sqlite");

        let outcome = store.put("abc", "https://a.example", 3).await.unwrap();
        assert_eq!(outcome, PutOutcome::Created("abc".to_string()));
        assert!(store.put("zzz", "https://a.example", 4).await.unwrap().is_conflict());

        assert_eq!(store.retire_batch(&["abc".to_string()], 4).await.unwrap(), 0);
        assert_eq!(store.retire_batch(&["abc".to_string()], 3).await.unwrap(), 1);
        assert!(store.resolve_short("abc").await.unwrap().unwrap().retired);

        store.health_check().await.unwrap();
        store.shutdown().await.unwrap();
    }
}
