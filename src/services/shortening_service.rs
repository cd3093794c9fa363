//! URL shortening service
//!
//! Ties the key codec, the store and the deletion pipeline together.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codec::derive_key;
use crate::config::DeletionConfig;
use crate::deletion::{DeletionPipeline, PipelineStats, SubmitReport};
use crate::errors::{Result, ShortenerError};
use crate::storage::{PutOutcome, ResolvedUrl, Store, StoreCapabilities};
use crate::utils::validate_url;

/// Result of shortening one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShortenResult {
    pub short_key: String,
    /// The URL had been shortened before; `short_key` is the existing key.
    pub conflict: bool,
}

/// One entry of a batch shorten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchShortenItem {
    pub original_url: String,
    pub short_key: String,
    pub conflict: bool,
}

/// A URL owned by a visitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnedUrl {
    pub short_key: String,
    pub original_url: String,
}

pub struct ShorteningService {
    store: Arc<dyn Store>,
    deletion: DeletionPipeline,
}

impl ShorteningService {
    pub fn new(store: Arc<dyn Store>, deletion: DeletionPipeline) -> Self {
        Self { store, deletion }
    }

    /// Starts a deletion pipeline on `store` and wraps both.
    /// Must be called inside a tokio runtime.
    pub fn start(store: Arc<dyn Store>, deletion: &DeletionConfig) -> Self {
        let pipeline = DeletionPipeline::start(Arc::clone(&store), deletion);
        Self::new(store, pipeline)
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn capabilities(&self) -> StoreCapabilities {
        self.store.capabilities()
    }

    /// Shortens `original_url` for `owner_id`.
    ///
    /// The same URL always yields the same key. A URL shortened before
    /// (by anyone) is reported with `conflict: true` and keeps its first
    /// owner.
    pub async fn shorten(&self, original_url: &str, owner_id: i64) -> Result<ShortenResult> {
        let original_url = validate_url(original_url)?;
        let key = derive_key(original_url);

        let outcome = self.store.put(&key, original_url, owner_id).await?;
        let conflict = outcome.is_conflict();
        match &outcome {
            PutOutcome::Created(k) => {
                info!("Shortened {} -> {} (owner {})", original_url, k, owner_id)
            }
            PutOutcome::Conflict(k) => debug!("{} already shortened as {}", original_url, k),
        }

        Ok(ShortenResult {
            short_key: outcome.short_key().to_string(),
            conflict,
        })
    }

    /// Shortens each URL in turn. Stops at the first error.
    pub async fn shorten_batch(
        &self,
        original_urls: &[String],
        owner_id: i64,
    ) -> Result<Vec<BatchShortenItem>> {
        let mut items = Vec::with_capacity(original_urls.len());
        for original_url in original_urls {
            let result = self.shorten(original_url, owner_id).await?;
            items.push(BatchShortenItem {
                original_url: original_url.trim().to_string(),
                short_key: result.short_key,
                conflict: result.conflict,
            });
        }
        Ok(items)
    }

    /// Looks up `short_key`. Retired records are returned with
    /// `retired: true`, not as an error.
    pub async fn resolve(&self, short_key: &str) -> Result<ResolvedUrl> {
        self.store
            .resolve_short(short_key)
            .await?
            .ok_or_else(|| {
                ShortenerError::not_found(format!("Short key not found: {}", short_key))
            })
    }

    /// Where a redirect for `short_key` should go.
    pub async fn redirect_target(&self, short_key: &str) -> Result<String> {
        let resolved = self.resolve(short_key).await?;
        if resolved.retired {
            return Err(ShortenerError::retired(format!(
                "Short key has been deleted: {}",
                short_key
            )));
        }
        Ok(resolved.original_url)
    }

    /// Every URL `owner_id` shortened, retired ones included.
    pub async fn urls_of(&self, owner_id: i64) -> Result<Vec<OwnedUrl>> {
        let records = self.store.list_by_owner(owner_id).await?;
        Ok(records
            .into_iter()
            .map(|r| OwnedUrl {
                short_key: r.short_key,
                original_url: r.original_url,
            })
            .collect())
    }

    /// Hands the keys to the deletion pipeline and returns without waiting
    /// for them to be applied.
    pub async fn retire(&self, short_keys: &[String], owner_id: i64) -> SubmitReport {
        let report = self.deletion.submit(short_keys, owner_id).await;
        if report.dropped > 0 {
            warn!(
                "{} retirement batch(es) for owner {} were dropped",
                report.dropped, owner_id
            );
        }
        report
    }

    pub fn deletion_stats(&self) -> PipelineStats {
        self.deletion.stats()
    }

    /// Waits for queued retirements to finish, up to `timeout`.
    pub async fn wait_for_retirements(&self, timeout: Duration) -> bool {
        self.deletion.wait_idle(timeout).await
    }

    pub async fn health_check(&self) -> Result<()> {
        self.store.health_check().await
    }

    /// Drains the deletion pipeline, then shuts the store down.
    pub async fn shutdown(&self) -> Result<()> {
        self.deletion.shutdown().await;
        self.store.shutdown().await
    }
}

/// Joins a public base URL and a short key.
pub fn short_url(base_url: &str, short_key: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), short_key)
}
