//! Write operations for RelationalStore

use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use tracing::{debug, info};

use super::converters::new_active_model;
use super::{RelationalStore, retry};
use crate::errors::Result;
use crate::storage::PutOutcome;

use migration::entities::url;

impl RelationalStore {
    /// Read-then-insert. Two concurrent puts of the same new URL can both
    /// miss the read and insert one row each; the rows share the key and
    /// differ only in owner.
    pub(super) async fn insert_if_absent(
        &self,
        short_key: &str,
        original_url: &str,
        owner_id: i64,
    ) -> Result<PutOutcome> {
        let db = &self.db;

        let outcome = retry::with_retry(
            &format!("put({})", short_key),
            self.retry_config,
            || async {
                let existing = url::Entity::find()
                    .filter(url::Column::OriginalUrl.eq(original_url))
                    .one(db)
                    .await?;
                if let Some(model) = existing {
                    return Ok(PutOutcome::Conflict(model.short_url));
                }

                url::Entity::insert(new_active_model(short_key, original_url, owner_id))
                    .exec(db)
                    .await?;
                Ok::<_, sea_orm::DbErr>(PutOutcome::Created(short_key.to_string()))
            },
        )
        .await?;

        if let PutOutcome::Created(key) = &outcome {
            debug!("Stored {} -> {} for owner {}", key, original_url, owner_id);
        }
        Ok(outcome)
    }

    /// One bulk UPDATE scoped to `owner_id`; already retired rows are skipped.
    pub(super) async fn mark_retired(&self, short_keys: &[String], owner_id: i64) -> Result<u64> {
        if short_keys.is_empty() {
            return Ok(0);
        }

        let db = &self.db;
        let result = retry::with_retry(
            &format!("retire_batch({} keys)", short_keys.len()),
            self.retry_config,
            || async {
                url::Entity::update_many()
                    .col_expr(url::Column::DeletedFlag, Expr::value(true))
                    .filter(url::Column::ShortUrl.is_in(short_keys.iter().cloned()))
                    .filter(url::Column::UserId.eq(owner_id))
                    .filter(url::Column::DeletedFlag.eq(false))
                    .exec(db)
                    .await
            },
        )
        .await?;

        info!(
            "Retired {} rows ({} keys requested) for owner {}",
            result.rows_affected,
            short_keys.len(),
            owner_id
        );
        Ok(result.rows_affected)
    }
}
