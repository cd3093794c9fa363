//! Read operations for RelationalStore

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QuerySelect};
use tracing::debug;

use super::converters::model_to_record;
use super::{RelationalStore, retry};
use crate::errors::Result;
use crate::storage::{ResolvedUrl, UrlRecord};

use migration::entities::url;

impl RelationalStore {
    pub(super) async fn find_by_short(&self, short_key: &str) -> Result<Option<ResolvedUrl>> {
        let db = &self.db;

        let row = retry::with_retry(
            &format!("resolve_short({})", short_key),
            self.retry_config,
            || async {
                url::Entity::find()
                    .filter(url::Column::ShortUrl.eq(short_key))
                    .one(db)
                    .await
            },
        )
        .await?;

        Ok(row.map(|model| ResolvedUrl {
            original_url: model.original_url,
            retired: model.deleted_flag,
        }))
    }

    pub(super) async fn find_by_original(&self, original_url: &str) -> Result<Option<String>> {
        let db = &self.db;

        let short = retry::with_retry("resolve_long", self.retry_config, || async {
            url::Entity::find()
                .select_only()
                .column(url::Column::ShortUrl)
                .filter(url::Column::OriginalUrl.eq(original_url))
                .into_tuple::<String>()
                .one(db)
                .await
        })
        .await?;

        Ok(short)
    }

    pub(super) async fn find_by_owner(&self, owner_id: i64) -> Result<Vec<UrlRecord>> {
        let db = &self.db;

        let models = retry::with_retry(
            &format!("list_by_owner({})", owner_id),
            self.retry_config,
            || async {
                url::Entity::find()
                    .filter(url::Column::UserId.eq(owner_id))
                    .all(db)
                    .await
            },
        )
        .await?;

        debug!("Loaded {} urls for owner {}", models.len(), owner_id);
        Ok(models.into_iter().map(model_to_record).collect())
    }
}
