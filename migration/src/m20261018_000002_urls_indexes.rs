use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::DatabaseBackend;

use crate::m20261018_000001_urls_table::Urls;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        match manager.get_database_backend() {
            DatabaseBackend::MySql => {
                // MySQL 不能直接索引 TEXT 列，只索引前缀
                // 不支持 IF NOT EXISTS，索引已存在时忽略错误
                manager
                    .get_connection()
                    .execute_unprepared(
                        "CREATE INDEX idx_urls_original_url ON urls (original_url(255))",
                    )
                    .await
                    .ok();
            }
            _ => {
                manager
                    .create_index(
                        Index::create()
                            .if_not_exists()
                            .name("idx_urls_original_url")
                            .table(Urls::Table)
                            .col(Urls::OriginalUrl)
                            .to_owned(),
                    )
                    .await?;
            }
        }

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_urls_short_url")
                    .table(Urls::Table)
                    .col(Urls::ShortUrl)
                    .to_owned(),
            )
            .await?;

        // list_by_owner / retire_batch 按 user_id 过滤
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_urls_user_id")
                    .table(Urls::Table)
                    .col(Urls::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for name in ["idx_urls_user_id", "idx_urls_short_url", "idx_urls_original_url"] {
            manager
                .drop_index(Index::drop().name(name).table(Urls::Table).to_owned())
                .await?;
        }
        Ok(())
    }
}
