use crate::storage::UrlRecord;
use migration::entities::url;

/// 将 Sea-ORM Model 转换为 UrlRecord
pub fn model_to_record(model: url::Model) -> UrlRecord {
    UrlRecord {
        short_key: model.short_url,
        original_url: model.original_url,
        owner_id: model.user_id,
        retired: model.deleted_flag,
    }
}

/// 新行的 ActiveModel（retired 恒为 false）
pub fn new_active_model(short_key: &str, original_url: &str, owner_id: i64) -> url::ActiveModel {
    use sea_orm::ActiveValue::*;

    url::ActiveModel {
        id: NotSet,
        original_url: Set(original_url.to_string()),
        short_url: Set(short_key.to_string()),
        user_id: Set(owner_id),
        deleted_flag: Set(false),
    }
}
