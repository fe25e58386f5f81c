use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "processed_files")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub filename: String,
    #[sea_orm(unique)]
    pub storage_path: String,
    pub file_type: String,
    pub category: String,
    pub file_size: i64,
    pub checksum: String,
    pub project_ref: String,
    pub vision_enabled: bool,
    pub processed_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::file_tags::Entity")]
    FileTags,
}

impl Related<super::file_tags::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FileTags.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
