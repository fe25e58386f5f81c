use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "file_tags")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub file_id: String,
    pub label: String,
    pub confidence: f32,
    /// `remote-analysis`, `local-heuristic` or `manual`
    pub source: String,
    /// Rank within the tag set it was saved with
    pub position: i32,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::processed_files::Entity",
        from = "Column::FileId",
        to = "super::processed_files::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    ProcessedFiles,
}

impl Related<super::processed_files::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProcessedFiles.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
