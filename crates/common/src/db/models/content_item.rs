//! Generated content for a prompt

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "content_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub prompt_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub content: String,

    pub is_approved: bool,

    /// model, style, temperature and optional quality indicators
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: serde_json::Value,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::prompt::Entity",
        from = "Column::PromptId",
        to = "super::prompt::Column::Id",
        on_delete = "Cascade"
    )]
    Prompt,

    #[sea_orm(has_one = "super::validation::Entity")]
    Validation,
}

impl Related<super::prompt::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Prompt.def()
    }
}

impl Related<super::validation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Validation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
