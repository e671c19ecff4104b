//! Section entity, ordered within an outline

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::lenient;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sections")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub outline_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    /// Explicit ordering within the outline
    pub sequence: i32,

    #[sea_orm(column_type = "JsonBinary")]
    pub config: serde_json::Value,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn section_config(&self) -> SectionConfig {
        serde_json::from_value(self.config.clone()).unwrap_or_else(|e| {
            tracing::warn!(section_id = %self.id, error = %e, "Unreadable section config, using defaults");
            SectionConfig::default()
        })
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::outline::Entity",
        from = "Column::OutlineId",
        to = "super::outline::Column::Id",
        on_delete = "Cascade"
    )]
    Outline,

    #[sea_orm(has_many = "super::prompt::Entity")]
    Prompts,
}

impl Related<super::outline::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Outline.def()
    }
}

impl Related<super::prompt::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Prompts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionConfig {
    #[serde(deserialize_with = "lenient::string_list")]
    pub objectives: Vec<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    pub activity_types: Vec<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    pub resources: Vec<String>,
    #[serde(deserialize_with = "lenient::optional_string")]
    pub notes: Option<String>,
}
