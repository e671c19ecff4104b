//! Outline entity (one per project)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::lenient;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "outlines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub project_id: Uuid,

    /// Free-form structure as JSONB
    #[sea_orm(column_type = "JsonBinary")]
    pub structure: serde_json::Value,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn outline_structure(&self) -> OutlineStructure {
        serde_json::from_value(self.structure.clone()).unwrap_or_else(|e| {
            tracing::warn!(outline_id = %self.id, error = %e, "Unreadable outline structure, using defaults");
            OutlineStructure::default()
        })
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::ProjectId",
        to = "super::project::Column::Id",
        on_delete = "Cascade"
    )]
    Project,

    #[sea_orm(has_many = "super::section::Entity")]
    Sections,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl Related<super::section::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sections.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Parsed outline structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlineStructure {
    #[serde(deserialize_with = "lenient::optional_string")]
    pub summary: Option<String>,
    #[serde(deserialize_with = "lenient::optional_string")]
    pub audience: Option<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    pub learning_goals: Vec<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    pub key_topics: Vec<String>,
}
