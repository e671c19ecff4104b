//! Project entity and its educational configuration ("educational DNA")

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::lenient;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "projects")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning user; every other row chains back to this
    pub user_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    /// One of [`PipelineStage`], stored as its snake_case name
    #[sea_orm(column_type = "Text")]
    pub current_stage: String,

    /// 0-100, non-decreasing by convention
    pub completion_percentage: i32,

    /// Educational DNA as JSONB
    #[sea_orm(column_type = "JsonBinary")]
    pub config: serde_json::Value,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Parse the configuration blob, degrading to an empty config
    pub fn educational_dna(&self) -> ProjectConfig {
        serde_json::from_value(self.config.clone()).unwrap_or_else(|e| {
            tracing::warn!(project_id = %self.id, error = %e, "Unreadable project config, using defaults");
            ProjectConfig::default()
        })
    }

    pub fn stage(&self) -> PipelineStage {
        self.current_stage.parse().unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::outline::Entity")]
    Outline,
}

impl Related<super::outline::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Outline.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Ordered pipeline stages a project moves through
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    #[default]
    Configuration,
    Outline,
    Sections,
    Prompts,
    Content,
    Validation,
    Complete,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 7] = [
        PipelineStage::Configuration,
        PipelineStage::Outline,
        PipelineStage::Sections,
        PipelineStage::Prompts,
        PipelineStage::Content,
        PipelineStage::Validation,
        PipelineStage::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Configuration => "configuration",
            PipelineStage::Outline => "outline",
            PipelineStage::Sections => "sections",
            PipelineStage::Prompts => "prompts",
            PipelineStage::Content => "content",
            PipelineStage::Validation => "validation",
            PipelineStage::Complete => "complete",
        }
    }

    /// Position in the pipeline
    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).unwrap_or(0)
    }

    pub fn next(&self) -> Option<PipelineStage> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// Completion percentage implied by reaching this stage
    pub fn completion_percentage(&self) -> i32 {
        let last = Self::ALL.len() - 1;
        ((self.index() * 100) / last) as i32
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|stage| stage.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown pipeline stage: {}", s))
    }
}

/// Educational configuration captured by the setup wizard.
///
/// Every field is optional; the synthesizer substitutes a placeholder for
/// anything missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// assessment, activity, lesson, module, ...
    #[serde(deserialize_with = "lenient::optional_string")]
    pub project_type: Option<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    pub grade_levels: Vec<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    pub subject_areas: Vec<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    pub standards: Vec<String>,
    #[serde(deserialize_with = "lenient::list_of")]
    pub learning_objectives: Vec<LearningObjective>,
    #[serde(deserialize_with = "lenient::optional_string")]
    pub pedagogical_approach: Option<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    pub accessibility_needs: Vec<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    pub content_sections: Vec<String>,
}

/// A learning objective, optionally tagged with its Bloom's taxonomy level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ObjectiveRepr")]
pub struct LearningObjective {
    pub description: String,
    pub bloom_level: Option<String>,
}

impl LearningObjective {
    pub fn new(description: impl Into<String>, bloom_level: Option<&str>) -> Self {
        Self {
            description: description.into(),
            bloom_level: bloom_level.map(str::to_string),
        }
    }
}

/// Objectives arrive either as bare strings or as tagged objects
#[derive(Deserialize)]
#[serde(untagged)]
enum ObjectiveRepr {
    Text(String),
    Tagged {
        description: String,
        #[serde(default)]
        bloom_level: Option<String>,
    },
}

impl From<ObjectiveRepr> for LearningObjective {
    fn from(repr: ObjectiveRepr) -> Self {
        match repr {
            ObjectiveRepr::Text(description) => Self { description, bloom_level: None },
            ObjectiveRepr::Tagged { description, bloom_level } => Self { description, bloom_level },
        }
    }
}
