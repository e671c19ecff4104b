//! SeaORM entity models
//!
//! Database entities for the LessonForge pipeline. Every row chains back to
//! exactly one project, which is owned by exactly one user.

mod lenient;
mod project;
mod outline;
mod section;
mod prompt;
mod content_item;
mod validation;

pub use project::{
    Entity as ProjectEntity,
    Model as Project,
    ActiveModel as ProjectActiveModel,
    Column as ProjectColumn,
    LearningObjective,
    PipelineStage,
    ProjectConfig,
};

pub use outline::{
    Entity as OutlineEntity,
    Model as Outline,
    ActiveModel as OutlineActiveModel,
    Column as OutlineColumn,
    OutlineStructure,
};

pub use section::{
    Entity as SectionEntity,
    Model as Section,
    ActiveModel as SectionActiveModel,
    Column as SectionColumn,
    SectionConfig,
};

pub use prompt::{
    Entity as PromptEntity,
    Model as Prompt,
    ActiveModel as PromptActiveModel,
    Column as PromptColumn,
};

pub use content_item::{
    Entity as ContentItemEntity,
    Model as ContentItem,
    ActiveModel as ContentItemActiveModel,
    Column as ContentItemColumn,
};

pub use validation::{
    Entity as ValidationEntity,
    Model as Validation,
    ActiveModel as ValidationActiveModel,
    Column as ValidationColumn,
};
