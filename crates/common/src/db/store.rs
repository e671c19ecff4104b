//! Storage abstraction used by the generation pipeline
//!
//! Every operation receives the caller's user id and nothing else: ownership
//! is enforced by the store (Postgres row-level security, or its in-memory
//! emulation), never by the pipeline code.

use crate::db::models::*;
use crate::errors::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// The prompt chain a generation run needs, joined from the prompt upward
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub prompt: Prompt,
    pub section: Section,
    pub outline: Outline,
    pub project: Project,
}

/// A section together with its outline and project
#[derive(Debug, Clone)]
pub struct SectionContext {
    pub section: Section,
    pub outline: Outline,
    pub project: Project,
}

/// A content item together with the chain that produced it
#[derive(Debug, Clone)]
pub struct ContentContext {
    pub content: ContentItem,
    pub generation: GenerationContext,
}

/// Values written by a prompt upsert
#[derive(Debug, Clone)]
pub struct PromptDraft {
    pub content: String,
    pub parameters: serde_json::Value,
}

/// Values written by a content upsert
#[derive(Debug, Clone)]
pub struct ContentDraft {
    pub text: String,
    pub metadata: serde_json::Value,
    /// `None` keeps the existing approval flag (new rows start unapproved)
    pub approval: Option<bool>,
}

/// Values written by a validation upsert
#[derive(Debug, Clone)]
pub struct ValidationDraft {
    pub quality_score: f64,
    pub standards_alignment_score: f64,
    pub suggestions: Option<String>,
    pub details: serde_json::Value,
    pub is_approved: bool,
}

/// Approval tally for one stage of a project
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageItems {
    /// Sections in the project
    pub sections: usize,
    /// Sections whose stage entity exists and is approved
    pub approved: usize,
}

impl StageItems {
    pub fn pending(&self) -> usize {
        self.sections.saturating_sub(self.approved)
    }
}

/// Persistence operations of the pipeline
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Check connectivity
    async fn ping(&self) -> Result<()>;

    async fn find_project(&self, user_id: Uuid, project_id: Uuid) -> Result<Project>;

    /// Load Prompt -> Section -> Outline -> Project, failing on the first missing row
    async fn load_generation_context(&self, user_id: Uuid, prompt_id: Uuid) -> Result<GenerationContext>;

    async fn load_section_context(&self, user_id: Uuid, section_id: Uuid) -> Result<SectionContext>;

    async fn load_content_context(&self, user_id: Uuid, content_id: Uuid) -> Result<ContentContext>;

    /// Insert or replace the prompt of a section; approval starts false
    async fn upsert_prompt(&self, user_id: Uuid, section_id: Uuid, draft: PromptDraft) -> Result<Prompt>;

    /// Replace the prompt text, resetting its approval
    async fn update_prompt_text(&self, user_id: Uuid, prompt_id: Uuid, content: String) -> Result<Prompt>;

    async fn set_prompt_approval(&self, user_id: Uuid, prompt_id: Uuid, approved: bool) -> Result<Prompt>;

    /// Return the content item of a prompt, inserting an empty one if absent
    async fn ensure_content(&self, user_id: Uuid, prompt_id: Uuid, metadata: serde_json::Value) -> Result<ContentItem>;

    /// Update the content item of a prompt if one exists, otherwise insert it
    async fn upsert_content(&self, user_id: Uuid, prompt_id: Uuid, draft: ContentDraft) -> Result<ContentItem>;

    async fn set_content_approval(&self, user_id: Uuid, content_id: Uuid, approved: bool) -> Result<ContentItem>;

    /// Update the validation of a content item if one exists, otherwise insert it
    async fn upsert_validation(&self, user_id: Uuid, content_id: Uuid, draft: ValidationDraft) -> Result<Validation>;

    async fn set_validation_approval(&self, user_id: Uuid, validation_id: Uuid, approved: bool) -> Result<Validation>;

    /// Count approved stage entities across the project's sections
    async fn stage_items(&self, user_id: Uuid, project_id: Uuid, stage: PipelineStage) -> Result<StageItems>;

    async fn update_project_stage(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        stage: PipelineStage,
        completion_percentage: i32,
    ) -> Result<Project>;
}
