//! In-memory [`ContentStore`]
//!
//! Used by tests and by the gateway when no database URL is configured.
//! Row visibility mirrors the Postgres policies: a row exists for a caller
//! only if its chain ends at a project that caller owns, so foreign rows
//! surface as the same not-found errors Postgres would produce.

use crate::db::models::*;
use crate::db::store::*;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use sea_orm::prelude::DateTimeWithTimeZone;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    projects: HashMap<Uuid, Project>,
    outlines: HashMap<Uuid, Outline>,
    sections: HashMap<Uuid, Section>,
    prompts: HashMap<Uuid, Prompt>,
    content: HashMap<Uuid, ContentItem>,
    validations: HashMap<Uuid, Validation>,
}

impl Tables {
    fn project(&self, user_id: Uuid, id: Uuid) -> Result<&Project> {
        self.projects
            .get(&id)
            .filter(|p| p.user_id == user_id)
            .ok_or_else(|| AppError::ProjectNotFound { id: id.to_string() })
    }

    fn outline(&self, user_id: Uuid, id: Uuid) -> Result<&Outline> {
        self.outlines
            .get(&id)
            .filter(|o| self.project(user_id, o.project_id).is_ok())
            .ok_or_else(|| AppError::OutlineNotFound { id: id.to_string() })
    }

    fn section(&self, user_id: Uuid, id: Uuid) -> Result<&Section> {
        self.sections
            .get(&id)
            .filter(|s| self.outline(user_id, s.outline_id).is_ok())
            .ok_or_else(|| AppError::SectionNotFound { id: id.to_string() })
    }

    fn prompt(&self, user_id: Uuid, id: Uuid) -> Result<&Prompt> {
        self.prompts
            .get(&id)
            .filter(|p| self.section(user_id, p.section_id).is_ok())
            .ok_or_else(|| AppError::PromptNotFound { id: id.to_string() })
    }

    fn content(&self, user_id: Uuid, id: Uuid) -> Result<&ContentItem> {
        self.content
            .get(&id)
            .filter(|c| self.prompt(user_id, c.prompt_id).is_ok())
            .ok_or_else(|| AppError::ContentNotFound { id: id.to_string() })
    }

    fn section_context(&self, user_id: Uuid, section_id: Uuid) -> Result<SectionContext> {
        let section = self.section(user_id, section_id)?.clone();
        let outline = self.outline(user_id, section.outline_id)?.clone();
        let project = self.project(user_id, outline.project_id)?.clone();
        Ok(SectionContext { section, outline, project })
    }

    fn generation_context(&self, user_id: Uuid, prompt_id: Uuid) -> Result<GenerationContext> {
        let prompt = self.prompt(user_id, prompt_id)?.clone();
        let SectionContext { section, outline, project } =
            self.section_context(user_id, prompt.section_id)?;
        Ok(GenerationContext { prompt, section, outline, project })
    }

    fn project_sections(&self, project_id: Uuid) -> Vec<&Section> {
        let outline_ids: Vec<Uuid> = self
            .outlines
            .values()
            .filter(|o| o.project_id == project_id)
            .map(|o| o.id)
            .collect();

        self.sections
            .values()
            .filter(|s| outline_ids.contains(&s.outline_id))
            .collect()
    }

    fn section_prompt(&self, section_id: Uuid) -> Option<&Prompt> {
        self.prompts.values().find(|p| p.section_id == section_id)
    }

    fn prompt_content(&self, prompt_id: Uuid) -> Option<&ContentItem> {
        self.content.values().find(|c| c.prompt_id == prompt_id)
    }

    fn content_validation(&self, content_id: Uuid) -> Option<&Validation> {
        self.validations.values().find(|v| v.content_item_id == content_id)
    }

    fn stage_approved(&self, section_id: Uuid, stage: PipelineStage) -> bool {
        let prompt = self.section_prompt(section_id);
        let content = prompt.and_then(|p| self.prompt_content(p.id));
        match stage {
            PipelineStage::Prompts => prompt.is_some_and(|p| p.is_approved),
            PipelineStage::Content => content.is_some_and(|c| c.is_approved),
            PipelineStage::Validation => content
                .and_then(|c| self.content_validation(c.id))
                .is_some_and(|v| v.is_approved),
            _ => true,
        }
    }
}

/// Store backed by hash maps behind an async lock
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_project(&self, project: Project) {
        self.tables.write().await.projects.insert(project.id, project);
    }

    pub async fn insert_outline(&self, outline: Outline) {
        self.tables.write().await.outlines.insert(outline.id, outline);
    }

    pub async fn insert_section(&self, section: Section) {
        self.tables.write().await.sections.insert(section.id, section);
    }

    pub async fn insert_prompt(&self, prompt: Prompt) {
        self.tables.write().await.prompts.insert(prompt.id, prompt);
    }

    /// Content item stored for a prompt, bypassing ownership checks
    pub async fn content_for_prompt(&self, prompt_id: Uuid) -> Option<ContentItem> {
        self.tables.read().await.prompt_content(prompt_id).cloned()
    }

    /// Validation stored for a content item, bypassing ownership checks
    pub async fn validation_for_content(&self, content_id: Uuid) -> Option<Validation> {
        self.tables.read().await.content_validation(content_id).cloned()
    }

    pub async fn content_count(&self) -> usize {
        self.tables.read().await.content.len()
    }
}

fn now() -> DateTimeWithTimeZone {
    chrono::Utc::now().into()
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn find_project(&self, user_id: Uuid, project_id: Uuid) -> Result<Project> {
        self.tables.read().await.project(user_id, project_id).cloned()
    }

    async fn load_generation_context(&self, user_id: Uuid, prompt_id: Uuid) -> Result<GenerationContext> {
        self.tables.read().await.generation_context(user_id, prompt_id)
    }

    async fn load_section_context(&self, user_id: Uuid, section_id: Uuid) -> Result<SectionContext> {
        self.tables.read().await.section_context(user_id, section_id)
    }

    async fn load_content_context(&self, user_id: Uuid, content_id: Uuid) -> Result<ContentContext> {
        let tables = self.tables.read().await;
        let content = tables.content(user_id, content_id)?.clone();
        let generation = tables.generation_context(user_id, content.prompt_id)?;
        Ok(ContentContext { content, generation })
    }

    async fn upsert_prompt(&self, user_id: Uuid, section_id: Uuid, draft: PromptDraft) -> Result<Prompt> {
        let mut tables = self.tables.write().await;
        tables.section(user_id, section_id)?;

        let now = now();
        let prompt = match tables.section_prompt(section_id).cloned() {
            Some(existing) => Prompt {
                content: draft.content,
                parameters: draft.parameters,
                is_generated: true,
                is_approved: false,
                updated_at: now,
                ..existing
            },
            None => Prompt {
                id: Uuid::new_v4(),
                section_id,
                content: draft.content,
                parameters: draft.parameters,
                is_generated: true,
                is_approved: false,
                created_at: now,
                updated_at: now,
            },
        };

        tables.prompts.insert(prompt.id, prompt.clone());
        Ok(prompt)
    }

    async fn update_prompt_text(&self, user_id: Uuid, prompt_id: Uuid, content: String) -> Result<Prompt> {
        let mut tables = self.tables.write().await;
        let mut prompt = tables.prompt(user_id, prompt_id)?.clone();

        prompt.content = content;
        prompt.is_approved = false;
        prompt.updated_at = now();

        tables.prompts.insert(prompt.id, prompt.clone());
        Ok(prompt)
    }

    async fn set_prompt_approval(&self, user_id: Uuid, prompt_id: Uuid, approved: bool) -> Result<Prompt> {
        let mut tables = self.tables.write().await;
        let mut prompt = tables.prompt(user_id, prompt_id)?.clone();

        prompt.is_approved = approved;
        prompt.updated_at = now();

        tables.prompts.insert(prompt.id, prompt.clone());
        Ok(prompt)
    }

    async fn ensure_content(&self, user_id: Uuid, prompt_id: Uuid, metadata: serde_json::Value) -> Result<ContentItem> {
        let mut tables = self.tables.write().await;
        tables.prompt(user_id, prompt_id)?;

        if let Some(existing) = tables.prompt_content(prompt_id) {
            return Ok(existing.clone());
        }

        let now = now();
        let item = ContentItem {
            id: Uuid::new_v4(),
            prompt_id,
            content: String::new(),
            is_approved: false,
            metadata,
            created_at: now,
            updated_at: now,
        };

        tables.content.insert(item.id, item.clone());
        Ok(item)
    }

    async fn upsert_content(&self, user_id: Uuid, prompt_id: Uuid, draft: ContentDraft) -> Result<ContentItem> {
        let mut tables = self.tables.write().await;
        tables.prompt(user_id, prompt_id)?;

        let now = now();
        let item = match tables.prompt_content(prompt_id).cloned() {
            Some(existing) => ContentItem {
                content: draft.text,
                metadata: draft.metadata,
                is_approved: draft.approval.unwrap_or(existing.is_approved),
                updated_at: now,
                ..existing
            },
            None => ContentItem {
                id: Uuid::new_v4(),
                prompt_id,
                content: draft.text,
                is_approved: draft.approval.unwrap_or(false),
                metadata: draft.metadata,
                created_at: now,
                updated_at: now,
            },
        };

        tables.content.insert(item.id, item.clone());
        Ok(item)
    }

    async fn set_content_approval(&self, user_id: Uuid, content_id: Uuid, approved: bool) -> Result<ContentItem> {
        let mut tables = self.tables.write().await;
        let mut item = tables.content(user_id, content_id)?.clone();

        item.is_approved = approved;
        item.updated_at = now();

        tables.content.insert(item.id, item.clone());
        Ok(item)
    }

    async fn upsert_validation(&self, user_id: Uuid, content_id: Uuid, draft: ValidationDraft) -> Result<Validation> {
        let mut tables = self.tables.write().await;
        tables.content(user_id, content_id)?;

        let now = now();
        let (id, created_at) = tables
            .content_validation(content_id)
            .map(|v| (v.id, v.created_at))
            .unwrap_or_else(|| (Uuid::new_v4(), now));

        let validation = Validation {
            id,
            content_item_id: content_id,
            quality_score: draft.quality_score,
            standards_alignment_score: draft.standards_alignment_score,
            suggestions: draft.suggestions,
            details: draft.details,
            is_approved: draft.is_approved,
            created_at,
            updated_at: now,
        };

        tables.validations.insert(validation.id, validation.clone());
        Ok(validation)
    }

    async fn set_validation_approval(&self, user_id: Uuid, validation_id: Uuid, approved: bool) -> Result<Validation> {
        let mut tables = self.tables.write().await;
        let not_found = || AppError::NotFound {
            resource_type: "validation".to_string(),
            id: validation_id.to_string(),
        };

        let mut validation = tables.validations.get(&validation_id).cloned().ok_or_else(not_found)?;
        tables
            .content(user_id, validation.content_item_id)
            .map_err(|_| not_found())?;

        validation.is_approved = approved;
        validation.updated_at = now();

        tables.validations.insert(validation.id, validation.clone());
        Ok(validation)
    }

    async fn stage_items(&self, user_id: Uuid, project_id: Uuid, stage: PipelineStage) -> Result<StageItems> {
        let tables = self.tables.read().await;
        tables.project(user_id, project_id)?;

        let sections = tables.project_sections(project_id);
        let approved = sections
            .iter()
            .filter(|s| tables.stage_approved(s.id, stage))
            .count();

        Ok(StageItems {
            sections: sections.len(),
            approved,
        })
    }

    async fn update_project_stage(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        stage: PipelineStage,
        completion_percentage: i32,
    ) -> Result<Project> {
        let mut tables = self.tables.write().await;
        let mut project = tables.project(user_id, project_id)?.clone();

        project.current_stage = stage.as_str().to_string();
        project.completion_percentage = project.completion_percentage.max(completion_percentage);
        project.updated_at = now();

        tables.projects.insert(project.id, project.clone());
        Ok(project)
    }
}
