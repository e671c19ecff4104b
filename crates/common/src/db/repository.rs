//! Repository pattern for database operations
//!
//! Postgres-backed [`ContentStore`]. Each operation runs in its own
//! transaction with the caller's JWT claims and role applied, so the
//! row-level-security policies in `migrations/` decide which rows exist for
//! that caller.

use crate::db::models::*;
use crate::db::store::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    DbBackend, EntityTrait, QueryFilter, Set, Statement, TransactionTrait,
};
use uuid::Uuid;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
    rls_role: String,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            rls_role: "authenticated".to_string(),
        }
    }

    /// Override the Postgres role assumed for row-level security
    pub fn with_rls_role(mut self, role: impl Into<String>) -> Self {
        self.rls_role = role.into();
        self
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    /// Open a transaction that runs as `user_id` under row-level security
    async fn scoped(&self, conn: &DatabaseConnection, user_id: Uuid) -> Result<DatabaseTransaction> {
        let txn = conn.begin().await?;

        let claims = serde_json::json!({
            "sub": user_id,
            "role": self.rls_role,
        })
        .to_string();

        txn.execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT set_config('request.jwt.claims', $1, true), set_config('role', $2, true)",
            vec![claims.into(), self.rls_role.clone().into()],
        ))
        .await?;

        Ok(txn)
    }
}

async fn find_prompt<C: ConnectionTrait>(db: &C, prompt_id: Uuid) -> Result<Prompt> {
    PromptEntity::find_by_id(prompt_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::PromptNotFound { id: prompt_id.to_string() })
}

async fn find_section<C: ConnectionTrait>(db: &C, section_id: Uuid) -> Result<Section> {
    SectionEntity::find_by_id(section_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::SectionNotFound { id: section_id.to_string() })
}

async fn find_outline<C: ConnectionTrait>(db: &C, outline_id: Uuid) -> Result<Outline> {
    OutlineEntity::find_by_id(outline_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::OutlineNotFound { id: outline_id.to_string() })
}

async fn find_project<C: ConnectionTrait>(db: &C, project_id: Uuid) -> Result<Project> {
    ProjectEntity::find_by_id(project_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::ProjectNotFound { id: project_id.to_string() })
}

async fn find_content<C: ConnectionTrait>(db: &C, content_id: Uuid) -> Result<ContentItem> {
    ContentItemEntity::find_by_id(content_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::ContentNotFound { id: content_id.to_string() })
}

async fn section_chain<C: ConnectionTrait>(db: &C, section: Section) -> Result<SectionContext> {
    let outline = find_outline(db, section.outline_id).await?;
    let project = find_project(db, outline.project_id).await?;
    Ok(SectionContext { section, outline, project })
}

async fn prompt_chain<C: ConnectionTrait>(db: &C, prompt: Prompt) -> Result<GenerationContext> {
    let section = find_section(db, prompt.section_id).await?;
    let SectionContext { section, outline, project } = section_chain(db, section).await?;
    Ok(GenerationContext { prompt, section, outline, project })
}

#[async_trait]
impl ContentStore for Repository {
    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    async fn find_project(&self, user_id: Uuid, project_id: Uuid) -> Result<Project> {
        let txn = self.scoped(self.read_conn(), user_id).await?;
        let project = find_project(&txn, project_id).await?;
        txn.commit().await?;
        Ok(project)
    }

    async fn load_generation_context(&self, user_id: Uuid, prompt_id: Uuid) -> Result<GenerationContext> {
        let txn = self.scoped(self.read_conn(), user_id).await?;
        let prompt = find_prompt(&txn, prompt_id).await?;
        let context = prompt_chain(&txn, prompt).await?;
        txn.commit().await?;
        Ok(context)
    }

    async fn load_section_context(&self, user_id: Uuid, section_id: Uuid) -> Result<SectionContext> {
        let txn = self.scoped(self.read_conn(), user_id).await?;
        let section = find_section(&txn, section_id).await?;
        let context = section_chain(&txn, section).await?;
        txn.commit().await?;
        Ok(context)
    }

    async fn load_content_context(&self, user_id: Uuid, content_id: Uuid) -> Result<ContentContext> {
        let txn = self.scoped(self.read_conn(), user_id).await?;
        let content = find_content(&txn, content_id).await?;
        let prompt = find_prompt(&txn, content.prompt_id).await?;
        let generation = prompt_chain(&txn, prompt).await?;
        txn.commit().await?;
        Ok(ContentContext { content, generation })
    }

    async fn upsert_prompt(&self, user_id: Uuid, section_id: Uuid, draft: PromptDraft) -> Result<Prompt> {
        let txn = self.scoped(self.write_conn(), user_id).await?;
        find_section(&txn, section_id).await?;

        let now = chrono::Utc::now();
        let prompt = PromptActiveModel {
            id: Set(Uuid::new_v4()),
            section_id: Set(section_id),
            content: Set(draft.content),
            parameters: Set(draft.parameters),
            is_generated: Set(true),
            is_approved: Set(false),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        let saved = PromptEntity::insert(prompt)
            .on_conflict(
                OnConflict::column(PromptColumn::SectionId)
                    .update_columns([
                        PromptColumn::Content,
                        PromptColumn::Parameters,
                        PromptColumn::IsGenerated,
                        PromptColumn::IsApproved,
                        PromptColumn::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_with_returning(&txn)
            .await?;

        txn.commit().await?;
        Ok(saved)
    }

    async fn update_prompt_text(&self, user_id: Uuid, prompt_id: Uuid, content: String) -> Result<Prompt> {
        let txn = self.scoped(self.write_conn(), user_id).await?;
        let mut prompt: PromptActiveModel = find_prompt(&txn, prompt_id).await?.into();

        prompt.content = Set(content);
        prompt.is_approved = Set(false);
        prompt.updated_at = Set(chrono::Utc::now().into());

        let updated = prompt.update(&txn).await?;
        txn.commit().await?;
        Ok(updated)
    }

    async fn set_prompt_approval(&self, user_id: Uuid, prompt_id: Uuid, approved: bool) -> Result<Prompt> {
        let txn = self.scoped(self.write_conn(), user_id).await?;
        let mut prompt: PromptActiveModel = find_prompt(&txn, prompt_id).await?.into();

        prompt.is_approved = Set(approved);
        prompt.updated_at = Set(chrono::Utc::now().into());

        let updated = prompt.update(&txn).await?;
        txn.commit().await?;
        Ok(updated)
    }

    async fn ensure_content(&self, user_id: Uuid, prompt_id: Uuid, metadata: serde_json::Value) -> Result<ContentItem> {
        let txn = self.scoped(self.write_conn(), user_id).await?;
        find_prompt(&txn, prompt_id).await?;

        // A concurrent session may have anchored the row first
        let now = chrono::Utc::now();
        ContentItemEntity::insert(ContentItemActiveModel {
            id: Set(Uuid::new_v4()),
            prompt_id: Set(prompt_id),
            content: Set(String::new()),
            is_approved: Set(false),
            metadata: Set(metadata),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        })
        .on_conflict(OnConflict::column(ContentItemColumn::PromptId).do_nothing().to_owned())
        .exec_without_returning(&txn)
        .await?;

        let item = ContentItemEntity::find()
            .filter(ContentItemColumn::PromptId.eq(prompt_id))
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::ContentNotFound { id: prompt_id.to_string() })?;

        txn.commit().await?;
        Ok(item)
    }

    async fn upsert_content(&self, user_id: Uuid, prompt_id: Uuid, draft: ContentDraft) -> Result<ContentItem> {
        let txn = self.scoped(self.write_conn(), user_id).await?;
        find_prompt(&txn, prompt_id).await?;

        let now = chrono::Utc::now();
        let item = ContentItemActiveModel {
            id: Set(Uuid::new_v4()),
            prompt_id: Set(prompt_id),
            content: Set(draft.text),
            is_approved: Set(draft.approval.unwrap_or(false)),
            metadata: Set(draft.metadata),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        let mut update_columns = vec![
            ContentItemColumn::Content,
            ContentItemColumn::Metadata,
            ContentItemColumn::UpdatedAt,
        ];
        if draft.approval.is_some() {
            update_columns.push(ContentItemColumn::IsApproved);
        }

        let saved = ContentItemEntity::insert(item)
            .on_conflict(
                OnConflict::column(ContentItemColumn::PromptId)
                    .update_columns(update_columns)
                    .to_owned(),
            )
            .exec_with_returning(&txn)
            .await?;

        txn.commit().await?;
        Ok(saved)
    }

    async fn set_content_approval(&self, user_id: Uuid, content_id: Uuid, approved: bool) -> Result<ContentItem> {
        let txn = self.scoped(self.write_conn(), user_id).await?;
        let mut item: ContentItemActiveModel = find_content(&txn, content_id).await?.into();

        item.is_approved = Set(approved);
        item.updated_at = Set(chrono::Utc::now().into());

        let updated = item.update(&txn).await?;
        txn.commit().await?;
        Ok(updated)
    }

    async fn upsert_validation(&self, user_id: Uuid, content_id: Uuid, draft: ValidationDraft) -> Result<Validation> {
        let txn = self.scoped(self.write_conn(), user_id).await?;
        find_content(&txn, content_id).await?;

        let now = chrono::Utc::now();
        let validation = ValidationActiveModel {
            id: Set(Uuid::new_v4()),
            content_item_id: Set(content_id),
            quality_score: Set(draft.quality_score),
            standards_alignment_score: Set(draft.standards_alignment_score),
            suggestions: Set(draft.suggestions),
            details: Set(draft.details),
            is_approved: Set(draft.is_approved),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        let saved = ValidationEntity::insert(validation)
            .on_conflict(
                OnConflict::column(ValidationColumn::ContentItemId)
                    .update_columns([
                        ValidationColumn::QualityScore,
                        ValidationColumn::StandardsAlignmentScore,
                        ValidationColumn::Suggestions,
                        ValidationColumn::Details,
                        ValidationColumn::IsApproved,
                        ValidationColumn::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_with_returning(&txn)
            .await?;

        txn.commit().await?;
        Ok(saved)
    }

    async fn set_validation_approval(&self, user_id: Uuid, validation_id: Uuid, approved: bool) -> Result<Validation> {
        let txn = self.scoped(self.write_conn(), user_id).await?;
        let mut validation: ValidationActiveModel = ValidationEntity::find_by_id(validation_id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource_type: "validation".to_string(),
                id: validation_id.to_string(),
            })?
            .into();

        validation.is_approved = Set(approved);
        validation.updated_at = Set(chrono::Utc::now().into());

        let updated = validation.update(&txn).await?;
        txn.commit().await?;
        Ok(updated)
    }

    async fn stage_items(&self, user_id: Uuid, project_id: Uuid, stage: PipelineStage) -> Result<StageItems> {
        let approved_expr = match stage {
            PipelineStage::Prompts => {
                "EXISTS (SELECT 1 FROM prompts p WHERE p.section_id = s.id AND p.is_approved)"
            }
            PipelineStage::Content => {
                r#"EXISTS (
                    SELECT 1 FROM prompts p
                    JOIN content_items c ON c.prompt_id = p.id
                    WHERE p.section_id = s.id AND c.is_approved
                )"#
            }
            PipelineStage::Validation => {
                r#"EXISTS (
                    SELECT 1 FROM prompts p
                    JOIN content_items c ON c.prompt_id = p.id
                    JOIN validations v ON v.content_item_id = c.id
                    WHERE p.section_id = s.id AND v.is_approved
                )"#
            }
            _ => "TRUE",
        };

        let sql = format!(
            r#"
            SELECT
                COUNT(*) AS sections,
                COUNT(*) FILTER (WHERE {}) AS approved
            FROM sections s
            JOIN outlines o ON o.id = s.outline_id
            WHERE o.project_id = $1
            "#,
            approved_expr
        );

        let txn = self.scoped(self.read_conn(), user_id).await?;
        find_project(&txn, project_id).await?;

        let row = txn
            .query_one(Statement::from_sql_and_values(
                DbBackend::Postgres,
                &sql,
                vec![project_id.into()],
            ))
            .await?;
        txn.commit().await?;

        let (sections, approved) = match row {
            Some(row) => (
                row.try_get_by_index::<i64>(0)?,
                row.try_get_by_index::<i64>(1)?,
            ),
            None => (0, 0),
        };

        Ok(StageItems {
            sections: sections as usize,
            approved: approved as usize,
        })
    }

    async fn update_project_stage(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        stage: PipelineStage,
        completion_percentage: i32,
    ) -> Result<Project> {
        let txn = self.scoped(self.write_conn(), user_id).await?;
        let existing = find_project(&txn, project_id).await?;
        let completion = existing.completion_percentage.max(completion_percentage);

        let mut project: ProjectActiveModel = existing.into();
        project.current_stage = Set(stage.as_str().to_string());
        project.completion_percentage = Set(completion);
        project.updated_at = Set(chrono::Utc::now().into());

        let updated = project.update(&txn).await?;
        txn.commit().await?;
        Ok(updated)
    }
}
