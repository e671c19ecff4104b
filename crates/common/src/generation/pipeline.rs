//! Offline pipeline operations
//!
//! Non-streaming counterparts of the session controller plus the
//! operations that move a project through its stages.

use crate::config::{GenerationConfig, LlmConfig};
use crate::db::models::{ContentItem, Project, Prompt, Validation};
use crate::db::{ContentStore, PromptDraft};
use crate::errors::{AppError, Result};
use crate::generation::quality::extract_quality_json;
use crate::generation::sink::{ApprovalPolicy, PersistenceSink, ValidationScores};
use crate::generation::synthesizer::{GenerationStyle, Synthesizer};
use crate::llm::{complete_with_retry, CompletionRequest, LanguageModel, RetryPolicy};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

const REVIEW_TEMPERATURE: f32 = 0.2;
const REVIEW_MAX_TOKENS: u32 = 1024;

const REVIEW_SYSTEM: &str =
    "You are an expert curriculum reviewer. Respond only with a single JSON object.";

/// Options for offline generation
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub model: Option<String>,
    pub style: GenerationStyle,
}

/// Offline generation, validation and stage management
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn ContentStore>,
    model: Arc<dyn LanguageModel>,
    synthesizer: Synthesizer,
    sink: PersistenceSink,
    retry: RetryPolicy,
    review_model: String,
    approval_threshold: f64,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ContentStore>,
        model: Arc<dyn LanguageModel>,
        llm: &LlmConfig,
        generation: &GenerationConfig,
    ) -> Self {
        Self {
            sink: PersistenceSink::new(Arc::clone(&store)),
            synthesizer: Synthesizer::new(llm, generation),
            retry: RetryPolicy::from_config(llm),
            review_model: llm.model.clone(),
            approval_threshold: generation.approval_threshold,
            store,
            model,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build and store the prompt for a section
    #[instrument(skip(self), fields(user_id = %user_id, section_id = %section_id))]
    pub async fn synthesize_section_prompt(&self, user_id: Uuid, section_id: Uuid) -> Result<Prompt> {
        let context = self.store.load_section_context(user_id, section_id).await?;

        let synthesized = self.synthesizer.synthesize(
            &context.project.title,
            &context.project.educational_dna(),
            &context.outline.outline_structure(),
            std::slice::from_ref(&context.section),
        );

        let prompt = self
            .store
            .upsert_prompt(
                user_id,
                section_id,
                PromptDraft {
                    content: synthesized.text,
                    parameters: serde_json::to_value(&synthesized.params)?,
                },
            )
            .await?;

        info!(
            prompt_id = %prompt.id,
            temperature = synthesized.params.temperature,
            max_tokens = synthesized.params.max_tokens,
            "Prompt synthesized"
        );
        Ok(prompt)
    }

    /// Generate content for a prompt in one call, with retries
    #[instrument(skip(self, options), fields(user_id = %user_id, prompt_id = %prompt_id, style = %options.style))]
    pub async fn generate_content(
        &self,
        user_id: Uuid,
        prompt_id: Uuid,
        options: &GenerateOptions,
    ) -> Result<ContentItem> {
        let context = self.store.load_generation_context(user_id, prompt_id).await?;
        let request = self
            .synthesizer
            .generation_request(&context, options.style, options.model.as_deref());

        let text = complete_with_retry(self.model.as_ref(), &request, &self.retry).await?;

        let metadata = serde_json::json!({
            "model": request.model,
            "style": options.style.as_str(),
            "temperature": request.temperature,
        });
        let item = self.sink.persist_content(user_id, prompt_id, text, metadata).await?;

        info!(content_id = %item.id, chars = item.content.len(), "Content generated");
        Ok(item)
    }

    /// Score a content item and record the validation, auto-approving above threshold
    #[instrument(skip(self), fields(user_id = %user_id, content_id = %content_id))]
    pub async fn validate_content(&self, user_id: Uuid, content_id: Uuid) -> Result<Validation> {
        let context = self.store.load_content_context(user_id, content_id).await?;
        let config = context.generation.project.educational_dna();

        if context.content.content.trim().is_empty() {
            return Err(AppError::Validation {
                message: "Content item has no text to validate".to_string(),
                field: Some("content".to_string()),
            });
        }

        let standards = if config.standards.is_empty() {
            "Not specified".to_string()
        } else {
            config.standards.join(", ")
        };
        let prompt = format!(
            "Review the educational content below against these standards: {}.\n\
             Return JSON with exactly these fields:\n\
             {{\"quality_score\": <1-10>, \"standards_alignment_score\": <1-10>, \
             \"suggestions\": \"<improvements>\", \"details\": {{ <per-criterion notes> }}}}\n\n\
             Content:\n{}",
            standards, context.content.content
        );

        let request = CompletionRequest::new(&self.review_model, prompt)
            .with_system(REVIEW_SYSTEM)
            .with_temperature(REVIEW_TEMPERATURE)
            .with_max_tokens(REVIEW_MAX_TOKENS);

        let response = complete_with_retry(self.model.as_ref(), &request, &self.retry).await?;
        let scores = extract_quality_json::<ValidationScores>(&response)?.clamped();

        self.sink
            .record_validation(
                user_id,
                content_id,
                scores,
                ApprovalPolicy::Auto {
                    threshold: self.approval_threshold,
                },
            )
            .await
    }

    /// Move a project to its next stage once the current stage is fully approved
    #[instrument(skip(self), fields(user_id = %user_id, project_id = %project_id))]
    pub async fn advance_project(&self, user_id: Uuid, project_id: Uuid) -> Result<Project> {
        let project = self.store.find_project(user_id, project_id).await?;
        let stage = project.stage();

        let next = stage.next().ok_or_else(|| AppError::Validation {
            message: "Project is already complete".to_string(),
            field: Some("current_stage".to_string()),
        })?;

        let items = self.store.stage_items(user_id, project_id, stage).await?;
        if items.pending() > 0 {
            return Err(AppError::StageNotApproved {
                stage: stage.to_string(),
                pending: items.pending(),
            });
        }

        let updated = self
            .store
            .update_project_stage(user_id, project_id, next, next.completion_percentage())
            .await?;

        info!(
            from = %stage,
            to = %next,
            completion = updated.completion_percentage,
            "Project advanced"
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::PipelineStage;
    use crate::generation::fixtures::{generation_config, llm_config, Fixture};
    use crate::llm::MockLanguageModel;

    fn review(quality: f64, alignment: f64) -> String {
        format!(
            "```json\n{{\"quality_score\": {}, \"standards_alignment_score\": {}, \
             \"suggestions\": \"Add a warm-up\", \"details\": {{\"clarity\": \"good\"}}}}\n```",
            quality, alignment
        )
    }

    fn pipeline(fixture: &Fixture, model: MockLanguageModel) -> Pipeline {
        Pipeline::new(fixture.store.clone(), Arc::new(model), &llm_config(), &generation_config())
    }

    #[tokio::test]
    async fn test_synthesize_section_prompt_replaces_prompt() {
        let fixture = Fixture::seed(PipelineStage::Prompts).await;
        let pipeline = pipeline(&fixture, MockLanguageModel::new());

        let prompt = pipeline
            .synthesize_section_prompt(fixture.user_id, fixture.section_id)
            .await
            .unwrap();

        assert_eq!(prompt.id, fixture.prompt_id);
        assert!(prompt.content.contains("Measuring Cups"));
        assert!(prompt.content.contains("CCSS.MATH.4.NF.A.1"));
        assert!(prompt.is_generated);
        assert!(!prompt.is_approved);
        assert!(prompt.parameters["temperature"].is_number());
    }

    #[tokio::test]
    async fn test_generate_twice_keeps_one_content_row() {
        let fixture = Fixture::seed(PipelineStage::Content).await;
        let pipeline = pipeline(&fixture, MockLanguageModel::new().with_content("Measure twice."));
        let options = GenerateOptions {
            style: GenerationStyle::Creative,
            ..Default::default()
        };

        let first = pipeline.generate_content(fixture.user_id, fixture.prompt_id, &options).await.unwrap();
        fixture.store.set_content_approval(fixture.user_id, first.id, true).await.unwrap();
        let second = pipeline.generate_content(fixture.user_id, fixture.prompt_id, &options).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(fixture.store.content_count().await, 1);
        assert_eq!(second.content, "Measure twice.");
        assert_eq!(second.metadata["style"], "creative");
        assert!(second.is_approved);
    }

    #[tokio::test]
    async fn test_validation_at_threshold_approves() {
        let fixture = Fixture::seed(PipelineStage::Validation).await;
        let pipeline = pipeline(&fixture, MockLanguageModel::new().with_review(review(8.0, 9.0)));

        let item = pipeline
            .generate_content(fixture.user_id, fixture.prompt_id, &GenerateOptions::default())
            .await
            .unwrap();
        let validation = pipeline.validate_content(fixture.user_id, item.id).await.unwrap();

        assert!(validation.is_approved);
        assert_eq!(validation.quality_score, 8.0);
        assert_eq!(validation.suggestions.as_deref(), Some("Add a warm-up"));
    }

    #[tokio::test]
    async fn test_validation_below_threshold_stays_pending() {
        let fixture = Fixture::seed(PipelineStage::Validation).await;
        let pipeline = pipeline(&fixture, MockLanguageModel::new().with_review(review(7.9, 9.0)));

        let item = pipeline
            .generate_content(fixture.user_id, fixture.prompt_id, &GenerateOptions::default())
            .await
            .unwrap();
        let first = pipeline.validate_content(fixture.user_id, item.id).await.unwrap();
        let second = pipeline.validate_content(fixture.user_id, item.id).await.unwrap();

        assert!(!second.is_approved);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_validate_rejects_malformed_review() {
        let fixture = Fixture::seed(PipelineStage::Validation).await;
        let pipeline = pipeline(&fixture, MockLanguageModel::new().with_review("looks great!"));

        let item = pipeline
            .generate_content(fixture.user_id, fixture.prompt_id, &GenerateOptions::default())
            .await
            .unwrap();
        let err = pipeline.validate_content(fixture.user_id, item.id).await.unwrap_err();

        assert!(matches!(err, AppError::MalformedResponse { .. }));
        assert!(fixture.store.validation_for_content(item.id).await.is_none());
    }

    #[tokio::test]
    async fn test_advance_blocked_until_stage_approved() {
        let fixture = Fixture::seed(PipelineStage::Prompts).await;
        let pipeline = pipeline(&fixture, MockLanguageModel::new());

        let err = pipeline.advance_project(fixture.user_id, fixture.project_id).await.unwrap_err();
        assert!(matches!(err, AppError::StageNotApproved { pending: 1, .. }));

        fixture
            .store
            .set_prompt_approval(fixture.user_id, fixture.prompt_id, true)
            .await
            .unwrap();
        let project = pipeline.advance_project(fixture.user_id, fixture.project_id).await.unwrap();

        assert_eq!(project.stage(), PipelineStage::Content);
        assert_eq!(project.completion_percentage, PipelineStage::Content.completion_percentage());
    }

    #[tokio::test]
    async fn test_complete_project_cannot_advance() {
        let fixture = Fixture::seed(PipelineStage::Complete).await;
        let pipeline = pipeline(&fixture, MockLanguageModel::new());

        let err = pipeline.advance_project(fixture.user_id, fixture.project_id).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_other_users_cannot_generate() {
        let fixture = Fixture::seed(PipelineStage::Content).await;
        let pipeline = pipeline(&fixture, MockLanguageModel::new());

        let err = pipeline
            .generate_content(Uuid::new_v4(), fixture.prompt_id, &GenerateOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);
        assert_eq!(fixture.store.content_count().await, 0);
    }
}
