//! Seeded stores and scripted models for generation tests

use crate::config::{GenerationConfig, LlmConfig};
use crate::db::models::{
    ContentItem, Outline, PipelineStage, Project, Prompt, Section, Validation,
};
use crate::db::{
    ContentContext, ContentDraft, ContentStore, GenerationContext, MemoryStore, PromptDraft,
    SectionContext, StageItems, ValidationDraft,
};
use crate::errors::{AppError, Result};
use crate::generation::events::ServerEvent;
use crate::llm::{CompletionRequest, LanguageModel, TokenStream};
use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Semaphore};
use uuid::Uuid;

pub const REVIEW: &str = r#"{
  "standards_alignment": 8.5,
  "reading_level": { "score": 6.0, "level": "Grade 5" },
  "pedagogical_alignment": 8.0,
  "accessibility": 7.0,
  "cultural_sensitivity": 9.0
}"#;

/// One project chain owned by one user
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub user_id: Uuid,
    pub project_id: Uuid,
    pub section_id: Uuid,
    pub prompt_id: Uuid,
}

impl Fixture {
    pub async fn seed(stage: PipelineStage) -> Self {
        let store = Arc::new(MemoryStore::new());
        let now = chrono::Utc::now().into();
        let user_id = Uuid::new_v4();

        let project = Project {
            id: Uuid::new_v4(),
            user_id,
            title: "Fractions in the Kitchen".to_string(),
            description: None,
            current_stage: stage.as_str().to_string(),
            completion_percentage: stage.completion_percentage(),
            config: serde_json::json!({
                "project_type": "lesson",
                "grade_levels": ["4", "5"],
                "subject_areas": ["Mathematics"],
                "standards": ["CCSS.MATH.4.NF.A.1"],
                "learning_objectives": ["Compare fractions using recipes"],
            }),
            created_at: now,
            updated_at: now,
        };
        let outline = Outline {
            id: Uuid::new_v4(),
            project_id: project.id,
            structure: serde_json::json!({ "summary": "Fractions through cooking" }),
            created_at: now,
            updated_at: now,
        };
        let section = Section {
            id: Uuid::new_v4(),
            outline_id: outline.id,
            title: "Measuring Cups".to_string(),
            description: Some("Halves and quarters with real cups".to_string()),
            sequence: 1,
            config: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        };
        let prompt = Prompt {
            id: Uuid::new_v4(),
            section_id: section.id,
            content: "Write a lesson on measuring cups.".to_string(),
            parameters: serde_json::json!({}),
            is_generated: true,
            is_approved: false,
            created_at: now,
            updated_at: now,
        };

        let fixture = Self {
            store: Arc::clone(&store),
            user_id,
            project_id: project.id,
            section_id: section.id,
            prompt_id: prompt.id,
        };

        store.insert_project(project).await;
        store.insert_outline(outline).await;
        store.insert_section(section).await;
        store.insert_prompt(prompt).await;
        fixture
    }
}

pub fn llm_config() -> LlmConfig {
    LlmConfig::default()
}

pub fn generation_config() -> GenerationConfig {
    GenerationConfig::default()
}

/// Model whose stream is fed by the test and whose completions wait on a gate
pub struct ScriptedModel {
    tokens: Mutex<Option<UnboundedReceiver<Result<String>>>>,
    gate: Arc<Semaphore>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    /// The model, the sender feeding its stream and the completion gate
    pub fn new() -> (Arc<Self>, UnboundedSender<Result<String>>, Arc<Semaphore>) {
        let (tx, rx) = unbounded();
        let gate = Arc::new(Semaphore::new(0));
        let model = Arc::new(Self {
            tokens: Mutex::new(Some(rx)),
            gate: Arc::clone(&gate),
            calls: AtomicUsize::new(0),
        });
        (model, tx, gate)
    }

    /// Completions started so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let permit = self.gate.acquire().await.map_err(|e| AppError::Internal {
            message: e.to_string(),
        })?;
        permit.forget();
        Ok(REVIEW.to_string())
    }

    async fn stream(&self, _request: &CompletionRequest) -> Result<TokenStream> {
        let tokens = self.tokens.lock().unwrap().take().ok_or_else(|| AppError::Internal {
            message: "stream already taken".to_string(),
        })?;
        Ok(tokens.boxed())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Receive the next event, failing the test if the session stalls
pub async fn next_event(events: &mut mpsc::Receiver<ServerEvent>) -> ServerEvent {
    tokio::time::timeout(std::time::Duration::from_secs(5), events.recv())
        .await
        .expect("session stalled")
        .expect("session closed its event channel")
}

/// Store whose content upserts fail; everything else reaches the inner store
pub struct FailingContentWrites(pub Arc<MemoryStore>);

#[async_trait]
impl ContentStore for FailingContentWrites {
    async fn ping(&self) -> Result<()> {
        self.0.ping().await
    }

    async fn find_project(&self, user_id: Uuid, project_id: Uuid) -> Result<Project> {
        self.0.find_project(user_id, project_id).await
    }

    async fn load_generation_context(&self, user_id: Uuid, prompt_id: Uuid) -> Result<GenerationContext> {
        self.0.load_generation_context(user_id, prompt_id).await
    }

    async fn load_section_context(&self, user_id: Uuid, section_id: Uuid) -> Result<SectionContext> {
        self.0.load_section_context(user_id, section_id).await
    }

    async fn load_content_context(&self, user_id: Uuid, content_id: Uuid) -> Result<ContentContext> {
        self.0.load_content_context(user_id, content_id).await
    }

    async fn upsert_prompt(&self, user_id: Uuid, section_id: Uuid, draft: PromptDraft) -> Result<Prompt> {
        self.0.upsert_prompt(user_id, section_id, draft).await
    }

    async fn update_prompt_text(&self, user_id: Uuid, prompt_id: Uuid, content: String) -> Result<Prompt> {
        self.0.update_prompt_text(user_id, prompt_id, content).await
    }

    async fn set_prompt_approval(&self, user_id: Uuid, prompt_id: Uuid, approved: bool) -> Result<Prompt> {
        self.0.set_prompt_approval(user_id, prompt_id, approved).await
    }

    async fn ensure_content(&self, user_id: Uuid, prompt_id: Uuid, metadata: serde_json::Value) -> Result<ContentItem> {
        self.0.ensure_content(user_id, prompt_id, metadata).await
    }

    async fn upsert_content(&self, _user_id: Uuid, _prompt_id: Uuid, _draft: ContentDraft) -> Result<ContentItem> {
        Err(AppError::Database(sea_orm::DbErr::Custom("disk full".to_string())))
    }

    async fn set_content_approval(&self, user_id: Uuid, content_id: Uuid, approved: bool) -> Result<ContentItem> {
        self.0.set_content_approval(user_id, content_id, approved).await
    }

    async fn upsert_validation(&self, user_id: Uuid, content_id: Uuid, draft: ValidationDraft) -> Result<Validation> {
        self.0.upsert_validation(user_id, content_id, draft).await
    }

    async fn set_validation_approval(&self, user_id: Uuid, validation_id: Uuid, approved: bool) -> Result<Validation> {
        self.0.set_validation_approval(user_id, validation_id, approved).await
    }

    async fn stage_items(&self, user_id: Uuid, project_id: Uuid, stage: PipelineStage) -> Result<StageItems> {
        self.0.stage_items(user_id, project_id, stage).await
    }

    async fn update_project_stage(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        stage: PipelineStage,
        completion_percentage: i32,
    ) -> Result<Project> {
        self.0.update_project_stage(user_id, project_id, stage, completion_percentage).await
    }
}
