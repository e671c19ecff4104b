//! Walks a project from prompts to completion through the offline pipeline

mod common;

use common::seed_project;
use lessonforge_common::config::{GenerationConfig, LlmConfig};
use lessonforge_common::db::models::PipelineStage;
use lessonforge_common::generation::{GenerateOptions, GenerationStyle, Pipeline};
use lessonforge_common::llm::MockLanguageModel;
use lessonforge_common::{AppError, ContentStore};
use std::sync::Arc;

const STRONG_REVIEW: &str = r#"{"quality_score": 9, "standards_alignment_score": 8.5, "suggestions": null, "details": {}}"#;

#[tokio::test]
async fn test_project_reaches_complete() {
    let seeded = seed_project(PipelineStage::Prompts, 2).await;
    let model = MockLanguageModel::new()
        .with_content("Evaporation turns puddles into vapour.")
        .with_review(STRONG_REVIEW);
    let pipeline = Pipeline::new(
        seeded.store.clone(),
        Arc::new(model),
        &LlmConfig::default(),
        &GenerationConfig::default(),
    );
    let user = seeded.user_id;

    // Prompts stage: every section needs an approved prompt
    let mut prompt_ids = Vec::new();
    for &section_id in &seeded.section_ids {
        let prompt = pipeline.synthesize_section_prompt(user, section_id).await.unwrap();
        prompt_ids.push(prompt.id);
    }
    let err = pipeline.advance_project(user, seeded.project_id).await.unwrap_err();
    assert!(matches!(err, AppError::StageNotApproved { pending: 2, .. }));

    for &prompt_id in &prompt_ids {
        seeded.store.set_prompt_approval(user, prompt_id, true).await.unwrap();
    }
    let project = pipeline.advance_project(user, seeded.project_id).await.unwrap();
    assert_eq!(project.stage(), PipelineStage::Content);

    // Content stage: generate, then approve by hand
    let options = GenerateOptions {
        style: GenerationStyle::Conservative,
        ..Default::default()
    };
    let mut content_ids = Vec::new();
    for &prompt_id in &prompt_ids {
        let item = pipeline.generate_content(user, prompt_id, &options).await.unwrap();
        assert_eq!(item.metadata["style"], "conservative");
        content_ids.push(item.id);
    }
    assert!(pipeline.advance_project(user, seeded.project_id).await.is_err());

    for &content_id in &content_ids {
        seeded.store.set_content_approval(user, content_id, true).await.unwrap();
    }
    let project = pipeline.advance_project(user, seeded.project_id).await.unwrap();
    assert_eq!(project.stage(), PipelineStage::Validation);

    // Validation stage: strong reviews approve themselves
    for &content_id in &content_ids {
        let validation = pipeline.validate_content(user, content_id).await.unwrap();
        assert!(validation.is_approved);
    }
    let project = pipeline.advance_project(user, seeded.project_id).await.unwrap();
    assert_eq!(project.stage(), PipelineStage::Complete);
    assert_eq!(project.completion_percentage, 100);

    let err = pipeline.advance_project(user, seeded.project_id).await.unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));
}

#[tokio::test]
async fn test_edited_prompt_must_be_approved_again() {
    let seeded = seed_project(PipelineStage::Prompts, 1).await;
    let pipeline = Pipeline::new(
        seeded.store.clone(),
        Arc::new(MockLanguageModel::new()),
        &LlmConfig::default(),
        &GenerationConfig::default(),
    );
    let user = seeded.user_id;

    let prompt = pipeline
        .synthesize_section_prompt(user, seeded.section_ids[0])
        .await
        .unwrap();
    seeded.store.set_prompt_approval(user, prompt.id, true).await.unwrap();

    let edited = seeded
        .store
        .update_prompt_text(user, prompt.id, "Focus on clouds.".to_string())
        .await
        .unwrap();
    assert!(!edited.is_approved);

    let err = pipeline.advance_project(user, seeded.project_id).await.unwrap_err();
    assert!(matches!(err, AppError::StageNotApproved { pending: 1, .. }));
}
