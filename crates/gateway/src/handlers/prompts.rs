//! Prompt handlers: synthesis, edits, approval and offline generation

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use lessonforge_common::{
    auth::AuthContext,
    db::models::{ContentItem, Prompt},
    errors::{AppError, Result},
    generation::{GenerateOptions, GenerationStyle},
};

/// Edit prompt request
#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePromptRequest {
    #[validate(length(min = 1, max = 20000))]
    pub content: String,
}

/// Approval request; approves when the body is omitted
#[derive(Debug, Deserialize)]
pub struct ApprovalRequest {
    #[serde(default = "default_approved")]
    pub approved: bool,
}

fn default_approved() -> bool {
    true
}

impl Default for ApprovalRequest {
    fn default() -> Self {
        Self { approved: true }
    }
}

/// Offline generation request
#[derive(Debug, Default, Deserialize, Validate)]
pub struct GenerateContentRequest {
    #[validate(length(min = 1, max = 200))]
    pub model: Option<String>,
    pub style: Option<GenerationStyle>,
}

/// Build (or rebuild) the prompt of a section
pub async fn synthesize_prompt(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(section_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Prompt>)> {
    let prompt = state
        .pipeline
        .synthesize_section_prompt(auth.user_id, section_id)
        .await?;

    Ok((StatusCode::CREATED, Json(prompt)))
}

/// Replace the text of a prompt; approval is reset
pub async fn update_prompt(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(prompt_id): Path<Uuid>,
    Json(request): Json<UpdatePromptRequest>,
) -> Result<Json<Prompt>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("content".to_string()),
    })?;

    let prompt = state
        .store
        .update_prompt_text(auth.user_id, prompt_id, request.content)
        .await?;

    tracing::info!(prompt_id = %prompt_id, user_id = %auth.user_id, "Prompt edited");
    Ok(Json(prompt))
}

pub async fn approve_prompt(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(prompt_id): Path<Uuid>,
    request: Option<Json<ApprovalRequest>>,
) -> Result<Json<Prompt>> {
    let Json(request) = request.unwrap_or_default();
    let prompt = state
        .store
        .set_prompt_approval(auth.user_id, prompt_id, request.approved)
        .await?;

    tracing::info!(prompt_id = %prompt_id, approved = request.approved, "Prompt approval set");
    Ok(Json(prompt))
}

/// Generate content for a prompt without streaming
pub async fn generate_content(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(prompt_id): Path<Uuid>,
    request: Option<Json<GenerateContentRequest>>,
) -> Result<Json<ContentItem>> {
    let Json(request) = request.unwrap_or_default();
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("model".to_string()),
    })?;

    let options = GenerateOptions {
        model: request.model,
        style: request.style.unwrap_or_default(),
    };
    let item = state
        .pipeline
        .generate_content(auth.user_id, prompt_id, &options)
        .await?;

    Ok(Json(item))
}
