//! Content and validation handlers

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::handlers::prompts::ApprovalRequest;
use crate::AppState;
use lessonforge_common::{
    auth::AuthContext,
    db::models::{ContentItem, Validation},
    errors::Result,
};

pub async fn approve_content(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(content_id): Path<Uuid>,
    request: Option<Json<ApprovalRequest>>,
) -> Result<Json<ContentItem>> {
    let Json(request) = request.unwrap_or_default();
    let item = state
        .store
        .set_content_approval(auth.user_id, content_id, request.approved)
        .await?;

    tracing::info!(content_id = %content_id, approved = request.approved, "Content approval set");
    Ok(Json(item))
}

/// Review a content item with the language model and record the result
///
/// Scores at or above the approval threshold approve the validation.
pub async fn validate_content(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(content_id): Path<Uuid>,
) -> Result<Json<Validation>> {
    let validation = state.pipeline.validate_content(auth.user_id, content_id).await?;
    Ok(Json(validation))
}

pub async fn approve_validation(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(validation_id): Path<Uuid>,
    request: Option<Json<ApprovalRequest>>,
) -> Result<Json<Validation>> {
    let Json(request) = request.unwrap_or_default();
    let validation = state
        .store
        .set_validation_approval(auth.user_id, validation_id, request.approved)
        .await?;

    tracing::info!(validation_id = %validation_id, approved = request.approved, "Validation approval set");
    Ok(Json(validation))
}
