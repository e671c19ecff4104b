//! Project stage handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::AppState;
use lessonforge_common::{auth::AuthContext, errors::Result};

#[derive(Serialize)]
pub struct AdvanceResponse {
    pub project_id: Uuid,
    pub current_stage: String,
    pub completion_percentage: i32,
}

/// Move a project to its next stage
///
/// Fails with 409 while any item of the current stage awaits approval.
pub async fn advance_project(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(project_id): Path<Uuid>,
) -> Result<Json<AdvanceResponse>> {
    let project = state.pipeline.advance_project(auth.user_id, project_id).await?;

    Ok(Json(AdvanceResponse {
        project_id: project.id,
        current_stage: project.current_stage,
        completion_percentage: project.completion_percentage,
    }))
}
