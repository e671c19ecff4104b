//! Persistence Sink - idempotent writes of generated content and validations

use crate::db::models::{ContentItem, Validation};
use crate::db::{ContentDraft, ContentStore, ValidationDraft};
use crate::errors::Result;
use crate::metrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// How a recorded validation's approval flag is set
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ApprovalPolicy {
    /// Approve when both scores reach the threshold
    Auto { threshold: f64 },
    /// Leave approval to the user
    Manual,
}

impl ApprovalPolicy {
    pub fn approves(&self, quality_score: f64, standards_alignment_score: f64) -> bool {
        match *self {
            ApprovalPolicy::Auto { threshold } => {
                quality_score >= threshold && standards_alignment_score >= threshold
            }
            ApprovalPolicy::Manual => false,
        }
    }
}

/// Review scores on a 1-10 scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationScores {
    pub quality_score: f64,
    pub standards_alignment_score: f64,
    #[serde(default)]
    pub suggestions: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl ValidationScores {
    pub fn clamped(mut self) -> Self {
        self.quality_score = self.quality_score.clamp(1.0, 10.0);
        self.standards_alignment_score = self.standards_alignment_score.clamp(1.0, 10.0);
        self
    }
}

/// Writes content and validation rows through the store
#[derive(Clone)]
pub struct PersistenceSink {
    store: Arc<dyn ContentStore>,
}

impl PersistenceSink {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// Make sure a content row exists for the prompt before streaming into it
    pub async fn anchor_content(
        &self,
        user_id: Uuid,
        prompt_id: Uuid,
        metadata: serde_json::Value,
    ) -> Result<ContentItem> {
        self.store.ensure_content(user_id, prompt_id, metadata).await
    }

    /// Write the final text of a prompt's content; approval is left as is
    pub async fn persist_content(
        &self,
        user_id: Uuid,
        prompt_id: Uuid,
        text: String,
        metadata: serde_json::Value,
    ) -> Result<ContentItem> {
        let item = self
            .store
            .upsert_content(
                user_id,
                prompt_id,
                ContentDraft {
                    text,
                    metadata,
                    approval: None,
                },
            )
            .await?;

        tracing::debug!(content_id = %item.id, prompt_id = %prompt_id, chars = item.content.len(), "Content persisted");
        Ok(item)
    }

    /// Record the validation of a content item under the given policy
    pub async fn record_validation(
        &self,
        user_id: Uuid,
        content_id: Uuid,
        scores: ValidationScores,
        policy: ApprovalPolicy,
    ) -> Result<Validation> {
        let is_approved = policy.approves(scores.quality_score, scores.standards_alignment_score);

        let validation = self
            .store
            .upsert_validation(
                user_id,
                content_id,
                ValidationDraft {
                    quality_score: scores.quality_score,
                    standards_alignment_score: scores.standards_alignment_score,
                    suggestions: scores.suggestions,
                    details: scores.details,
                    is_approved,
                },
            )
            .await?;

        metrics::record_validation(is_approved);
        tracing::info!(
            content_id = %content_id,
            quality_score = validation.quality_score,
            standards_alignment_score = validation.standards_alignment_score,
            approved = is_approved,
            "Validation recorded"
        );

        Ok(validation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_inclusive() {
        let policy = ApprovalPolicy::Auto { threshold: 8.0 };
        assert!(policy.approves(8.0, 8.0));
        assert!(!policy.approves(7.9, 8.0));
        assert!(!policy.approves(8.0, 7.9));
        assert!(policy.approves(9.5, 10.0));
    }

    #[test]
    fn test_manual_never_approves() {
        assert!(!ApprovalPolicy::Manual.approves(10.0, 10.0));
    }

    #[test]
    fn test_scores_clamped_to_scale() {
        let scores = ValidationScores {
            quality_score: 12.0,
            standards_alignment_score: 0.0,
            suggestions: None,
            details: serde_json::Value::Null,
        }
        .clamped();

        assert_eq!(scores.quality_score, 10.0);
        assert_eq!(scores.standards_alignment_score, 1.0);
    }
}
