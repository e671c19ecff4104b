//! Mock language model for development and testing

use crate::errors::Result;
use crate::llm::{CompletionRequest, LanguageModel, TokenStream};
use async_trait::async_trait;
use futures::StreamExt;

const MOCK_CONTENT: &str = "Lesson Overview\n\n\
    This lesson introduces the topic through a short guided discussion, \
    followed by a hands-on activity and a closing reflection. \
    Students work in pairs to apply the key ideas and share their findings.\n\n\
    [Mock response - LLM API key not configured]";

const MOCK_REVIEW: &str = r#"{
  "standards_alignment": 8.0,
  "reading_level": { "score": 7.0, "level": "Grade 6" },
  "pedagogical_alignment": 8.0,
  "accessibility": 7.5,
  "cultural_sensitivity": 9.0,
  "quality_score": 8.0,
  "standards_alignment_score": 8.0,
  "suggestions": "Add a worked example before the activity.",
  "details": { "reviewer": "mock" }
}"#;

/// Canned responses; JSON when the request asks for JSON, prose otherwise
#[derive(Debug, Clone)]
pub struct MockLanguageModel {
    content: String,
    review: String,
}

impl MockLanguageModel {
    pub fn new() -> Self {
        Self {
            content: MOCK_CONTENT.to_string(),
            review: MOCK_REVIEW.to_string(),
        }
    }

    /// Override the prose response
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Override the JSON review response
    pub fn with_review(mut self, review: impl Into<String>) -> Self {
        self.review = review.into();
        self
    }

    fn respond(&self, request: &CompletionRequest) -> &str {
        let wants_json = request
            .system
            .as_deref()
            .is_some_and(|system| system.contains("JSON"));

        if wants_json {
            &self.review
        } else {
            &self.content
        }
    }
}

impl Default for MockLanguageModel {
    fn default() -> Self {
        Self::new()
    }
}

/// Split text into word-sized chunks that concatenate back to the input
fn chunk_words(text: &str) -> Vec<String> {
    text.split_inclusive(' ').map(str::to_string).collect()
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        Ok(self.respond(request).to_string())
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<TokenStream> {
        let chunks = chunk_words(self.respond(request));
        Ok(futures::stream::iter(chunks.into_iter().map(Ok)).boxed())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_reassembles_to_completion() {
        let model = MockLanguageModel::new().with_content("one two three");
        let request = CompletionRequest::new("m", "x");

        let chunks: Vec<String> = model
            .stream(&request)
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;

        assert_eq!(chunks, vec!["one ", "two ", "three"]);
        assert_eq!(chunks.concat(), model.complete(&request).await.unwrap());
    }

    #[tokio::test]
    async fn test_json_requests_get_review() {
        let model = MockLanguageModel::new();
        let request = CompletionRequest::new("m", "x").with_system("Respond only with JSON.");

        let text = model.complete(&request).await.unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(&text).is_ok());
    }
}
