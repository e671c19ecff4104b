//! Quality Assessor - best-effort scoring of generated text
//!
//! A secondary, smaller model rates a (possibly partial) text on five
//! indicators. Models often wrap JSON in a fenced block, so extraction looks
//! for a fence first and falls back to the raw response.

use crate::cache::{content_hash, keys, Cache};
use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use crate::llm::{CompletionRequest, LanguageModel};
use crate::metrics;
use regex_lite::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

const ASSESSOR_TEMPERATURE: f32 = 0.2;
const ASSESSOR_MAX_TOKENS: u32 = 512;

const ASSESSOR_SYSTEM: &str =
    "You are an expert reviewer of K-12 educational materials. Respond only with a single JSON object.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingLevel {
    pub score: f64,
    pub level: String,
}

/// Scores on a 0-10 scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIndicators {
    pub standards_alignment: f64,
    pub reading_level: ReadingLevel,
    pub pedagogical_alignment: f64,
    pub accessibility: f64,
    pub cultural_sensitivity: f64,
}

impl QualityIndicators {
    fn clamped(self) -> Self {
        let clamp = |v: f64| v.clamp(0.0, 10.0);
        Self {
            standards_alignment: clamp(self.standards_alignment),
            reading_level: ReadingLevel {
                score: clamp(self.reading_level.score),
                level: self.reading_level.level,
            },
            pedagogical_alignment: clamp(self.pedagogical_alignment),
            accessibility: clamp(self.accessibility),
            cultural_sensitivity: clamp(self.cultural_sensitivity),
        }
    }
}

fn fence_pattern() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("valid fence pattern"))
}

/// Parse model output as JSON: a fenced block first, then the raw text
pub fn extract_quality_json<T: DeserializeOwned>(response: &str) -> Result<T> {
    if let Some(body) = fence_pattern().captures(response).and_then(|c| c.get(1)) {
        if let Ok(parsed) = serde_json::from_str(body.as_str().trim()) {
            return Ok(parsed);
        }
    }

    serde_json::from_str(response.trim()).map_err(|e| AppError::MalformedResponse {
        message: format!("No JSON object in model response: {}", e),
    })
}

/// First `max_chars` characters of `text`
pub fn char_prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

fn assessment_prompt(text: &str) -> String {
    format!(
        "Assess the following educational content and return JSON with exactly this shape:\n\
         {{\n  \"standards_alignment\": <0-10>,\n  \"reading_level\": {{ \"score\": <0-10>, \"level\": \"<grade band>\" }},\n  \
         \"pedagogical_alignment\": <0-10>,\n  \"accessibility\": <0-10>,\n  \"cultural_sensitivity\": <0-10>\n}}\n\n\
         Content:\n{}",
        text
    )
}

/// Scores text with the configured quality model
pub struct QualityAssessor {
    model: Arc<dyn LanguageModel>,
    quality_model: String,
    cache: Option<Arc<Cache>>,
}

impl QualityAssessor {
    pub fn new(model: Arc<dyn LanguageModel>, config: &LlmConfig) -> Self {
        Self {
            model,
            quality_model: config.quality_model.clone(),
            cache: None,
        }
    }

    /// Reuse results for identical text
    pub fn with_cache(mut self, cache: Arc<Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn assess(&self, text: &str) -> Result<QualityIndicators> {
        let key = keys::quality(&self.quality_model, &content_hash(text));

        if let Some(cache) = &self.cache {
            match cache.get::<QualityIndicators>(&key).await {
                Ok(Some(cached)) => {
                    metrics::record_cache(true, "quality");
                    metrics::record_quality_check("cached");
                    return Ok(cached);
                }
                Ok(None) => metrics::record_cache(false, "quality"),
                Err(e) => tracing::warn!(error = %e, "Quality cache lookup failed"),
            }
        }

        let request = CompletionRequest::new(&self.quality_model, assessment_prompt(text))
            .with_system(ASSESSOR_SYSTEM)
            .with_temperature(ASSESSOR_TEMPERATURE)
            .with_max_tokens(ASSESSOR_MAX_TOKENS);

        let result = match self.model.complete(&request).await {
            Ok(response) => extract_quality_json::<QualityIndicators>(&response).map(QualityIndicators::clamped),
            Err(e) => Err(e),
        };

        metrics::record_quality_check(if result.is_ok() { "ok" } else { "failed" });
        let indicators = result?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set(&key, &indicators).await {
                tracing::warn!(error = %e, "Failed to cache quality result, continuing without cache");
            }
        }

        Ok(indicators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLanguageModel;

    const RAW: &str = r#"{
        "standards_alignment": 8.5,
        "reading_level": { "score": 6.0, "level": "Grade 6" },
        "pedagogical_alignment": 7.0,
        "accessibility": 9.0,
        "cultural_sensitivity": 8.0
    }"#;

    #[test]
    fn test_fenced_and_raw_parse_identically() {
        let fenced = format!("Here is my assessment:\n```json\n{}\n```\nHope this helps.", RAW);

        let from_fence: QualityIndicators = extract_quality_json(&fenced).unwrap();
        let from_raw: QualityIndicators = extract_quality_json(RAW).unwrap();

        assert_eq!(from_fence, from_raw);
        assert_eq!(from_raw.reading_level.level, "Grade 6");
    }

    #[test]
    fn test_unparseable_response_is_error() {
        let err = extract_quality_json::<QualityIndicators>("The content looks great!").unwrap_err();
        assert!(matches!(err, AppError::MalformedResponse { .. }));
    }

    #[test]
    fn test_char_prefix_respects_boundaries() {
        assert_eq!(char_prefix("héllo", 2), "hé");
        assert_eq!(char_prefix("abc", 10), "abc");
        assert_eq!(char_prefix("", 5), "");
    }

    #[tokio::test]
    async fn test_scores_are_clamped() {
        let model = MockLanguageModel::new().with_review(
            r#"```json
            {"standards_alignment": 14, "reading_level": {"score": -2, "level": "K"},
             "pedagogical_alignment": 5, "accessibility": 5, "cultural_sensitivity": 5}
            ```"#,
        );
        let assessor = QualityAssessor::new(Arc::new(model), &LlmConfig::default());

        let indicators = assessor.assess("Plants use sunlight.").await.unwrap();
        assert_eq!(indicators.standards_alignment, 10.0);
        assert_eq!(indicators.reading_level.score, 0.0);
    }
}
