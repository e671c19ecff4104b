//! Wire messages of a streaming generation session

use crate::errors::{AppError, Result};
use crate::generation::quality::QualityIndicators;
use crate::generation::synthesizer::GenerationStyle;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Client request to start generating content for a prompt
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub prompt_id: Option<String>,
    pub model: Option<String>,
    pub style: Option<String>,
}

impl GenerateRequest {
    pub fn for_prompt(prompt_id: Uuid) -> Self {
        Self {
            prompt_id: Some(prompt_id.to_string()),
            ..Default::default()
        }
    }

    pub fn with_style(mut self, style: GenerationStyle) -> Self {
        self.style = Some(style.as_str().to_string());
        self
    }

    /// The requested prompt id; absent or malformed ids are rejected
    pub fn prompt_id(&self) -> Result<Uuid> {
        let raw = self
            .prompt_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::MissingField {
                field: "promptId".to_string(),
            })?;

        Uuid::parse_str(raw).map_err(|_| AppError::InvalidFormat {
            message: format!("promptId is not a valid id: {}", raw),
        })
    }

    /// Requested style; unknown names fall back to the default
    pub fn style(&self) -> GenerationStyle {
        match self.style.as_deref() {
            None => GenerationStyle::default(),
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!(style = raw, error = %e, "Unknown style, using default");
                GenerationStyle::default()
            }),
        }
    }
}

/// Inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Generate(GenerateRequest),
    Cancel,
}

impl ClientMessage {
    /// Decode a JSON text frame
    ///
    /// `{"type":"cancel"}` cancels; any other object is a generate request.
    pub fn parse(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text).map_err(|e| AppError::InvalidFormat {
            message: format!("Message is not valid JSON: {}", e),
        })?;

        if value.get("type").and_then(|t| t.as_str()) == Some("cancel") {
            return Ok(ClientMessage::Cancel);
        }

        serde_json::from_value(value)
            .map(ClientMessage::Generate)
            .map_err(|e| AppError::InvalidFormat {
                message: format!("Invalid generate request: {}", e),
            })
    }
}

/// Outbound event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Progress {
        progress: u8,
        message: String,
    },
    Content {
        progress: u8,
        message: String,
        content: String,
        #[serde(rename = "final", skip_serializing_if = "Option::is_none")]
        is_final: Option<bool>,
        #[serde(rename = "contentId", skip_serializing_if = "Option::is_none")]
        content_id: Option<Uuid>,
    },
    Quality {
        indicators: QualityIndicators,
    },
    Error {
        message: String,
    },
    Info {
        message: String,
    },
}

impl ServerEvent {
    pub fn progress(progress: u8, message: impl Into<String>) -> Self {
        ServerEvent::Progress { progress, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error { message: message.into() }
    }

    pub fn info(message: impl Into<String>) -> Self {
        ServerEvent::Info { message: message.into() }
    }

    /// Event type name as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Progress { .. } => "progress",
            ServerEvent::Content { .. } => "content",
            ServerEvent::Quality { .. } => "quality",
            ServerEvent::Error { .. } => "error",
            ServerEvent::Info { .. } => "info",
        }
    }
}
