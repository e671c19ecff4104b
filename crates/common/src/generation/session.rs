//! Streaming Session Controller
//!
//! Drives one generation session over an abstract message channel:
//! `Idle -> AwaitingPrompt -> Streaming -> Completed | Failed | Cancelled`.
//!
//! Token relay and quality checks share one task. Quality checks run on a
//! `JoinSet` polled by the same `select!` loop that relays chunks, so "at
//! most one check in flight" is simply "the set is empty". Dropping the token
//! stream on cancel aborts the upstream request.

use crate::config::{GenerationConfig, LlmConfig};
use crate::db::ContentStore;
use crate::errors::{AppError, Result};
use crate::generation::events::{ClientMessage, GenerateRequest, ServerEvent};
use crate::generation::quality::{char_prefix, QualityAssessor, QualityIndicators};
use crate::generation::sink::PersistenceSink;
use crate::generation::synthesizer::Synthesizer;
use crate::llm::LanguageModel;
use crate::metrics::{self, SessionMetrics};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Progress reported once the token stream is open
const STREAM_OPEN_PROGRESS: u8 = 10;
/// Progress never reaches 100 before completion
const MAX_STREAMING_PROGRESS: u8 = 99;
/// Rough characters per token, for progress estimation
const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingPrompt,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingPrompt => "awaiting_prompt",
            SessionState::Streaming => "streaming",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
            SessionState::Cancelled => "cancelled",
        }
    }
}

/// Runs streaming generation sessions
#[derive(Clone)]
pub struct SessionController {
    store: Arc<dyn ContentStore>,
    model: Arc<dyn LanguageModel>,
    assessor: Arc<QualityAssessor>,
    synthesizer: Synthesizer,
    sink: PersistenceSink,
    settings: GenerationConfig,
}

impl SessionController {
    pub fn new(
        store: Arc<dyn ContentStore>,
        model: Arc<dyn LanguageModel>,
        assessor: Arc<QualityAssessor>,
        llm: &LlmConfig,
        generation: &GenerationConfig,
    ) -> Self {
        Self {
            sink: PersistenceSink::new(Arc::clone(&store)),
            synthesizer: Synthesizer::new(llm, generation),
            store,
            model,
            assessor,
            settings: generation.clone(),
        }
    }

    /// Run one session to its final state
    ///
    /// Reads client messages from `inbound` and writes events to `outbound`.
    /// Ends when a generation finishes, fails or is cancelled, when the
    /// client goes away, or after the idle timeout.
    #[instrument(skip(self, inbound, outbound), fields(user_id = %user_id))]
    pub async fn run<S>(&self, user_id: Uuid, inbound: S, outbound: mpsc::Sender<ServerEvent>) -> SessionState
    where
        S: Stream<Item = ClientMessage> + Send,
    {
        let session_metrics = SessionMetrics::start();
        let mut inbound = Box::pin(inbound);

        let state = self.drive(user_id, &mut inbound, &outbound).await;

        session_metrics.finish(state.as_str());
        info!(state = state.as_str(), "Session closed");
        state
    }

    async fn drive<S>(
        &self,
        user_id: Uuid,
        inbound: &mut Pin<Box<S>>,
        outbound: &mpsc::Sender<ServerEvent>,
    ) -> SessionState
    where
        S: Stream<Item = ClientMessage> + Send,
    {
        let idle = self.settings.idle_timeout();

        let (prompt_id, request) = loop {
            match timeout(idle, inbound.next()).await {
                Err(_) => {
                    emit(outbound, ServerEvent::error("Session timed out waiting for a generation request")).await;
                    return SessionState::Failed;
                }
                Ok(None) => return SessionState::Idle,
                Ok(Some(ClientMessage::Cancel)) => {
                    if !emit(outbound, ServerEvent::info("No generation in progress")).await {
                        return SessionState::Idle;
                    }
                }
                Ok(Some(ClientMessage::Generate(request))) => match request.prompt_id() {
                    Ok(prompt_id) => break (prompt_id, request),
                    Err(e) => {
                        debug!(error = %e, "Rejected generate request");
                        if !emit(outbound, ServerEvent::error(e.to_string())).await {
                            return SessionState::Idle;
                        }
                    }
                },
            }
        };

        debug!(prompt_id = %prompt_id, state = SessionState::AwaitingPrompt.as_str(), "Generation requested");

        match self.generate(user_id, prompt_id, &request, inbound, outbound).await {
            Ok(state) => state,
            Err(e) => {
                warn!(prompt_id = %prompt_id, error = %e, "Generation failed");
                emit(outbound, ServerEvent::error(e.to_string())).await;
                SessionState::Failed
            }
        }
    }

    async fn generate<S>(
        &self,
        user_id: Uuid,
        prompt_id: Uuid,
        request: &GenerateRequest,
        inbound: &mut Pin<Box<S>>,
        outbound: &mpsc::Sender<ServerEvent>,
    ) -> Result<SessionState>
    where
        S: Stream<Item = ClientMessage> + Send,
    {
        let context = self.store.load_generation_context(user_id, prompt_id).await?;
        if !emit(outbound, ServerEvent::progress(5, "Preparing prompt")).await {
            return Ok(SessionState::Cancelled);
        }

        let style = request.style();
        let completion = self.synthesizer.generation_request(&context, style, request.model.as_deref());
        let mut metadata = serde_json::json!({
            "model": completion.model,
            "style": style.as_str(),
            "temperature": completion.temperature,
        });

        let anchor = self.sink.anchor_content(user_id, prompt_id, metadata.clone()).await?;
        let mut tokens = self.model.stream(&completion).await?;

        info!(
            prompt_id = %prompt_id,
            content_id = %anchor.id,
            model = %completion.model,
            style = style.as_str(),
            state = SessionState::Streaming.as_str(),
            "Streaming content"
        );
        if !emit(outbound, ServerEvent::progress(STREAM_OPEN_PROGRESS, "Generating content")).await {
            return Ok(SessionState::Cancelled);
        }

        let idle = self.settings.idle_timeout();
        let interval = self.settings.quality_check_interval.max(1);
        let expected_chars = (completion.max_tokens as usize).saturating_mul(CHARS_PER_TOKEN);

        let mut text = String::new();
        let mut updates: u32 = 0;
        let mut progress = STREAM_OPEN_PROGRESS;
        let mut quality: JoinSet<Result<QualityIndicators>> = JoinSet::new();
        let mut last_quality: Option<QualityIndicators> = None;

        loop {
            tokio::select! {
                message = inbound.next() => match message {
                    Some(ClientMessage::Cancel) => {
                        info!(prompt_id = %prompt_id, chars = text.len(), "Generation cancelled by client");
                        emit(outbound, ServerEvent::info("Generation cancelled")).await;
                        return Ok(SessionState::Cancelled);
                    }
                    Some(ClientMessage::Generate(_)) => {
                        if !emit(outbound, ServerEvent::info("A generation is already in progress")).await {
                            return Ok(SessionState::Cancelled);
                        }
                    }
                    None => {
                        info!(prompt_id = %prompt_id, "Client disconnected during generation");
                        return Ok(SessionState::Cancelled);
                    }
                },

                Some(joined) = quality.join_next() => match joined {
                    Ok(Ok(indicators)) => {
                        last_quality = Some(indicators.clone());
                        if !emit(outbound, ServerEvent::Quality { indicators }).await {
                            return Ok(SessionState::Cancelled);
                        }
                    }
                    Ok(Err(e)) => warn!(error = %e, "Quality check failed"),
                    Err(e) => warn!(error = %e, "Quality check task did not finish"),
                },

                next = timeout(idle, tokens.next()) => match next {
                    Err(_) => {
                        return Err(AppError::Upstream {
                            status: None,
                            message: format!("No output from the model for {} seconds", idle.as_secs()),
                        });
                    }
                    Ok(Some(Err(e))) => return Err(e),
                    Ok(None) => break,
                    Ok(Some(Ok(chunk))) => {
                        text.push_str(&chunk);
                        updates += 1;
                        progress = progress.max(estimate_progress(text.len(), expected_chars));
                        metrics::record_chunk_relayed();

                        let event = ServerEvent::Content {
                            progress,
                            message: "Generating content".to_string(),
                            content: text.clone(),
                            is_final: None,
                            content_id: None,
                        };
                        if !emit(outbound, event).await {
                            return Ok(SessionState::Cancelled);
                        }

                        if updates % interval == 0 && quality.is_empty() {
                            let sample = char_prefix(&text, self.settings.quality_prefix_chars).to_string();
                            let assessor = Arc::clone(&self.assessor);
                            debug!(updates, chars = sample.len(), "Dispatching quality check");
                            quality.spawn(async move { assessor.assess(&sample).await });
                        }
                    }
                },
            }
        }

        // Results still pending are of no use once the text is final
        quality.abort_all();

        if text.trim().is_empty() {
            return Err(AppError::MalformedResponse {
                message: "The model returned no content".to_string(),
            });
        }

        if let Some(indicators) = last_quality {
            metadata["quality"] = serde_json::to_value(indicators)?;
        }
        let item = self.sink.persist_content(user_id, prompt_id, text.clone(), metadata).await?;

        emit(
            outbound,
            ServerEvent::Content {
                progress: 100,
                message: "Generation complete".to_string(),
                content: text,
                is_final: Some(true),
                content_id: Some(item.id),
            },
        )
        .await;

        info!(prompt_id = %prompt_id, content_id = %item.id, updates, "Generation completed");
        Ok(SessionState::Completed)
    }
}

/// Send an event; `false` once the receiving side is gone
async fn emit(outbound: &mpsc::Sender<ServerEvent>, event: ServerEvent) -> bool {
    outbound.send(event).await.is_ok()
}

/// Map accumulated length onto the streaming progress band
fn estimate_progress(chars: usize, expected_chars: usize) -> u8 {
    let ratio = chars as f64 / expected_chars.max(1) as f64;
    let span = f64::from(MAX_STREAMING_PROGRESS - STREAM_OPEN_PROGRESS);
    let estimate = f64::from(STREAM_OPEN_PROGRESS) + ratio.min(1.0) * span;
    (estimate.floor() as u8).min(MAX_STREAMING_PROGRESS)
}
