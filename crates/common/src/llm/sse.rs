//! Server-sent-event decoding for streaming completions
//!
//! The provider sends `data:` lines carrying JSON frames. Text arrives in
//! `delta.text`; the stream ends with a `[DONE]` sentinel or a
//! `message_stop` frame. Everything else (`event:` lines, pings, comments)
//! is skipped.

use crate::errors::{AppError, Result};
use crate::llm::TokenStream;
use futures::{Stream, StreamExt};
use std::collections::VecDeque;

/// A decoded `data:` payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    Text(String),
    Done,
}

/// Incremental line decoder; chunks may split lines and UTF-8 sequences
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed raw bytes, returning every frame completed by them
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<SseFrame>> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(frame) = decode_line(&String::from_utf8_lossy(&line)) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Decode whatever is left once the byte stream ends
    pub fn finish(&mut self) -> Vec<Result<SseFrame>> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&String::from_utf8_lossy(&rest)).into_iter().collect()
    }
}

fn decode_line(line: &str) -> Option<Result<SseFrame>> {
    let payload = line.trim_end_matches(['\r', '\n']).strip_prefix("data:")?.trim();

    if payload.is_empty() {
        return None;
    }
    if payload == "[DONE]" {
        return Some(Ok(SseFrame::Done));
    }

    let value: serde_json::Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(e) => {
            return Some(Err(AppError::MalformedResponse {
                message: format!("Invalid stream frame: {}", e),
            }))
        }
    };

    match value.get("type").and_then(|t| t.as_str()) {
        Some("message_stop") => return Some(Ok(SseFrame::Done)),
        Some("error") => {
            let message = value
                .pointer("/error/message")
                .and_then(|m| m.as_str())
                .unwrap_or("stream error")
                .to_string();
            return Some(Err(AppError::Upstream { status: None, message }));
        }
        _ => {}
    }

    value
        .pointer("/delta/text")
        .and_then(|t| t.as_str())
        .filter(|t| !t.is_empty())
        .map(|t| Ok(SseFrame::Text(t.to_string())))
}

struct DecodeState<S> {
    bytes: std::pin::Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String>>,
    finished: bool,
}

impl<S> DecodeState<S> {
    /// Queue frames, stopping at the first terminal one
    fn enqueue(&mut self, frames: Vec<Result<SseFrame>>) {
        for frame in frames {
            if self.finished {
                break;
            }
            match frame {
                Ok(SseFrame::Text(text)) => self.pending.push_back(Ok(text)),
                Ok(SseFrame::Done) => self.finished = true,
                Err(e) => {
                    self.pending.push_back(Err(e));
                    self.finished = true;
                }
            }
        }
    }
}

/// Turn a raw SSE byte stream into a stream of text chunks
///
/// The returned stream yields at most one error, after which it ends.
pub fn token_stream<S, B, E>(bytes: S) -> TokenStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<AppError> + Send + 'static,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let frames = state.decoder.push(chunk.as_ref());
                    state.enqueue(frames);
                }
                Some(Err(e)) => {
                    state.pending.push_back(Err(e.into()));
                    state.finished = true;
                }
                None => {
                    let frames = state.decoder.finish();
                    state.enqueue(frames);
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}
