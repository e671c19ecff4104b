//! Anthropic messages API client

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use crate::llm::{sse, CompletionRequest, LanguageModel, Message, TokenStream};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// HTTP client for `POST {api_base}/v1/messages`
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    api_version: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicClient {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        // No client-wide total timeout: it would also cover streamed bodies
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
            timeout: config.timeout(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.api_base)
    }

    async fn send(&self, request: &CompletionRequest, stream: bool) -> Result<reqwest::Response> {
        let body = MessagesRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: request.system.as_deref(),
            messages: &request.messages,
            stream,
        };

        let pending = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .header("content-type", "application/json")
            .json(&body);

        let response = if stream {
            // Only the wait for headers is bounded; gaps between chunks are the session's concern
            tokio::time::timeout(self.timeout, pending.send())
                .await
                .map_err(|_| AppError::Upstream {
                    status: None,
                    message: format!("No response within {}s", self.timeout.as_secs()),
                })??
        } else {
            pending.timeout(self.timeout).send().await?
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                status: Some(status.as_u16()),
                message: body,
            });
        }

        Ok(response)
    }

    async fn complete_once(&self, request: &CompletionRequest) -> Result<String> {
        let response = self.send(request, false).await?;

        let parsed: MessagesResponse = response.json().await.map_err(|e| AppError::MalformedResponse {
            message: format!("Failed to parse completion: {}", e),
        })?;

        parsed
            .content
            .into_iter()
            .next()
            .and_then(|block| block.text)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| AppError::MalformedResponse {
                message: "Empty completion".to_string(),
            })
    }
}

#[async_trait]
impl LanguageModel for AnthropicClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let start = Instant::now();
        let result = self.complete_once(request).await;

        metrics::record_llm_request(
            &request.model,
            "complete",
            start.elapsed().as_secs_f64(),
            result.is_ok(),
        );

        result
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<TokenStream> {
        let start = Instant::now();
        let result = self.send(request, true).await;

        metrics::record_llm_request(
            &request.model,
            "stream",
            start.elapsed().as_secs_f64(),
            result.is_ok(),
        );

        Ok(sse::token_stream(result?.bytes_stream()))
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> AnthropicClient {
        let config = LlmConfig {
            api_base: server.uri(),
            ..Default::default()
        };
        AnthropicClient::new(&config, "test-key".to_string()).unwrap()
    }

    #[tokio::test]
    async fn test_complete_reads_first_block() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({ "model": "m", "max_tokens": 100 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{ "type": "text", "text": "Plants make sugar." }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = CompletionRequest::new("m", "Explain photosynthesis").with_max_tokens(100);
        let text = client_for(&server).complete(&request).await.unwrap();
        assert_eq!(text, "Plants make sugar.");
    }

    #[tokio::test]
    async fn test_status_is_carried_on_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .complete(&CompletionRequest::new("m", "x"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Upstream { status: Some(400), .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_completion_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{ "type": "text", "text": "  " }]
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .complete(&CompletionRequest::new("m", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_stream_relays_deltas() {
        let server = MockServer::start().await;
        let body = [
            r#"event: message_start"#,
            r#"data: {"type":"message_start","message":{}}"#,
            "",
            r#"data: {"type":"content_block_delta","delta":{"type":"text_delta","text":"Light "}}"#,
            "",
            r#"data: {"type":"content_block_delta","delta":{"type":"text_delta","text":"energy"}}"#,
            "",
            r#"data: {"type":"message_stop"}"#,
            "",
        ]
        .join("\n");

        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({ "stream": true })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let stream = client_for(&server)
            .stream(&CompletionRequest::new("m", "x"))
            .await
            .unwrap();
        let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;

        assert_eq!(chunks, vec!["Light ", "energy"]);
    }

    /// Accepts one request and trickles SSE deltas with a pause before each
    async fn trickle_server(deltas: &'static [&'static str], pause: Duration) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
                        .and_then(|v| v.parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }

            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n")
                .await
                .unwrap();
            for delta in deltas {
                tokio::time::sleep(pause).await;
                let frame = format!(
                    "data: {{\"type\":\"content_block_delta\",\"delta\":{{\"type\":\"text_delta\",\"text\":\"{}\"}}}}\n\n",
                    delta
                );
                socket.write_all(frame.as_bytes()).await.unwrap();
            }
            socket.write_all(b"data: {\"type\":\"message_stop\"}\n\n").await.unwrap();
            let _ = socket.shutdown().await;
        });

        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_stream_outlives_request_timeout_while_active() {
        let api_base = trickle_server(&["Roots ", "take ", "up ", "water"], Duration::from_millis(400)).await;
        let config = LlmConfig {
            api_base,
            timeout_secs: 1,
            ..Default::default()
        };
        let client = AnthropicClient::new(&config, "test-key".to_string()).unwrap();

        let stream = client.stream(&CompletionRequest::new("m", "x")).await.unwrap();
        let chunks: Vec<Result<String>> = stream.collect().await;

        let errors: Vec<String> = chunks
            .iter()
            .filter_map(|c| c.as_ref().err().map(|e| e.to_string()))
            .collect();
        assert!(errors.is_empty(), "stream failed: {:?}", errors);
        let text: String = chunks.into_iter().filter_map(|c| c.ok()).collect();
        assert_eq!(text, "Roots take up water");
    }
}
