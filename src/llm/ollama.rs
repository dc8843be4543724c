//! Ollama generation transport.
//!
//! Speaks `POST /api/generate` with `stream: true`. The response body is a
//! sequence of newline-delimited JSON objects:
//!
//! ```text
//! {"model":"qwen2.5","response":"Hi","done":false}
//! {"model":"qwen2.5","response":" there","done":false}
//! {"model":"qwen2.5","response":"","done":true}
//! ```
//!
//! An object with an `error` field is a terminal failure. A body that ends
//! before the `done: true` object is reported as a truncated stream.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::ndjson::NdjsonLineParser;
use super::{FragmentStream, TextGenerator};
use crate::config::LlmConfig;
use crate::error::{ChatError, Result};

/// Request body for `/api/generate`.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

/// One NDJSON object from the response body.
#[derive(Debug, Default, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Streaming client for an Ollama server.
pub struct OllamaTransport {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl fmt::Debug for OllamaTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OllamaTransport")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl OllamaTransport {
    /// Create a transport for `base_url` (e.g. `http://127.0.0.1:11434`).
    ///
    /// The client has no request timeout: a generation stream may run for as
    /// long as the backend keeps producing, bounded only by the caller
    /// dropping it.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            model: model.into(),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(config.api_url.clone(), config.model.clone())
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    /// Map an HTTP error status to a transport error.
    fn map_http_error(status: reqwest::StatusCode, body: &str) -> ChatError {
        let message = extract_error_message(body);
        ChatError::Transport(format!("ollama HTTP {}: {message}", status.as_u16()))
    }
}

/// Extract `error` from an Ollama error body, or fall back to the raw body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| body.trim().to_owned())
}

/// Decode one line. Malformed lines yield `Ok(None)` and are skipped.
fn parse_line(line: &str) -> Result<Option<GenerateChunk>> {
    match serde_json::from_str::<GenerateChunk>(line) {
        Ok(chunk) => match chunk.error {
            Some(message) => Err(ChatError::Stream(message)),
            None => Ok(Some(chunk)),
        },
        Err(e) => {
            warn!(error = %e, line, "skipping malformed generation line");
            Ok(None)
        }
    }
}

#[async_trait]
impl TextGenerator for OllamaTransport {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn stream(&self, prompt: &str) -> Result<FragmentStream> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: true,
        };
        debug!(
            model = %self.model,
            prompt_chars = prompt.chars().count(),
            "opening generation stream"
        );
        trace!(prompt, "generation request");

        let response = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Transport(format!("ollama request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(status, &body_text));
        }

        Ok(Box::pin(fragment_stream(response.bytes_stream())))
    }
}

/// Turn a response byte stream into text fragments.
fn fragment_stream(
    byte_stream: impl Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = Result<String>> + Send {
    async_stream::stream! {
        let mut byte_stream = Box::pin(byte_stream);
        let mut parser = NdjsonLineParser::new();
        let mut output_chars = 0usize;

        loop {
            let (lines, ended) = match byte_stream.next().await {
                Some(Ok(chunk)) => (parser.push(&chunk), false),
                Some(Err(e)) => {
                    yield Err(ChatError::Stream(format!("stream read error: {e}")));
                    return;
                }
                None => (parser.flush().into_iter().collect::<Vec<_>>(), true),
            };

            for line in lines {
                match parse_line(&line) {
                    Ok(Some(chunk)) => {
                        if !chunk.response.is_empty() {
                            output_chars += chunk.response.chars().count();
                            yield Ok(chunk.response);
                        }
                        if chunk.done {
                            debug!(output_chars, "generation stream complete");
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }

            if ended {
                yield Err(ChatError::Stream(
                    "generation stream ended before completion".into(),
                ));
                return;
            }
        }
    }
}
