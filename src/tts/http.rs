//! HTTP speech backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use super::{SpeechSynthesizer, SynthesizedAudio};
use crate::config::{AudioFormat, TtsConfig};
use crate::error::{ChatError, Result};

/// Request body for the speech endpoint.
#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
    lang_code: &'a str,
    response_format: &'static str,
}

/// Synthesizes speech with one POST per reply.
#[derive(Debug, Clone)]
pub struct HttpSynthesizer {
    client: reqwest::Client,
    config: TtsConfig,
}

impl HttpSynthesizer {
    /// Create a synthesizer for `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: TtsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChatError::Tts(format!("cannot build HTTP client: {e}")))?;
        info!(url = %config.url, voice = %config.voice, format = config.format.as_str(), "speech synthesis enabled");
        Ok(Self { client, config })
    }

    pub fn format(&self) -> AudioFormat {
        self.config.format
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio> {
        let body = SpeechRequest {
            model: &self.config.model,
            input: text,
            voice: &self.config.voice,
            speed: self.config.speed,
            lang_code: &self.config.lang_code,
            response_format: self.config.format.as_str(),
        };
        debug!(chars = text.chars().count(), "requesting speech");

        let response = self
            .client
            .post(&self.config.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Tts(format!("speech request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ChatError::Tts(format!(
                "speech backend HTTP {}: {}",
                status.as_u16(),
                detail.trim()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ChatError::Tts(format!("cannot read speech body: {e}")))?;
        if bytes.is_empty() {
            return Err(ChatError::Tts("speech backend returned no audio".into()));
        }

        debug!(bytes = bytes.len(), "speech ready");
        Ok(SynthesizedAudio {
            format: self.config.format,
            bytes,
        })
    }
}
