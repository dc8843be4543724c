//! Text-to-speech synthesis.
//!
//! Synthesis is optional: when no `[tts]` section is configured the turn
//! pipeline skips it entirely. [`HttpSynthesizer`] talks to any server that
//! accepts an OpenAI-style speech request (Kokoro-FastAPI and friends) and
//! returns encoded audio in the response body.

mod http;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::AudioFormat;
use crate::error::Result;

pub use http::HttpSynthesizer;

/// Encoded audio for one reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    /// Container of `bytes`.
    pub format: AudioFormat,
    /// Encoded audio as returned by the backend.
    pub bytes: Bytes,
}

/// A speech synthesis backend.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` into a single encoded clip.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Tts`](crate::error::ChatError::Tts) on network
    /// failure, timeout, non-2xx status, or an empty body.
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio>;
}
