//! Text generation transport.
//!
//! [`TextGenerator`] is the seam between the turn pipeline and a remote
//! generative backend. A call to [`TextGenerator::stream`] opens exactly one
//! request and returns a finite, non-restartable [`FragmentStream`] of
//! incremental text. Failures while opening are returned directly; failures
//! after the backend accepted the request arrive as an `Err` item and end
//! the stream.

pub mod ndjson;
pub mod ollama;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};

use crate::error::Result;

pub use ollama::OllamaTransport;

/// A boxed stream of text fragments in arrival order.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A streaming text generation backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Backend name for logs (e.g. `"ollama"`).
    fn name(&self) -> &str;

    /// Open one streaming generation request.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Transport`](crate::error::ChatError::Transport)
    /// if the request cannot be opened.
    async fn stream(&self, prompt: &str) -> Result<FragmentStream>;

    /// Generate the full text for `prompt` by collecting [`stream`](Self::stream).
    ///
    /// # Errors
    ///
    /// Returns the first error raised while opening or reading the stream.
    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut stream = self.stream(prompt).await?;
        let mut text = String::new();
        while let Some(fragment) = stream.next().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::error::ChatError;

    struct Scripted(Vec<Result<String>>);

    #[async_trait]
    impl TextGenerator for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn stream(&self, _prompt: &str) -> Result<FragmentStream> {
            let items: Vec<Result<String>> = self
                .0
                .iter()
                .map(|r| match r {
                    Ok(s) => Ok(s.clone()),
                    Err(e) => Err(ChatError::Stream(e.message())),
                })
                .collect();
            Ok(Box::pin(futures_util::stream::iter(items)))
        }
    }

    #[tokio::test]
    async fn generate_concatenates_fragments() {
        let generator = Scripted(vec![Ok("Hi".into()), Ok(" there".into())]);
        assert_eq!(generator.generate("p").await.unwrap(), "Hi there");
    }

    #[tokio::test]
    async fn generate_propagates_stream_error() {
        let generator = Scripted(vec![
            Ok("Hi".into()),
            Err(ChatError::Stream("reset".into())),
        ]);
        let err = generator.generate("p").await.unwrap_err();
        assert!(matches!(err, ChatError::Stream(m) if m == "reset"));
    }
}
