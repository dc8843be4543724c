//! Emotion classification for completed replies.
//!
//! Every turn delivers exactly one label drawn from the configured set.
//! Two sources are supported:
//!
//! 1. **Classifier**: one extra generation call after the reply is known,
//!    asking the model to answer with a single allowed label.
//! 2. **Inline tag**: the model opened its reply with `[Label]`; the tag was
//!    stripped while streaming and is resolved here without another call.
//!
//! Both fall back to the default label. A failed or slow classification
//! never fails the turn.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{AppConfig, EmotionConfig};
use crate::error::{ChatError, Result};
use crate::llm::TextGenerator;
use crate::prompt::PromptComposer;

/// Picks one allowed label for a finished exchange.
pub struct EmotionClassifier {
    generator: Arc<dyn TextGenerator>,
    composer: PromptComposer,
    /// Normalized labels with the default already resolved.
    emotions: EmotionConfig,
    timeout: Duration,
}

impl std::fmt::Debug for EmotionClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmotionClassifier")
            .field("generator", &self.generator.name())
            .field("allowed", &self.emotions.allowed)
            .field("default", &self.emotions.default)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl EmotionClassifier {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        composer: PromptComposer,
        mut emotions: EmotionConfig,
        timeout: Duration,
    ) -> Self {
        emotions.normalize();
        Self {
            generator,
            composer,
            emotions,
            timeout,
        }
    }

    pub fn from_config(generator: Arc<dyn TextGenerator>, config: &AppConfig) -> Self {
        Self::new(
            generator,
            PromptComposer::from_config(config),
            config.emotions.clone(),
            Duration::from_secs(config.llm.classify_timeout_secs),
        )
    }

    /// Classify a reply, falling back to the default label on any failure.
    ///
    /// No call is made when the allowed set is empty.
    pub async fn classify(&self, user_text: &str, reply: &str) -> String {
        if self.emotions.allowed.is_empty() {
            return self.emotions.default.clone();
        }
        match self.try_classify(user_text, reply).await {
            Ok(label) => label,
            Err(e) => {
                warn!(error = %e, default = %self.emotions.default, "emotion classification failed, using default");
                self.emotions.default.clone()
            }
        }
    }

    /// Classify a reply, surfacing every failure.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Classification`] on timeout or when the response
    /// names no allowed label, or the generator's own error.
    pub async fn try_classify(&self, user_text: &str, reply: &str) -> Result<String> {
        let prompt = self.composer.build_classification_prompt(user_text, reply);
        let response = tokio::time::timeout(self.timeout, self.generator.generate(&prompt))
            .await
            .map_err(|_| {
                ChatError::Classification(format!(
                    "timed out after {}ms",
                    self.timeout.as_millis()
                ))
            })??;

        debug!(response = %response.trim(), "classifier response");
        match_label(&response, &self.emotions.allowed).ok_or_else(|| {
            ChatError::Classification(format!(
                "no allowed label in response: {:?}",
                response.trim()
            ))
        })
    }

    /// Resolve an inline tag: the tag if it is allowed, otherwise the default.
    pub fn resolve_tag(&self, tag: Option<&str>) -> String {
        match tag {
            Some(tag) if self.emotions.is_allowed(tag) => tag.to_owned(),
            _ => self.emotions.default.clone(),
        }
    }
}

/// Find the allowed label a classifier response names.
///
/// Matching is case-insensitive on whole words. The earliest match wins;
/// when two labels match at the same position the longer one wins. The
/// label is returned in its configured spelling.
pub fn match_label(response: &str, allowed: &[String]) -> Option<String> {
    let haystack = response.to_lowercase();
    let mut best: Option<(usize, usize, &String)> = None;

    for label in allowed {
        let needle = label.to_lowercase();
        if needle.is_empty() {
            continue;
        }
        let Some(pos) = find_word(&haystack, &needle) else {
            continue;
        };
        let better = match best {
            None => true,
            Some((best_pos, best_len, _)) => {
                pos < best_pos || (pos == best_pos && needle.len() > best_len)
            }
        };
        if better {
            best = Some((pos, needle.len(), label));
        }
    }

    best.map(|(_, _, label)| label.clone())
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// Byte offset of the first whole-word occurrence of `needle`.
fn find_word(haystack: &str, needle: &str) -> Option<usize> {
    let mut start = 0;
    while let Some(offset) = haystack[start..].find(needle) {
        let pos = start + offset;
        let end = pos + needle.len();
        let before_ok = haystack[..pos]
            .chars()
            .next_back()
            .is_none_or(|c| !is_word_char(c));
        let after_ok = haystack[end..].chars().next().is_none_or(|c| !is_word_char(c));
        if before_ok && after_ok {
            return Some(pos);
        }
        start = pos + needle.chars().next().map_or(1, char::len_utf8);
    }
    None
}
