//! Prompt assembly.
//!
//! The system prompt is assembled from up to three layers, joined by
//! newlines and skipping empty ones:
//!
//! 1. **Persona**: the configured character text.
//! 2. **Emotion tag rule**: only when emotions are read from an inline tag.
//! 3. **Style directive** ([`STYLE_DIRECTIVE`]): always present.
//!
//! The final prompt appends the rendered history and the new user line,
//! ending on an `Assistant:` cue. Every function here is pure: the same
//! configuration, history and input always produce the same string.

use crate::config::{AppConfig, EmotionSource};
use crate::conversation::Turn;

/// Output rules applied to every reply.
pub const STYLE_DIRECTIVE: &str = "\
Write only in plain English. \
Never use emojis, emoticons or decorative symbols. \
Keep responses very concise and directly answer the question. \
Do not introduce yourself or state your persona explicitly on simple messages \
(unless asked directly); keep the personality implicit and subtle, \
surfacing naturally only when appropriate.";

/// Builds generation and classification prompts from configuration.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    persona: String,
    emotions: Vec<String>,
    inline_tags: bool,
}

impl PromptComposer {
    pub fn new(persona: impl Into<String>, emotions: Vec<String>, source: EmotionSource) -> Self {
        Self {
            persona: persona.into(),
            emotions,
            inline_tags: source == EmotionSource::InlineTag,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.persona.prompt.clone(),
            config.emotions.allowed.clone(),
            config.emotions.source,
        )
    }

    /// Persona, optional emotion-tag rule, then the style directive.
    pub fn build_system_prompt(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(3);
        let persona = self.persona.trim();
        if !persona.is_empty() {
            parts.push(persona.to_owned());
        }
        if self.inline_tags && !self.emotions.is_empty() {
            parts.push(format!(
                "In your response, always start with a single emotion tag in square brackets, \
                 exactly one of these: [{}]. Pick the most relevant emotion for your answer. \
                 Never use any other emotion names and do not invent new ones.",
                self.emotions.join(", ")
            ));
        }
        parts.push(STYLE_DIRECTIVE.to_owned());
        parts.join("\n")
    }

    /// System prompt, history block, new user line and the `Assistant:` cue.
    pub fn build_final_prompt(&self, user_text: &str, history: &[Turn]) -> String {
        let mut prompt = self.build_system_prompt();
        prompt.push_str("\n\n");
        for turn in history {
            prompt.push_str(turn.role().speaker());
            prompt.push_str(": ");
            prompt.push_str(turn.content());
            prompt.push('\n');
        }
        prompt.push_str("User: ");
        prompt.push_str(user_text);
        prompt.push_str("\nAssistant:");
        prompt
    }

    /// Instruction asking for exactly one allowed label for a finished exchange.
    pub fn build_classification_prompt(&self, user_text: &str, reply: &str) -> String {
        format!(
            "Classify the emotion the assistant expresses in the reply below.\n\
             Answer with exactly one word from this list: {}.\n\
             Do not explain and do not use any other word.\n\n\
             User: {user_text}\n\
             Assistant: {reply}\n\
             Emotion:",
            self.emotions.join(", ")
        )
    }
}
