//! Drives one conversational turn from prompt to final event.
//!
//! ```text
//! Idle -> AwaitingGeneration -> StreamingText -> ClassifyingEmotion
//!      -> [SynthesizingAudio] -> Delivering -> Complete
//! ```
//!
//! `Errored` is reachable from every in-flight state. The sequencer is the
//! only producer of [`TurnEvent`]s and fixes their order:
//!
//! | mode          | events                                              |
//! |---------------|-----------------------------------------------------|
//! | incremental   | `start`, `chunk`*, `audio`?, `emotion`, `end`       |
//! | synchronized  | `start`, `audio`?, `chunk`?, `emotion`, `end`       |
//!
//! A failure replaces the rest of the sequence with a single `error`. If the
//! event receiver goes away the turn stops as [`TurnOutcome::Cancelled`].
//! The sequencer holds no per-session state: committing a completed turn is
//! the caller's job.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::cleaner::TextCleaner;
use super::messages::TurnEvent;
use super::text_stream::{TextItem, TextStreamOrchestrator};
use crate::config::{AppConfig, DeliveryMode, EmotionSource, LlmBackend};
use crate::emotion::EmotionClassifier;
use crate::error::{ChatError, Result};
use crate::llm::{OllamaTransport, TextGenerator};
use crate::tts::{HttpSynthesizer, SpeechSynthesizer};

/// Lifecycle of a single turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingGeneration,
    StreamingText,
    ClassifyingEmotion,
    SynthesizingAudio,
    Delivering,
    Complete,
    Errored,
}

impl TurnState {
    /// Whether moving from `self` to `next` is a legal step.
    pub fn can_transition_to(self, next: TurnState) -> bool {
        use TurnState::*;
        matches!(
            (self, next),
            (Idle, AwaitingGeneration)
                | (AwaitingGeneration, StreamingText)
                | (StreamingText, ClassifyingEmotion)
                | (ClassifyingEmotion, SynthesizingAudio)
                | (ClassifyingEmotion, Delivering)
                | (SynthesizingAudio, Delivering)
                | (Delivering, Complete)
                | (
                    AwaitingGeneration
                        | StreamingText
                        | ClassifyingEmotion
                        | SynthesizingAudio
                        | Delivering,
                    Errored
                )
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Errored)
    }
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// All events were delivered; the exchange should be committed.
    Completed {
        user_text: String,
        reply: String,
        emotion: String,
    },
    /// An `error` event was sent; nothing should be committed.
    Failed(String),
    /// The event receiver was dropped mid-turn.
    Cancelled,
}

/// Receiver is gone; the turn must stop.
struct Disconnected;

/// Tracks and logs state transitions for one turn.
struct TurnTracker {
    session: Uuid,
    state: TurnState,
}

impl TurnTracker {
    fn new(session: Uuid) -> Self {
        Self {
            session,
            state: TurnState::Idle,
        }
    }

    fn advance(&mut self, next: TurnState) {
        if !self.state.can_transition_to(next) {
            error!(session = %self.session, from = ?self.state, to = ?next, "illegal turn transition");
            return;
        }
        debug!(session = %self.session, from = ?self.state, to = ?next, "turn transition");
        self.state = next;
    }
}

/// Shared, stateless turn driver.
pub struct TurnSequencer {
    generator: Arc<dyn TextGenerator>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    classifier: EmotionClassifier,
    orchestrator: TextStreamOrchestrator,
    source: EmotionSource,
    mode: DeliveryMode,
}

impl std::fmt::Debug for TurnSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnSequencer")
            .field("generator", &self.generator.name())
            .field("synthesizer", &self.synthesizer.is_some())
            .field("classifier", &self.classifier)
            .field("source", &self.source)
            .field("mode", &self.mode)
            .finish()
    }
}

impl TurnSequencer {
    /// Assemble a sequencer from explicit backends.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
        config: &AppConfig,
    ) -> Self {
        let source = config.emotions.source;
        let tag_labels = match source {
            EmotionSource::InlineTag => config.emotions.allowed.clone(),
            EmotionSource::Classifier => Vec::new(),
        };
        Self {
            classifier: EmotionClassifier::from_config(Arc::clone(&generator), config),
            generator,
            synthesizer,
            orchestrator: TextStreamOrchestrator::new(
                TextCleaner::new(config.delivery.strip_non_ascii),
                tag_labels,
            ),
            source,
            mode: config.delivery.mode,
        }
    }

    /// Build the configured backends.
    ///
    /// # Errors
    ///
    /// Returns an error if the speech client cannot be created.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let generator: Arc<dyn TextGenerator> = match config.llm.backend {
            LlmBackend::Ollama => Arc::new(OllamaTransport::from_config(&config.llm)),
        };
        let synthesizer = match &config.tts {
            Some(tts) => Some(Arc::new(HttpSynthesizer::new(tts.clone())?) as Arc<dyn SpeechSynthesizer>),
            None => None,
        };
        info!(
            backend = generator.name(),
            model = %config.llm.model,
            tts = synthesizer.is_some(),
            mode = ?config.delivery.mode,
            emotions = ?config.emotions.source,
            "turn pipeline ready"
        );
        Ok(Self::new(generator, synthesizer, config))
    }

    /// Run one turn, writing events to `events`.
    pub async fn run(
        &self,
        session: Uuid,
        user_text: String,
        prompt: String,
        events: &mpsc::Sender<TurnEvent>,
    ) -> TurnOutcome {
        let mut turn = TurnTracker::new(session);
        match self.drive(&mut turn, &user_text, &prompt, events).await {
            Ok(Ok((reply, emotion))) => {
                turn.advance(TurnState::Complete);
                info!(
                    session = %session,
                    reply_chars = reply.chars().count(),
                    emotion = %emotion,
                    "turn complete"
                );
                TurnOutcome::Completed {
                    user_text,
                    reply,
                    emotion,
                }
            }
            Ok(Err(e)) => {
                turn.advance(TurnState::Errored);
                warn!(session = %session, code = e.code(), error = %e, "turn failed");
                let message = e.message();
                if events.send(TurnEvent::Error(message.clone())).await.is_err() {
                    return TurnOutcome::Cancelled;
                }
                TurnOutcome::Failed(message)
            }
            Err(Disconnected) => {
                debug!(session = %session, state = ?turn.state, "client gone, turn cancelled");
                TurnOutcome::Cancelled
            }
        }
    }

    /// The happy path. The outer result is disconnection, the inner one failure.
    async fn drive(
        &self,
        turn: &mut TurnTracker,
        user_text: &str,
        prompt: &str,
        events: &mpsc::Sender<TurnEvent>,
    ) -> std::result::Result<Result<(String, String)>, Disconnected> {
        let send = |event: TurnEvent| async move {
            events.send(event).await.map_err(|_| Disconnected)
        };

        turn.advance(TurnState::AwaitingGeneration);
        let fragments = match self.generator.stream(prompt).await {
            Ok(fragments) => fragments,
            Err(e) => return Ok(Err(e)),
        };

        turn.advance(TurnState::StreamingText);
        send(TurnEvent::Start).await?;

        let mut items = self.orchestrator.run(fragments);
        let mut completed = None;
        while let Some(item) = items.next().await {
            match item {
                Ok(TextItem::Chunk(text)) => {
                    if self.mode == DeliveryMode::Incremental {
                        send(TurnEvent::Chunk(text)).await?;
                    }
                }
                Ok(TextItem::Complete { text, tag }) => completed = Some((text, tag)),
                Err(e) => return Ok(Err(e)),
            }
        }
        let Some((reply, tag)) = completed else {
            return Ok(Err(ChatError::Stream(
                "text stream ended without completing".into(),
            )));
        };

        turn.advance(TurnState::ClassifyingEmotion);
        let emotion = match self.source {
            EmotionSource::Classifier => self.classifier.classify(user_text, &reply).await,
            EmotionSource::InlineTag => self.classifier.resolve_tag(tag.as_deref()),
        };

        let mut audio = None;
        let speech_text = reply.trim();
        if let Some(synthesizer) = &self.synthesizer
            && !speech_text.is_empty()
        {
            turn.advance(TurnState::SynthesizingAudio);
            match synthesizer.synthesize(speech_text).await {
                Ok(clip) => audio = Some(clip),
                Err(e) => warn!(session = %turn.session, error = %e, "speech synthesis failed, sending text only"),
            }
        }

        turn.advance(TurnState::Delivering);
        if let Some(clip) = audio {
            send(TurnEvent::Audio(clip)).await?;
        }
        if self.mode == DeliveryMode::Synchronized && !reply.is_empty() {
            send(TurnEvent::Chunk(reply.clone())).await?;
        }
        send(TurnEvent::Emotion(emotion.clone())).await?;
        send(TurnEvent::End).await?;

        Ok(Ok((reply, emotion)))
    }
}
