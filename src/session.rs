//! Per-connection conversation state.
//!
//! A [`Session`] owns the memory for one client and allows at most one
//! turn in flight. Starting a turn builds the prompt from the current memory
//! and hands back a future that the connection drives; the result is fed
//! back through [`Session::finish_turn`], which commits completed turns and
//! discards everything else.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::conversation::{ConversationMemory, Turn};
use crate::error::{ChatError, Result};
use crate::pipeline::{TurnEvent, TurnOutcome, TurnSequencer};
use crate::prompt::PromptComposer;

/// A running turn. Dropping it cancels every request it has in flight.
pub type TurnFuture = Pin<Box<dyn Future<Output = TurnOutcome> + Send>>;

/// Conversation state for one connection.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    config: Arc<AppConfig>,
    sequencer: Arc<TurnSequencer>,
    composer: PromptComposer,
    memory: ConversationMemory,
    /// When the in-flight prompt arrived; `Some` while a turn is running.
    started_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(config: Arc<AppConfig>, sequencer: Arc<TurnSequencer>) -> Self {
        let id = Uuid::new_v4();
        info!(session = %id, "session opened");
        Self {
            id,
            composer: PromptComposer::from_config(&config),
            memory: ConversationMemory::from_config(&config.memory),
            config,
            sequencer,
            started_at: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_busy(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Validate `text` and start a turn for it.
    ///
    /// Memory is not touched until [`finish_turn`](Self::finish_turn).
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Protocol`] if the text is empty or a turn is
    /// already in flight.
    pub fn begin_turn(
        &mut self,
        text: &str,
        events: mpsc::Sender<TurnEvent>,
    ) -> Result<TurnFuture> {
        let user_text = text.trim();
        if user_text.is_empty() {
            return Err(ChatError::Protocol("Empty prompt".into()));
        }
        if self.is_busy() {
            return Err(ChatError::Protocol(
                "A reply is still in progress; wait for it to finish".into(),
            ));
        }

        let history = self
            .memory
            .render(self.config.memory.max_turns, self.config.memory.max_chars);
        let prompt = self.composer.build_final_prompt(user_text, &history);
        debug!(
            session = %self.id,
            history_turns = history.len(),
            prompt_chars = prompt.chars().count(),
            "starting turn"
        );

        self.started_at = Some(Utc::now());
        let sequencer = Arc::clone(&self.sequencer);
        let session = self.id;
        let user_text = user_text.to_owned();
        Ok(Box::pin(async move {
            sequencer.run(session, user_text, prompt, &events).await
        }))
    }

    /// Record the outcome of the turn started by [`begin_turn`](Self::begin_turn).
    pub fn finish_turn(&mut self, outcome: TurnOutcome) {
        let started_at = self.started_at.take();
        match outcome {
            TurnOutcome::Completed {
                user_text,
                reply,
                emotion,
            } => {
                let mut user = Turn::user(user_text);
                if let Some(at) = started_at {
                    user = user.with_created_at(at);
                }
                let reply = Turn::assistant(reply, emotion);
                let latency = reply.created_at() - user.created_at();
                self.memory.commit(user, reply);
                debug!(
                    session = %self.id,
                    latency_ms = latency.num_milliseconds(),
                    pairs = self.memory.pair_count(),
                    chars = self.memory.total_chars(),
                    "turn committed"
                );
            }
            TurnOutcome::Failed(_) | TurnOutcome::Cancelled => {
                debug!(session = %self.id, "turn discarded");
            }
        }
    }

    /// Run a whole turn to completion.
    ///
    /// A rejected prompt is reported as an `error` event and returned as
    /// [`TurnOutcome::Failed`] without touching memory.
    pub async fn run_turn(&mut self, text: &str, events: &mpsc::Sender<TurnEvent>) -> TurnOutcome {
        match self.begin_turn(text, events.clone()) {
            Ok(turn) => {
                let outcome = turn.await;
                self.finish_turn(outcome.clone());
                outcome
            }
            Err(e) => {
                let message = e.message();
                if events.send(TurnEvent::Error(message.clone())).await.is_err() {
                    return TurnOutcome::Cancelled;
                }
                TurnOutcome::Failed(message)
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        info!(session = %self.id, turns = self.memory.len(), "session closed");
    }
}
