//! vtalk: streaming conversation backend for animated character clients.
//!
//! A client sends a line of text over a WebSocket and receives the reply as
//! an ordered stream of JSON events: `start`, text `chunk`s, optional
//! synthesized `audio`, exactly one `emotion` label, and `end`.
//!
//! # Architecture
//!
//! - **Conversation**: bounded per-connection memory of user/assistant turns
//! - **Prompt**: persona, style rules and history rendered into one prompt
//! - **LLM**: streaming text generation over Ollama's NDJSON API
//! - **Pipeline**: text cleaning, tag stripping and the turn state machine
//! - **Emotion**: one label per reply, classified after the text completes
//! - **TTS**: optional speech synthesis over HTTP
//! - **Server**: axum WebSocket endpoint, one session per connection

pub mod config;
pub mod conversation;
pub mod emotion;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod protocol;
pub mod server;
pub mod session;
pub mod tts;

pub use config::AppConfig;
pub use error::{ChatError, Result};
pub use pipeline::{TurnEvent, TurnOutcome, TurnSequencer};
pub use server::ChatServer;
pub use session::Session;
