//! JSON wire format for the chat socket.
//!
//! Outbound, every [`TurnEvent`] becomes one text frame:
//!
//! ```text
//! {"type":"start"}
//! {"type":"chunk","data":"Hi there"}
//! {"type":"audio","format":"mp3","data":"<base64>"}
//! {"type":"emotion","emotion":"Happy"}
//! {"type":"end"}
//! {"type":"error","message":"..."}
//! ```
//!
//! Inbound, a text frame is either plain text, a JSON string, or an object
//! with a string `prompt` (or `message`) field.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::config::AudioFormat;
use crate::error::{ChatError, Result};
use crate::pipeline::TurnEvent;

/// An outbound event as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Start,
    Audio { format: AudioFormat, data: String },
    Chunk { data: String },
    Emotion { emotion: String },
    End,
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Encode as a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Protocol`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| ChatError::Protocol(format!("cannot encode event: {e}")))
    }
}

impl From<TurnEvent> for ServerMessage {
    fn from(event: TurnEvent) -> Self {
        match event {
            TurnEvent::Start => Self::Start,
            TurnEvent::Chunk(data) => Self::Chunk { data },
            TurnEvent::Audio(audio) => Self::Audio {
                format: audio.format,
                data: BASE64.encode(&audio.bytes),
            },
            TurnEvent::Emotion(emotion) => Self::Emotion { emotion },
            TurnEvent::End => Self::End,
            TurnEvent::Error(message) => Self::Error { message },
        }
    }
}

/// Accepted JSON shapes for an inbound prompt.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Inbound {
    Text(String),
    Prompt { prompt: String },
    Message { message: String },
}

/// Extract the prompt text from an inbound text frame.
///
/// # Errors
///
/// Returns [`ChatError::Protocol`] for unsupported JSON shapes and for
/// prompts that are empty after trimming.
pub fn parse_inbound(frame: &str) -> Result<String> {
    let text = match serde_json::from_str::<serde_json::Value>(frame) {
        Err(_) => frame.to_owned(),
        Ok(value) => {
            // Untagged struct variants would also accept arrays.
            let inbound = match value {
                serde_json::Value::String(_) | serde_json::Value::Object(_) => {
                    serde_json::from_value::<Inbound>(value).ok()
                }
                _ => None,
            };
            match inbound {
                Some(Inbound::Text(text))
                | Some(Inbound::Prompt { prompt: text })
                | Some(Inbound::Message { message: text }) => text,
                None => {
                    return Err(ChatError::Protocol(
                        "Expected plain text or {\"prompt\": \"...\"}".into(),
                    ));
                }
            }
        }
    };

    let text = text.trim();
    if text.is_empty() {
        return Err(ChatError::Protocol("Empty prompt".into()));
    }
    Ok(text.to_owned())
}
