//! Events produced by a turn, in delivery order.

use crate::tts::SynthesizedAudio;

/// One outbound step of a turn.
///
/// The sequencer is the only producer; the connection encodes each event
/// with [`ServerMessage`](crate::protocol::ServerMessage) before sending it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    /// The backend accepted the request.
    Start,
    /// A piece of reply text.
    Chunk(String),
    /// Synthesized speech for the whole reply.
    Audio(SynthesizedAudio),
    /// The single emotion label for the reply.
    Emotion(String),
    /// The turn finished and was committed.
    End,
    /// The turn failed, or a prompt was rejected.
    Error(String),
}

impl TurnEvent {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Chunk(_) => "chunk",
            Self::Audio(_) => "audio",
            Self::Emotion(_) => "emotion",
            Self::End => "end",
            Self::Error(_) => "error",
        }
    }

    /// Whether this event closes the turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End | Self::Error(_))
    }
}
