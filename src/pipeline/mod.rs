//! The turn pipeline: generated text in, ordered client events out.

pub mod cleaner;
pub mod messages;
pub mod sequencer;
pub mod tags;
pub mod text_stream;

pub use cleaner::TextCleaner;
pub use messages::TurnEvent;
pub use sequencer::{TurnOutcome, TurnSequencer, TurnState};
pub use tags::TagExtractor;
pub use text_stream::{TextItem, TextStreamOrchestrator};
