//! Conversation state for a single connection.
//!
//! - [`Turn`]: one immutable user or assistant message.
//! - [`ConversationMemory`]: the bounded, oldest-first turn log fed into
//!   prompt composition.

pub mod memory;
pub mod turn;

pub use memory::ConversationMemory;
pub use turn::{Role, Turn};
