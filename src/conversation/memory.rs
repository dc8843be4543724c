//! Bounded conversation memory.
//!
//! Turns are stored oldest-first. Two limits apply after every commit:
//! at most `max_turns` user/assistant pairs, and at most `max_chars`
//! characters of turn text in total. Whole pairs are evicted oldest-first;
//! when only one pair remains and it is still too long, characters are cut
//! from the front of its oldest turn.

use std::collections::VecDeque;

use super::turn::{Role, Turn};
use crate::config::MemoryConfig;

/// Ordered turn log with pair and character limits.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    /// Oldest first.
    turns: VecDeque<Turn>,
    max_turns: usize,
    max_chars: usize,
}

impl ConversationMemory {
    /// Create an empty memory with the given limits.
    #[must_use]
    pub fn new(max_turns: usize, max_chars: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            max_turns,
            max_chars,
        }
    }

    /// Create an empty memory using configured limits.
    #[must_use]
    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::new(config.max_turns, config.max_chars)
    }

    /// Append a turn without enforcing limits. Call [`truncate`](Self::truncate) after.
    pub fn append(&mut self, turn: Turn) {
        self.turns.push_back(turn);
    }

    /// Append a completed exchange and re-apply the limits.
    pub fn commit(&mut self, user: Turn, assistant: Turn) {
        self.append(user);
        self.append(assistant);
        self.truncate();
    }

    /// Re-apply the pair and character limits. Idempotent.
    pub fn truncate(&mut self) {
        while self.pair_count() > self.max_turns {
            self.drop_oldest_pair();
        }
        while self.total_chars() > self.max_chars && self.pair_count() > 1 {
            self.drop_oldest_pair();
        }

        let mut excess = self.total_chars().saturating_sub(self.max_chars);
        while excess > 0 {
            let Some(oldest) = self.turns.front() else {
                break;
            };
            let len = oldest.char_count();
            if len <= excess {
                self.turns.pop_front();
                excess -= len;
            } else {
                let trimmed = oldest.without_leading_chars(excess);
                self.turns[0] = trimmed;
                excess = 0;
            }
        }
    }

    /// A read-only view limited to `max_turns` pairs and `max_chars` characters,
    /// using the same eviction rules as [`truncate`](Self::truncate).
    #[must_use]
    pub fn render(&self, max_turns: usize, max_chars: usize) -> Vec<Turn> {
        let mut view = Self {
            turns: self.turns.clone(),
            max_turns,
            max_chars,
        };
        view.truncate();
        view.turns.into_iter().collect()
    }

    /// Number of user/assistant pairs.
    ///
    /// A pair starts at every user turn, or at an assistant turn that does
    /// not follow a user turn.
    #[must_use]
    pub fn pair_count(&self) -> usize {
        let mut pairs = 0;
        let mut previous: Option<Role> = None;
        for turn in &self.turns {
            let starts_pair = match turn.role() {
                Role::User => true,
                Role::Assistant => previous != Some(Role::User),
            };
            if starts_pair {
                pairs += 1;
            }
            previous = Some(turn.role());
        }
        pairs
    }

    /// Total characters across all retained turns.
    #[must_use]
    pub fn total_chars(&self) -> usize {
        self.turns.iter().map(Turn::char_count).sum()
    }

    /// All retained turns, oldest first.
    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn drop_oldest_pair(&mut self) {
        if let Some(first) = self.turns.pop_front()
            && first.role() == Role::User
            && self.turns.front().is_some_and(|t| t.role() == Role::Assistant)
        {
            self.turns.pop_front();
        }
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::from_config(&MemoryConfig::default())
    }
}
