use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Text typed by the user.
    User,
    /// Reply generated for the character.
    Assistant,
}

impl Role {
    /// Speaker prefix used when rendering history into a prompt.
    pub fn speaker(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

/// One committed message. Fields are read-only once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    content: String,
    emotion: Option<String>,
    created_at: DateTime<Utc>,
}

impl Turn {
    /// A user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            emotion: None,
            created_at: Utc::now(),
        }
    }

    /// An assistant turn with the emotion delivered for it.
    pub fn assistant(content: impl Into<String>, emotion: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            emotion: Some(emotion.into()),
            created_at: Utc::now(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Emotion label (assistant turns only).
    pub fn emotion(&self) -> Option<&str> {
        self.emotion.as_deref()
    }

    /// When the message was written (for user turns, when the prompt arrived).
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The same turn stamped with `at`.
    #[must_use]
    pub fn with_created_at(self, at: DateTime<Utc>) -> Self {
        Self {
            created_at: at,
            ..self
        }
    }

    /// Length in Unicode scalar values.
    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }

    /// A copy with the first `n` characters removed.
    pub(crate) fn without_leading_chars(&self, n: usize) -> Self {
        Self {
            content: self.content.chars().skip(n).collect(),
            ..self.clone()
        }
    }
}
