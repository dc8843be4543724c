//! Per-character cleanup of generated text before it reaches the client.

/// Symbols models use for markdown emphasis or decoration.
const DECORATIVE: [char; 3] = ['*', '~', '`'];

/// Stateless filter applied to every generated fragment.
///
/// Each character is kept or dropped on its own, so cleaning a reply in
/// pieces gives the same result as cleaning it whole.
#[derive(Debug, Clone, Copy)]
pub struct TextCleaner {
    strip_non_ascii: bool,
}

impl TextCleaner {
    pub fn new(strip_non_ascii: bool) -> Self {
        Self { strip_non_ascii }
    }

    /// Whether `ch` survives cleaning.
    pub fn keeps(&self, ch: char) -> bool {
        if DECORATIVE.contains(&ch) {
            return false;
        }
        if self.strip_non_ascii {
            return matches!(ch, '\t' | '\n' | '\r' | ' '..='~');
        }
        true
    }

    /// Clean one fragment.
    pub fn clean(&self, text: &str) -> String {
        text.chars().filter(|&ch| self.keeps(ch)).collect()
    }
}

impl Default for TextCleaner {
    fn default() -> Self {
        Self::new(true)
    }
}
