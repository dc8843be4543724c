//! Bracketed segment removal and inline `[Label]` emotion tag extraction.
//!
//! No bracketed text ever reaches the client. [`TagExtractor`] drops every
//! `[...]` segment; segments whose trimmed inner text is an allowed label are
//! also recorded, and the last one seen becomes the reply's tag. Anything
//! else in brackets (stage directions like `[laughs]`, labels outside the
//! allowed set) is dropped without a trace.
//!
//! With a non-empty label set, a bare label opening the reply
//! (`"Happy Hello"`) is treated as a tag too. It must match exactly and be
//! followed by whitespace, punctuation or the end of the reply.
//!
//! Segments can be split across fragments (`"[Hap"` + `"py] Hello"`). An
//! opening bracket without its closing bracket is held back until the next
//! fragment completes it, or until [`TagExtractor::finish`] releases it as
//! plain text. The opening of the reply is held back in the same way until
//! it is clear whether it starts with a bare label.

/// How the start of the reply resolved.
enum Leading {
    /// More text is needed to decide.
    Undecided,
    /// A bare label spans `start..end`.
    Label { start: usize, end: usize },
    /// The reply does not open with a bare label.
    Absent,
}

/// Characters that may follow a bare leading label.
fn is_label_boundary(ch: char) -> bool {
    ch.is_whitespace() || matches!(ch, '.' | ',' | '!' | '?' | ':' | ';')
}

/// Stateful bracket stripper for one reply.
#[derive(Debug, Clone)]
pub struct TagExtractor {
    allowed: Vec<String>,
    carry: String,
    last_tag: Option<String>,
    /// Still looking for a bare leading label.
    at_start: bool,
}

impl TagExtractor {
    /// An extractor recording `allowed` labels as tags. With no labels every
    /// bracketed segment is simply dropped.
    pub fn new(allowed: Vec<String>) -> Self {
        let at_start = !allowed.is_empty();
        Self {
            allowed,
            carry: String::new(),
            last_tag: None,
            at_start,
        }
    }

    /// Feed one fragment; returns the text that is safe to emit now.
    pub fn process(&mut self, fragment: &str) -> String {
        if fragment.is_empty() {
            return String::new();
        }
        let mut combined = std::mem::take(&mut self.carry);
        combined.push_str(fragment);

        if self.at_start {
            match self.leading(&combined, false) {
                Leading::Undecided => {
                    self.carry = combined;
                    return String::new();
                }
                Leading::Label { start, end } => {
                    self.last_tag = Some(combined[start..end].to_owned());
                    combined.replace_range(..end, "");
                }
                Leading::Absent => {}
            }
            self.at_start = false;
        }

        self.strip(&combined)
    }

    /// Release any held-back text and return it with the last tag seen.
    pub fn finish(&mut self) -> (String, Option<String>) {
        let mut tail = std::mem::take(&mut self.carry);
        if self.at_start {
            self.at_start = false;
            if let Leading::Label { start, end } = self.leading(&tail, true) {
                self.last_tag = Some(tail[start..end].to_owned());
                tail.replace_range(..end, "");
            }
        }

        let mut out = self.strip(&tail);
        out.push_str(&std::mem::take(&mut self.carry));
        (out, self.last_tag.take())
    }

    /// Last allowed tag seen so far.
    pub fn last_tag(&self) -> Option<&str> {
        self.last_tag.as_deref()
    }

    /// Decide whether `text` opens with a bare label. `at_end` means no more
    /// text will follow.
    fn leading(&self, text: &str, at_end: bool) -> Leading {
        let trimmed = text.trim_start();
        if trimmed.is_empty() {
            return if at_end {
                Leading::Absent
            } else {
                Leading::Undecided
            };
        }
        let start = text.len() - trimmed.len();

        let mut undecided = false;
        let mut best: Option<usize> = None;
        for label in self.allowed.iter().filter(|l| !l.is_empty()) {
            match trimmed.strip_prefix(label.as_str()) {
                Some(rest) => match rest.chars().next() {
                    None if !at_end => undecided = true,
                    Some(ch) if !is_label_boundary(ch) => {}
                    _ => {
                        if best.is_none_or(|len| label.len() > len) {
                            best = Some(label.len());
                        }
                    }
                },
                None if !at_end && label.starts_with(trimmed) => undecided = true,
                None => {}
            }
        }

        match (undecided, best) {
            (true, _) => Leading::Undecided,
            (false, Some(len)) => Leading::Label {
                start,
                end: start + len,
            },
            (false, None) => Leading::Absent,
        }
    }

    /// Drop complete bracketed segments; hold back an unclosed one.
    fn strip(&mut self, combined: &str) -> String {
        let mut out = String::with_capacity(combined.len());
        let mut pos = 0;
        while let Some(open) = combined[pos..].find('[').map(|i| pos + i) {
            out.push_str(&combined[pos..open]);
            let Some(close) = combined[open + 1..].find(']').map(|i| open + 1 + i) else {
                self.carry = combined[open..].to_owned();
                return out;
            };
            let inner = combined[open + 1..close].trim();
            if self.allowed.iter().any(|a| a == inner) {
                self.last_tag = Some(inner.to_owned());
            }
            pos = close + 1;
        }
        out.push_str(&combined[pos..]);
        out
    }
}
