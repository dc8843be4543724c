//! Newline-delimited JSON framing for streaming generation responses.
//!
//! The backend writes one JSON object per line, but network reads do not
//! respect line boundaries: a single object may arrive across several
//! chunks, and a multi-byte UTF-8 character may be split between two of
//! them. [`NdjsonLineParser`] buffers raw bytes and only decodes complete
//! lines.
//!
//! ```
//! use vtalk::llm::ndjson::NdjsonLineParser;
//!
//! let mut parser = NdjsonLineParser::new();
//! assert!(parser.push(b"{\"response\":\"Hel").is_empty());
//! let lines = parser.push(b"lo\"}\n");
//! assert_eq!(lines, vec![r#"{"response":"Hello"}"#.to_owned()]);
//! ```

/// Incrementally split a byte stream into complete, non-empty lines.
#[derive(Debug, Default)]
pub struct NdjsonLineParser {
    buffer: Vec<u8>,
}

impl NdjsonLineParser {
    /// Create a new incremental parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk of bytes and return every line completed by it.
    ///
    /// Trailing `\r` is stripped and blank lines are skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(line) = decode_line(&raw[..raw.len() - 1]) {
                lines.push(line);
            }
        }
        lines
    }

    /// Return the unterminated final line, if any. Call when the stream ends.
    pub fn flush(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.buffer);
        decode_line(&raw)
    }

    /// Whether bytes are waiting for a line terminator.
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_multiple_lines() {
        let mut parser = NdjsonLineParser::new();
        let lines = parser.push(b"{\"a\":1}\n{\"b\":2}\n");
        assert_eq!(lines, vec!["{\"a\":1}", "{\"b\":2}"]);
        assert!(!parser.has_pending());
    }

    #[test]
    fn line_split_across_chunks() {
        let mut parser = NdjsonLineParser::new();
        assert!(parser.push(b"{\"respo").is_empty());
        assert!(parser.push(b"nse\":\"hi\"").is_empty());
        assert!(parser.has_pending());
        let lines = parser.push(b"}\n");
        assert_eq!(lines, vec!["{\"response\":\"hi\"}"]);
    }

    #[test]
    fn multibyte_char_split_across_chunks() {
        let mut parser = NdjsonLineParser::new();
        let line = "{\"response\":\"caf\u{e9}\"}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap_or(0) + 1;
        assert!(parser.push(&line[..split]).is_empty());
        let lines = parser.push(&line[split..]);
        assert_eq!(lines, vec!["{\"response\":\"caf\u{e9}\"}"]);
    }

    #[test]
    fn crlf_and_blank_lines() {
        let mut parser = NdjsonLineParser::new();
        let lines = parser.push(b"\r\n{\"a\":1}\r\n\n\n");
        assert_eq!(lines, vec!["{\"a\":1}"]);
    }

    #[test]
    fn flush_returns_unterminated_line() {
        let mut parser = NdjsonLineParser::new();
        assert!(parser.push(b"{\"done\":true}").is_empty());
        assert_eq!(parser.flush().as_deref(), Some("{\"done\":true}"));
        assert!(parser.flush().is_none());
    }

    #[test]
    fn flush_empty() {
        let mut parser = NdjsonLineParser::new();
        assert!(parser.flush().is_none());
    }

    #[test]
    fn every_split_point_yields_same_lines() {
        let body = b"{\"response\":\"Hi\"}\n{\"response\":\" there\"}\n{\"done\":true}\n";
        for split in 0..=body.len() {
            let mut parser = NdjsonLineParser::new();
            let mut lines = parser.push(&body[..split]);
            lines.extend(parser.push(&body[split..]));
            assert_eq!(lines.len(), 3, "split at {split}");
            assert_eq!(lines[2], "{\"done\":true}");
        }
    }
}
