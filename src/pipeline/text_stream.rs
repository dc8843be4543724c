//! Turns raw generation fragments into client-ready text.
//!
//! Every fragment is cleaned, stripped of bracketed segments (recording
//! inline emotion tags), and forwarded as a [`TextItem::Chunk`] when anything
//! is left. When the
//! fragment stream ends, a single [`TextItem::Complete`] carries the full
//! reply (the concatenation of every chunk) and the last tag seen. A
//! transport failure is passed through unchanged and ends the stream.

use std::pin::Pin;

use futures_util::{Stream, StreamExt};

use super::cleaner::TextCleaner;
use super::tags::TagExtractor;
use crate::error::Result;
use crate::llm::FragmentStream;

/// Output of the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextItem {
    /// A cleaned, non-empty fragment.
    Chunk(String),
    /// The stream finished normally.
    Complete {
        text: String,
        tag: Option<String>,
    },
}

/// Boxed stream of [`TextItem`]s.
pub type TextItemStream = Pin<Box<dyn Stream<Item = Result<TextItem>> + Send>>;

/// Cleans and accumulates one reply at a time.
#[derive(Debug, Clone)]
pub struct TextStreamOrchestrator {
    cleaner: TextCleaner,
    /// Labels recorded as inline tags. Empty means brackets are only dropped.
    tag_labels: Vec<String>,
}

impl TextStreamOrchestrator {
    pub fn new(cleaner: TextCleaner, tag_labels: Vec<String>) -> Self {
        Self {
            cleaner,
            tag_labels,
        }
    }

    /// Consume `fragments` and produce text items for one reply.
    pub fn run(&self, mut fragments: FragmentStream) -> TextItemStream {
        let cleaner = self.cleaner;
        let mut extractor = TagExtractor::new(self.tag_labels.clone());

        Box::pin(async_stream::stream! {
            let mut reply = String::new();

            while let Some(item) = fragments.next().await {
                let fragment = match item {
                    Ok(fragment) => fragment,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                let text = extractor.process(&cleaner.clean(&fragment));
                if !text.is_empty() {
                    reply.push_str(&text);
                    yield Ok(TextItem::Chunk(text));
                }
            }

            let (tail, tag) = extractor.finish();
            if !tail.is_empty() {
                reply.push_str(&tail);
                yield Ok(TextItem::Chunk(tail));
            }

            yield Ok(TextItem::Complete { text: reply, tag });
        })
    }
}
