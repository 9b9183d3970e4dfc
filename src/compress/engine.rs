//! Compression engine: runs the pass pipeline over chat messages and keeps
//! cumulative savings counters.

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::passes::{default_passes, TextPass};
use super::CompressionLevel;
use crate::protocol::{ChatRequest, Content, Message, Part};
use crate::round1;

/// Multi-pass text compressor.
///
/// Built once at startup and shared between requests; the counters are
/// atomics so concurrent calls never lose an update.
pub struct TextCompressor {
    level: CompressionLevel,
    passes: Vec<Box<dyn TextPass>>,
    original_chars: AtomicU64,
    compressed_chars: AtomicU64,
    calls: AtomicU64,
}

impl fmt::Debug for TextCompressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextCompressor")
            .field("level", &self.level)
            .field(
                "passes",
                &self.passes.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("calls", &self.calls.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for TextCompressor {
    fn default() -> Self {
        Self::new(CompressionLevel::default())
    }
}

impl TextCompressor {
    /// Create a compressor with the standard pass pipeline
    pub fn new(level: CompressionLevel) -> Self {
        Self::with_passes(level, default_passes())
    }

    /// Create a compressor with a custom pipeline
    pub fn with_passes(level: CompressionLevel, passes: Vec<Box<dyn TextPass>>) -> Self {
        Self {
            level,
            passes,
            original_chars: AtomicU64::new(0),
            compressed_chars: AtomicU64::new(0),
            calls: AtomicU64::new(0),
        }
    }

    /// Configured level
    pub fn level(&self) -> CompressionLevel {
        self.level
    }

    /// Run every enabled pass over `text`.
    ///
    /// Does not touch the savings counters.
    pub fn compress_text(&self, text: &str) -> String {
        let mut current = text.to_string();
        for pass in &self.passes {
            let rewritten = match pass.transform(&current, self.level) {
                Cow::Borrowed(_) => continue,
                Cow::Owned(rewritten) => rewritten,
            };
            current = rewritten;
        }
        current
    }

    /// Compress the textual content of `messages`.
    ///
    /// Roles, unknown fields and non-text parts are carried over unchanged.
    /// At level 0 the input is returned as-is and no counters move.
    pub fn compress_messages(&self, messages: &[Message]) -> Vec<Message> {
        if self.level.is_off() {
            return messages.to_vec();
        }

        let compressed = messages
            .iter()
            .map(|message| Message {
                content: self.compress_content(&message.content),
                ..message.clone()
            })
            .collect();

        self.calls.fetch_add(1, Ordering::Relaxed);
        compressed
    }

    /// Copy of `request` with its `messages` compressed; every other field
    /// is left untouched.
    pub fn compress_request(&self, request: &ChatRequest) -> ChatRequest {
        let mut compressed = request.clone();
        if let Some(messages) = &request.messages {
            compressed.messages = Some(self.compress_messages(messages));
        }
        compressed
    }

    fn compress_content(&self, content: &Content) -> Content {
        match content {
            Content::Text(text) => Content::Text(self.compress_counted(text)),
            Content::Parts(parts) => Content::Parts(
                parts
                    .iter()
                    .map(|part| match part {
                        Part::Text(text_part) => {
                            let mut text_part = text_part.clone();
                            text_part.text = self.compress_counted(&text_part.text);
                            Part::Text(text_part)
                        },
                        other => other.clone(),
                    })
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn compress_counted(&self, text: &str) -> String {
        let compressed = self.compress_text(text);
        self.original_chars
            .fetch_add(text.chars().count() as u64, Ordering::Relaxed);
        self.compressed_chars
            .fetch_add(compressed.chars().count() as u64, Ordering::Relaxed);
        compressed
    }

    /// Cumulative savings since startup (or the last reset)
    pub fn savings(&self) -> Savings {
        let original = self.original_chars.load(Ordering::Relaxed);
        let compressed = self.compressed_chars.load(Ordering::Relaxed);
        let saved = original as i64 - compressed as i64;
        let pct = if original > 0 {
            saved as f64 / original as f64 * 100.0
        } else {
            0.0
        };

        Savings {
            original_chars: original,
            compressed_chars: compressed,
            saved_chars: saved,
            savings_pct: round1(pct),
            calls: self.calls.load(Ordering::Relaxed),
        }
    }

    /// Zero all counters
    pub fn reset(&self) {
        self.original_chars.store(0, Ordering::Relaxed);
        self.compressed_chars.store(0, Ordering::Relaxed);
        self.calls.store(0, Ordering::Relaxed);
    }
}

/// Compression savings summary for serialization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Savings {
    /// Characters seen before compression
    pub original_chars: u64,
    /// Characters after compression
    pub compressed_chars: u64,
    /// Difference (negative if rewriting ever grew the text)
    pub saved_chars: i64,
    /// Saved share of the original, in percent
    pub savings_pct: f64,
    /// Number of `compress_messages` calls
    pub calls: u64,
}
