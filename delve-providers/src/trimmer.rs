//! Prompt trimming
//!
//! Shrinks text until its token count fits a budget. Splitting prefers
//! paragraph, then line, sentence, word and finally character boundaries.
//! All lengths here are counted in `char`s so slicing never lands inside a
//! code point.

use crate::token_counter::TokenCounter;
use delve_core::{DelveResult, ResearchSettings};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Default context window, in tokens
pub const DEFAULT_CONTEXT_SIZE: usize = 128_000;

const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Recursive character splitter.
///
/// Splits on the first separator present in the text, merges the pieces back
/// into chunks of at most `chunk_size` chars with `chunk_overlap` chars of
/// overlap, and recurses with the remaining separators on any piece that is
/// still too large.
#[derive(Debug, Clone)]
pub struct RecursiveTextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveTextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        let separators: Vec<&str> = self.separators.iter().map(String::as_str).collect();
        self.split_with(text, &separators)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).copied().unwrap_or("");
        let remaining = separators.get(position + 1..).unwrap_or(&[]);

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).collect()
        };

        let mut chunks = Vec::new();
        let mut small = Vec::new();

        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                small.push(piece);
                continue;
            }

            if !small.is_empty() {
                chunks.extend(self.merge(&small, separator));
                small.clear();
            }

            if remaining.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_with(piece, remaining));
            }
        }

        if !small.is_empty() {
            chunks.extend(self.merge(&small, separator));
        }

        chunks
    }

    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            let joiner = if window.is_empty() { 0 } else { separator_len };

            if total + len + joiner > self.chunk_size && !window.is_empty() {
                push_joined(&mut chunks, &window, separator);

                while total > self.chunk_overlap
                    || (total > 0
                        && total + len + if window.is_empty() { 0 } else { separator_len }
                            > self.chunk_size)
                {
                    let Some(front) = window.pop_front() else {
                        break;
                    };
                    total -= char_len(front) + if window.is_empty() { 0 } else { separator_len };
                }
            }

            let joiner = if window.is_empty() { 0 } else { separator_len };
            window.push_back(piece);
            total += len + joiner;
        }

        push_joined(&mut chunks, &window, separator);
        chunks
    }
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn take_chars(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}

/// Shrinks prompts to fit a token budget
#[derive(Debug, Clone)]
pub struct PromptTrimmer {
    counter: Arc<TokenCounter>,
    context_size: usize,
    min_chunk_chars: usize,
    chunk_overlap: usize,
    chars_per_token: usize,
}

impl PromptTrimmer {
    pub fn new(counter: Arc<TokenCounter>) -> Self {
        Self {
            counter,
            context_size: DEFAULT_CONTEXT_SIZE,
            min_chunk_chars: 2_000,
            chunk_overlap: 200,
            chars_per_token: 3,
        }
    }

    pub fn from_settings(
        counter: Arc<TokenCounter>,
        context_size: usize,
        settings: &ResearchSettings,
    ) -> Self {
        Self {
            counter,
            context_size: context_size.max(1),
            min_chunk_chars: settings.min_chunk_chars.max(1),
            chunk_overlap: settings.chunk_overlap,
            chars_per_token: settings.chars_per_token.max(1),
        }
    }

    /// Trimmer backed by the shared default-encoding counter
    pub fn with_defaults() -> DelveResult<Self> {
        Ok(Self::new(TokenCounter::shared()?))
    }

    pub fn with_context_size(mut self, context_size: usize) -> Self {
        self.context_size = context_size.max(1);
        self
    }

    pub fn with_min_chunk_chars(mut self, min_chunk_chars: usize) -> Self {
        self.min_chunk_chars = min_chunk_chars.max(1);
        self
    }

    pub fn context_size(&self) -> usize {
        self.context_size
    }

    pub fn counter(&self) -> &TokenCounter {
        &self.counter
    }

    /// Trim to the configured context size
    pub fn trim_to_context(&self, text: &str) -> String {
        self.trim(text, self.context_size)
    }

    /// Trim `text` until it encodes to at most `max_tokens` tokens.
    ///
    /// When even the `min_chunk_chars` floor is over budget the floor-sized
    /// prefix is returned as is. Trimming an already trimmed string is a
    /// no-op.
    pub fn trim(&self, text: &str, max_tokens: usize) -> String {
        if text.is_empty() {
            return String::new();
        }

        let length = self.counter.count_tokens(text);
        if length <= max_tokens {
            return text.to_string();
        }

        let overflow = length - max_tokens;
        let text_len = char_len(text);
        let chunk_size = text_len.saturating_sub(overflow.saturating_mul(self.chars_per_token));

        if chunk_size < self.min_chunk_chars {
            return take_chars(text, self.min_chunk_chars);
        }

        debug!(
            tokens = length,
            max_tokens,
            chars = text_len,
            chunk_size,
            "Trimming prompt"
        );

        let splitter = RecursiveTextSplitter::new(chunk_size, self.chunk_overlap);
        let first = splitter.split_text(text).into_iter().next().unwrap_or_default();

        let first_len = char_len(&first);
        if first_len == 0 || first_len >= text_len {
            // Splitter made no progress; cut to the estimated size instead
            return self.trim(&take_chars(text, chunk_size), max_tokens);
        }

        self.trim(&first, max_tokens)
    }
}
