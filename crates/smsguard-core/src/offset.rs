//! Character offset handling.
//!
//! Spans are expressed in character (Unicode scalar value) offsets so that
//! callers on any platform can slice the message the same way. Detectors
//! usually work on byte offsets (`regex`, `aho-corasick`), so every source
//! converts through a `SpanConverter` built once per message.

use crate::types::{AnnotationSpan, EntityType};

/// Byte/char offset converter for one message.
#[derive(Debug, Clone)]
pub struct SpanConverter<'a> {
    text: &'a str,
    /// Byte offset of each char, plus `text.len()` as a trailing sentinel.
    char_to_byte: Vec<usize>,
}

impl<'a> SpanConverter<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut char_to_byte: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        char_to_byte.push(text.len());
        Self { text, char_to_byte }
    }

    /// The message this converter was built for
    pub fn text(&self) -> &'a str {
        self.text
    }

    /// Length of the message in characters
    pub fn char_len(&self) -> usize {
        self.char_to_byte.len() - 1
    }

    /// Character offset of a byte offset, if it lies on a char boundary
    pub fn byte_to_char(&self, byte_idx: usize) -> Option<usize> {
        self.char_to_byte.binary_search(&byte_idx).ok()
    }

    /// Byte offset of a character offset
    pub fn char_to_byte(&self, char_idx: usize) -> Option<usize> {
        self.char_to_byte.get(char_idx).copied()
    }

    /// Substring covered by a half-open character range
    pub fn slice(&self, char_start: usize, char_end: usize) -> Option<&'a str> {
        if char_start > char_end {
            return None;
        }
        let start = self.char_to_byte(char_start)?;
        let end = self.char_to_byte(char_end)?;
        self.text.get(start..end)
    }

    /// Build a span from character offsets, or `None` if the range is invalid
    pub fn span_from_chars(
        &self,
        char_start: usize,
        char_end: usize,
        entity_type: EntityType,
        source_id: &str,
    ) -> Option<AnnotationSpan> {
        if char_start >= char_end {
            return None;
        }
        let text = self.slice(char_start, char_end)?;
        Some(AnnotationSpan::new(
            char_start,
            char_end,
            entity_type,
            text,
            source_id,
        ))
    }

    /// Build a span from byte offsets (as reported by regex engines)
    pub fn span_from_bytes(
        &self,
        byte_start: usize,
        byte_end: usize,
        entity_type: EntityType,
        source_id: &str,
    ) -> Option<AnnotationSpan> {
        let start = self.byte_to_char(byte_start)?;
        let end = self.byte_to_char(byte_end)?;
        self.span_from_chars(start, end, entity_type, source_id)
    }
}
