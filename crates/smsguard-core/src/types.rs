//! Core types for SMSGuard

use crate::error::{Error, Result};
use crate::offset::SpanConverter;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of sensitive entity detected in a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Person,
    Location,
    Organization,
    Datetime,
    Url,
    Email,
    Phone,
    Other,
}

impl EntityType {
    /// All entity types, in declaration order
    pub const ALL: [EntityType; 8] = [
        Self::Person,
        Self::Location,
        Self::Organization,
        Self::Datetime,
        Self::Url,
        Self::Email,
        Self::Phone,
        Self::Other,
    ];

    /// Map a model or wire label to an entity type.
    ///
    /// Accepts the canonical names plus the CoNLL/OntoNotes short forms
    /// (`PER`, `LOC`, `GPE`, `ORG`, `DATE`, `TIME`). Unknown labels map to
    /// `Other`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "PERSON" | "PER" => Self::Person,
            "LOCATION" | "LOC" | "GPE" => Self::Location,
            "ORGANIZATION" | "ORGANISATION" | "ORG" => Self::Organization,
            "DATETIME" | "DATE" | "TIME" => Self::Datetime,
            "URL" => Self::Url,
            "EMAIL" => Self::Email,
            "PHONE" | "PHONE_NUMBER" => Self::Phone,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "PERSON",
            Self::Location => "LOCATION",
            Self::Organization => "ORGANIZATION",
            Self::Datetime => "DATETIME",
            Self::Url => "URL",
            Self::Email => "EMAIL",
            Self::Phone => "PHONE",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected entity occurrence.
///
/// Offsets are half-open character offsets into the annotated message.
/// Spans are never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSpan {
    start: usize,
    end: usize,
    entity_type: EntityType,
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    confidence: Option<f32>,
    source_id: String,
}

/// Why a span was rejected by validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanDefect {
    /// `start >= end`
    EmptyOrInverted,
    /// `end` lies past the end of the message
    OutOfBounds,
    /// `text` differs from the message slice it claims to cover
    TextMismatch,
    /// Confidence is NaN or outside `0.0..=1.0`
    InvalidConfidence,
}

impl fmt::Display for SpanDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::EmptyOrInverted => "start is not before end",
            Self::OutOfBounds => "end is past the end of the text",
            Self::TextMismatch => "span text does not match the source text",
            Self::InvalidConfidence => "confidence outside 0.0..=1.0",
        };
        f.write_str(msg)
    }
}

impl AnnotationSpan {
    /// Create a new span without confidence
    pub fn new(
        start: usize,
        end: usize,
        entity_type: EntityType,
        text: impl Into<String>,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            start,
            end,
            entity_type,
            text: text.into(),
            confidence: None,
            source_id: source_id.into(),
        }
    }

    /// Attach a confidence score
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn confidence(&self) -> Option<f32> {
        self.confidence
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Length in characters
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of characters shared with `other`
    pub fn overlap_len(&self, other: &AnnotationSpan) -> usize {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        end.saturating_sub(start)
    }

    /// Whether `other` lies entirely inside this span
    pub fn contains(&self, other: &AnnotationSpan) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Check the span against the message it claims to annotate
    pub fn validate(&self, text: &SpanConverter<'_>) -> std::result::Result<(), SpanDefect> {
        if self.start >= self.end {
            return Err(SpanDefect::EmptyOrInverted);
        }
        if self.end > text.char_len() {
            return Err(SpanDefect::OutOfBounds);
        }
        if text.slice(self.start, self.end) != Some(self.text.as_str()) {
            return Err(SpanDefect::TextMismatch);
        }
        if let Some(c) = self.confidence {
            if !(0.0..=1.0).contains(&c) {
                return Err(SpanDefect::InvalidConfidence);
            }
        }
        Ok(())
    }
}

/// How a provider attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The provider returned an error
    Failure,
    /// The provider did not answer within the configured bound
    Timeout,
}

/// A failed provider attempt recorded during one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailureRecord {
    pub source_id: String,
    pub kind: FailureKind,
    pub reason: String,
}

/// How a request concluded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// No candidate was selected (mode off, or nothing ready)
    Skipped,
    /// Explicit mode named a provider that is unknown or not ready
    Misconfigured { reason: String },
    /// Spans were accepted from these sources
    Annotated { sources: Vec<String> },
    /// Every candidate failed or timed out
    AllProvidersFailed,
}

/// Final annotation set handed back to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationResult {
    /// Merged spans, sorted by start offset
    pub spans: Vec<AnnotationSpan>,

    /// Whether any candidate failed during the request
    pub partial: bool,

    /// Failures encountered, in attempt order
    pub failures: Vec<ProviderFailureRecord>,

    pub outcome: Outcome,
}

impl AnnotationResult {
    /// Result for a request that invoked no provider
    pub fn skipped() -> Self {
        Self {
            spans: Vec::new(),
            partial: false,
            failures: Vec::new(),
            outcome: Outcome::Skipped,
        }
    }

    /// Result for an explicit selection that could not be honoured
    pub fn misconfigured(reason: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Misconfigured {
                reason: reason.into(),
            },
            ..Self::skipped()
        }
    }

    /// Result when every candidate failed
    pub fn all_failed(failures: Vec<ProviderFailureRecord>) -> Self {
        Self {
            spans: Vec::new(),
            partial: !failures.is_empty(),
            failures,
            outcome: Outcome::AllProvidersFailed,
        }
    }

    /// Result carrying spans accepted from `sources`
    pub fn annotated(
        spans: Vec<AnnotationSpan>,
        sources: Vec<String>,
        failures: Vec<ProviderFailureRecord>,
    ) -> Self {
        Self {
            spans,
            partial: !failures.is_empty(),
            failures,
            outcome: Outcome::Annotated { sources },
        }
    }

    /// Whether entity detection ran with reduced coverage
    pub fn is_degraded(&self) -> bool {
        self.partial || matches!(self.outcome, Outcome::AllProvidersFailed)
    }

    /// Spans of a single entity type
    pub fn spans_of(&self, entity_type: EntityType) -> impl Iterator<Item = &AnnotationSpan> {
        self.spans
            .iter()
            .filter(move |s| s.entity_type() == entity_type)
    }

    /// Turn an all-failed result into an error for callers that require annotations
    pub fn require_annotations(self) -> Result<Self> {
        match self.outcome {
            Outcome::AllProvidersFailed => Err(Error::AllProvidersFailed(self.failures)),
            Outcome::Misconfigured { reason } => Err(Error::Configuration(reason)),
            _ => Ok(self),
        }
    }
}
