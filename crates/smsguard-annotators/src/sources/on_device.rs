//! On-device pattern model (lightweight tier)
//!
//! Structured entities (emails, URLs, phone numbers, dates and times) come
//! from regular expressions. Names, places and organizations come from a
//! case-sensitive gazetteer matched with Aho-Corasick, plus an honorific
//! rule for people ("Dr. Smith").

use super::ON_DEVICE_ID;
use crate::merge::{SpanBatch, SpanMerger};
use crate::source::{AnnotationSource, SourceDescriptor};
use aho_corasick::{AhoCorasick, MatchKind};
use regex::Regex;
use serde::{Deserialize, Serialize};
use smsguard_core::{AnnotationSpan, EntityType, Error, Result, SpanConverter};
use std::time::Instant;
use tracing::debug;

const EMAIL_PATTERN: &str = r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b";

const URL_PATTERN: &str = r#"\b(?:https?://|www\.)[^\s<>"']+"#;

const PHONE_PATTERN: &str =
    r"(?:\+\d{1,3}[\s.-]?)?(?:\(\d{3}\)\s?|\b\d{3}[\s.-])?\b\d{3}[.-]\d{4}\b";

const DATETIME_PATTERN: &str = concat!(
    r"(?i)\b(?:",
    r"\d{4}-\d{2}-\d{2}",
    r"|\d{1,2}/\d{1,2}(?:/\d{2,4})?",
    r"|\d{1,2}(?::\d{2})?\s?(?:am|pm)",
    r"|\d{1,2}:\d{2}",
    r"|(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?\s+\d{1,2}(?:st|nd|rd|th)?(?:,?\s+\d{4})?",
    r"|(?:next|this|last)\s+(?:week|weekend|month|year|monday|tuesday|wednesday|thursday|friday|saturday|sunday)",
    r"|today|tonight|tomorrow|yesterday",
    r"|monday|tuesday|wednesday|thursday|friday|saturday|sunday",
    r")\b",
);

const HONORIFIC_PATTERN: &str = r"\b(?:Mr|Mrs|Ms|Dr|Prof)\.?\s+[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?";

/// Word lists for named-entity lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gazetteer {
    #[serde(default)]
    pub people: Vec<String>,

    #[serde(default)]
    pub locations: Vec<String>,

    #[serde(default)]
    pub organizations: Vec<String>,
}

impl Default for Gazetteer {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            people: list(&[
                "John", "Mary", "James", "Patricia", "Robert", "Jennifer", "Michael", "Linda",
                "David", "Sarah", "Maria", "Ahmed", "Wei", "Priya",
            ]),
            locations: list(&[
                "London", "Paris", "New York", "San Francisco", "Berlin", "Tokyo", "Mumbai",
                "Toronto", "Sydney", "Chicago", "Boston", "Seattle",
            ]),
            organizations: list(&[
                "Apple Inc", "Apple", "Google", "Microsoft", "Amazon", "Netflix", "PayPal",
                "Bank of America", "Chase", "FedEx", "UPS", "DHL",
            ]),
        }
    }
}

struct RegexDetector {
    regex: Regex,
    entity_type: EntityType,
    confidence: f32,
    trim_trailing_punctuation: bool,
}

/// Lightweight on-device annotation source
pub struct OnDeviceSource {
    descriptor: SourceDescriptor,
    detectors: Vec<RegexDetector>,
    gazetteer: Option<AhoCorasick>,
    gazetteer_types: Vec<EntityType>,
    merger: SpanMerger,
}

impl OnDeviceSource {
    /// Create a source with the given gazetteer and priority
    pub fn new(gazetteer: Gazetteer, default_priority: i32) -> Result<Self> {
        let detectors = vec![
            detector(EMAIL_PATTERN, EntityType::Email, 0.95, false)?,
            detector(URL_PATTERN, EntityType::Url, 0.95, true)?,
            detector(PHONE_PATTERN, EntityType::Phone, 0.85, false)?,
            detector(DATETIME_PATTERN, EntityType::Datetime, 0.8, false)?,
            detector(HONORIFIC_PATTERN, EntityType::Person, 0.75, false)?,
        ];

        let mut terms = Vec::new();
        let mut gazetteer_types = Vec::new();
        for (entity_type, names) in [
            (EntityType::Person, &gazetteer.people),
            (EntityType::Location, &gazetteer.locations),
            (EntityType::Organization, &gazetteer.organizations),
        ] {
            for name in names.iter().filter(|n| !n.trim().is_empty()) {
                terms.push(name.trim().to_string());
                gazetteer_types.push(entity_type);
            }
        }

        let gazetteer = if terms.is_empty() {
            None
        } else {
            Some(
                AhoCorasick::builder()
                    .match_kind(MatchKind::LeftmostLongest)
                    .build(&terms)
                    .map_err(|e| Error::config(format!("Failed to build gazetteer: {}", e)))?,
            )
        };

        Ok(Self {
            descriptor: SourceDescriptor::new(ON_DEVICE_ID, default_priority),
            detectors,
            gazetteer,
            gazetteer_types,
            merger: SpanMerger::default(),
        })
    }

    fn detect(&self, text: &str) -> Vec<AnnotationSpan> {
        let conv = SpanConverter::new(text);
        let source_id = self.source_id();
        let mut spans = Vec::new();

        for detector in &self.detectors {
            for m in detector.regex.find_iter(text) {
                let end = if detector.trim_trailing_punctuation {
                    m.start() + trim_trailing_punctuation(m.as_str()).len()
                } else {
                    m.end()
                };
                if let Some(span) =
                    conv.span_from_bytes(m.start(), end, detector.entity_type, source_id)
                {
                    spans.push(span.with_confidence(detector.confidence));
                }
            }
        }

        if let Some(gazetteer) = &self.gazetteer {
            for m in gazetteer.find_iter(text) {
                if !is_word_bounded(text, m.start(), m.end()) {
                    continue;
                }
                let entity_type = self.gazetteer_types[m.pattern().as_usize()];
                if let Some(span) = conv.span_from_bytes(m.start(), m.end(), entity_type, source_id)
                {
                    spans.push(span.with_confidence(0.7));
                }
            }
        }

        spans
    }
}

impl Default for OnDeviceSource {
    fn default() -> Self {
        Self::new(Gazetteer::default(), 200).expect("Failed to create on-device source")
    }
}

#[async_trait::async_trait]
impl AnnotationSource for OnDeviceSource {
    async fn annotate(&self, text: &str) -> Result<Vec<AnnotationSpan>> {
        let start = Instant::now();

        let raw = self.detect(text);
        let raw_count = raw.len();
        // Detectors can overlap each other (honorific vs. gazetteer name)
        let spans = self.merger.merge(text, vec![SpanBatch::new(0, raw)]);

        debug!(
            source = self.source_id(),
            raw = raw_count,
            kept = spans.len(),
            latency_us = start.elapsed().as_micros() as u64,
            "on-device detection complete"
        );

        Ok(spans)
    }

    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }
}

fn detector(
    pattern: &str,
    entity_type: EntityType,
    confidence: f32,
    trim_trailing_punctuation: bool,
) -> Result<RegexDetector> {
    let regex = Regex::new(pattern).map_err(|e| {
        Error::config(format!("Failed to compile {} regex: {}", entity_type, e))
    })?;
    Ok(RegexDetector {
        regex,
        entity_type,
        confidence,
        trim_trailing_punctuation,
    })
}

fn trim_trailing_punctuation(s: &str) -> &str {
    s.trim_end_matches(|c: char| matches!(c, '.' | ',' | '!' | '?' | ')' | ';' | ':'))
}

fn is_word_bounded(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
}
