//! Toxicity scoring for incoming messages
//!
//! Lexicon-based and deterministic. Terms are matched case-insensitively on
//! word boundaries so that "hell" does not fire inside "hello".

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use serde::{Deserialize, Serialize};
use smsguard_core::{Error, Result};
use std::collections::BTreeSet;

const DEFAULT_LEXICON: &[&str] = &[
    "hate", "stupid", "idiot", "dumb", "kill", "die", "worst", "terrible", "awful", "sucks",
    "garbage", "trash", "shit", "fuck", "damn", "hell", "asshole", "bastard", "bitch",
];

/// Score contributed by each distinct matched term
const SCORE_PER_TERM: f32 = 0.35;

/// Lexicon-only scores never claim certainty
const MAX_SCORE: f32 = 0.95;

/// Toxicity assessment of one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToxicitySignal {
    /// Score in [0, 0.95]
    pub score: f32,

    /// Distinct lexicon terms found, sorted
    pub matched_terms: Vec<String>,
}

impl ToxicitySignal {
    /// Whether the score crosses `threshold`
    pub fn is_toxic(&self, threshold: f32) -> bool {
        self.score > threshold
    }
}

/// Lexicon toxicity scorer
pub struct ToxicityScorer {
    terms: Vec<String>,
    matcher: AhoCorasick,
}

impl ToxicityScorer {
    /// Create a scorer with the built-in lexicon
    pub fn new() -> Result<Self> {
        Self::with_lexicon(DEFAULT_LEXICON.iter().map(|t| t.to_string()))
    }

    /// Create a scorer with a custom lexicon
    pub fn with_lexicon(terms: impl IntoIterator<Item = String>) -> Result<Self> {
        let terms: Vec<String> = terms
            .into_iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        let matcher = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::LeftmostLongest)
            .build(&terms)
            .map_err(|e| Error::config(format!("Failed to build toxicity lexicon: {}", e)))?;

        Ok(Self { terms, matcher })
    }

    /// Score `text`
    pub fn score(&self, text: &str) -> ToxicitySignal {
        let bytes = text.as_bytes();
        let matched: BTreeSet<&str> = self
            .matcher
            .find_iter(text)
            .filter(|m| is_word_boundary(bytes, m.start(), m.end()))
            .map(|m| self.terms[m.pattern().as_usize()].as_str())
            .collect();

        let score = (matched.len() as f32 * SCORE_PER_TERM).clamp(0.0, MAX_SCORE);

        ToxicitySignal {
            score,
            matched_terms: matched.into_iter().map(String::from).collect(),
        }
    }
}

impl Default for ToxicityScorer {
    fn default() -> Self {
        Self::new().expect("Failed to create toxicity scorer")
    }
}

fn is_word_boundary(bytes: &[u8], start: usize, end: usize) -> bool {
    let before = start == 0 || !bytes[start - 1].is_ascii_alphanumeric();
    let after = end == bytes.len() || !bytes[end].is_ascii_alphanumeric();
    before && after
}
