//! Message filter: annotations plus toxicity into a single verdict

use crate::orchestrator::Orchestrator;
use crate::toxicity::{ToxicityScorer, ToxicitySignal};
use serde::{Deserialize, Serialize};
use smsguard_core::{AnnotationResult, AnnotationSpan, EntityType, Result, SpanConverter};
use std::cmp::Reverse;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Filter thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Messages scoring above this are flagged
    #[serde(default = "default_toxicity_threshold")]
    pub toxicity_threshold: f32,

    /// Entity types whose presence flags a message
    #[serde(default)]
    pub flag_entity_types: Vec<EntityType>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            toxicity_threshold: default_toxicity_threshold(),
            flag_entity_types: Vec::new(),
        }
    }
}

/// What the caller should do with the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterAction {
    Allow,
    Flag,
}

/// Verdict for one message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageVerdict {
    pub action: FilterAction,

    /// Human-readable reasons for a `Flag`
    pub reasons: Vec<String>,

    pub toxicity: ToxicitySignal,

    pub annotations: AnnotationResult,

    /// Message text with every annotated span replaced by `[TYPE]`
    pub redacted: String,
}

/// Combines the orchestrator and the toxicity scorer
pub struct MessageFilter {
    orchestrator: Arc<Orchestrator>,
    toxicity: ToxicityScorer,
    config: FilterConfig,
}

impl MessageFilter {
    pub fn new(orchestrator: Arc<Orchestrator>, toxicity: ToxicityScorer, config: FilterConfig) -> Self {
        Self {
            orchestrator,
            toxicity,
            config,
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Annotate and score `text`
    pub async fn check(&self, text: &str) -> MessageVerdict {
        let annotations = self.orchestrator.resolve_annotations(text).await;
        self.verdict(text, annotations)
    }

    /// Like [`check`](Self::check), abandoned once `cancel` fires
    pub async fn check_cancellable(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<MessageVerdict> {
        let annotations = self.orchestrator.resolve_cancellable(text, cancel).await?;
        Ok(self.verdict(text, annotations))
    }

    fn verdict(&self, text: &str, annotations: AnnotationResult) -> MessageVerdict {
        let toxicity = self.toxicity.score(text);
        let mut reasons = Vec::new();

        if toxicity.is_toxic(self.config.toxicity_threshold) {
            reasons.push(format!(
                "toxicity {:.2} above {:.2} ({})",
                toxicity.score,
                self.config.toxicity_threshold,
                toxicity.matched_terms.join(", ")
            ));
        }

        for entity_type in &self.config.flag_entity_types {
            let count = annotations.spans_of(*entity_type).count();
            if count > 0 {
                reasons.push(format!("contains {} {}", count, entity_type));
            }
        }

        let action = if reasons.is_empty() {
            FilterAction::Allow
        } else {
            FilterAction::Flag
        };

        debug!(
            ?action,
            toxicity = toxicity.score,
            spans = annotations.spans.len(),
            "message verdict"
        );

        MessageVerdict {
            action,
            reasons,
            toxicity,
            redacted: redact(text, &annotations.spans),
            annotations,
        }
    }
}

/// Replace each span with a `[TYPE]` placeholder.
///
/// Where spans overlap, the one starting first (longest on ties) is
/// replaced and the rest are skipped. Spans outside `text` are ignored.
pub fn redact(text: &str, spans: &[AnnotationSpan]) -> String {
    let conv = SpanConverter::new(text);
    let mut ordered: Vec<&AnnotationSpan> = spans.iter().collect();
    ordered.sort_by_key(|s| (s.start(), Reverse(s.end())));

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for span in ordered {
        if span.start() < cursor {
            continue;
        }
        let (Some(from), Some(start), Some(end)) = (
            conv.char_to_byte(cursor),
            conv.char_to_byte(span.start()),
            conv.char_to_byte(span.end()),
        ) else {
            continue;
        };
        if start >= end {
            continue;
        }
        out.push_str(&text[from..start]);
        out.push('[');
        out.push_str(span.entity_type().as_str());
        out.push(']');
        cursor = span.end();
    }
    if let Some(from) = conv.char_to_byte(cursor) {
        out.push_str(&text[from..]);
    }
    out
}

fn default_toxicity_threshold() -> f32 {
    0.5
}
