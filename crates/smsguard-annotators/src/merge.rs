//! Merge and deduplication of spans from one or more sources.
//!
//! Spans are grouped by entity type and accepted greedily in precedence
//! order: provider rank, then start ascending, then end descending, then
//! source id. A candidate is rejected when an accepted span of the same type
//! contains it, or overlaps it by more than `overlap_threshold` of the
//! candidate's length. Spans of different types never conflict.

use serde::{Deserialize, Serialize};
use smsguard_core::{AnnotationSpan, EntityType, SpanConverter};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Merge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Tolerated overlap as a fraction of the candidate span's length.
    /// `0.0` rejects any overlap.
    #[serde(default)]
    pub overlap_threshold: f32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            overlap_threshold: 0.0,
        }
    }
}

/// Spans returned by one source, with the source's rank
#[derive(Debug, Clone)]
pub struct SpanBatch {
    /// Smaller ranks take precedence
    pub rank: i64,
    pub spans: Vec<AnnotationSpan>,
}

impl SpanBatch {
    pub fn new(rank: i64, spans: Vec<AnnotationSpan>) -> Self {
        Self { rank, spans }
    }
}

/// Combines span batches into one conflict-free, sorted sequence
#[derive(Debug, Clone, Default)]
pub struct SpanMerger {
    config: MergeConfig,
}

impl SpanMerger {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Merge `batches` annotating `text`.
    ///
    /// Malformed spans are dropped and logged. The output is sorted by start
    /// ascending, end descending, then entity type.
    pub fn merge(&self, text: &str, batches: Vec<SpanBatch>) -> Vec<AnnotationSpan> {
        let conv = SpanConverter::new(text);
        let mut groups: BTreeMap<EntityType, Vec<(i64, AnnotationSpan)>> = BTreeMap::new();

        for batch in batches {
            for span in batch.spans {
                if let Err(defect) = span.validate(&conv) {
                    warn!(
                        source = span.source_id(),
                        start = span.start(),
                        end = span.end(),
                        %defect,
                        "dropping malformed span"
                    );
                    continue;
                }
                groups
                    .entry(span.entity_type())
                    .or_default()
                    .push((batch.rank, span));
            }
        }

        let mut merged = Vec::new();
        for (entity_type, mut group) in groups {
            group.sort_by(|(rank_a, a), (rank_b, b)| {
                rank_a.cmp(rank_b).then_with(|| by_position(a, b))
            });

            let mut accepted: Vec<AnnotationSpan> = Vec::with_capacity(group.len());
            for (_, span) in group {
                if accepted.iter().any(|kept| self.conflicts(kept, &span)) {
                    debug!(
                        %entity_type,
                        source = span.source_id(),
                        start = span.start(),
                        end = span.end(),
                        "span superseded"
                    );
                    continue;
                }
                accepted.push(span);
            }
            merged.extend(accepted);
        }

        merged.sort_by(|a, b| {
            by_position(a, b).then_with(|| a.entity_type().cmp(&b.entity_type()))
        });
        merged
    }

    fn conflicts(&self, kept: &AnnotationSpan, candidate: &AnnotationSpan) -> bool {
        if kept.contains(candidate) {
            return true;
        }
        let overlap = kept.overlap_len(candidate);
        overlap > 0 && overlap as f32 / candidate.len() as f32 > self.config.overlap_threshold
    }
}

fn by_position(a: &AnnotationSpan, b: &AnnotationSpan) -> Ordering {
    a.start()
        .cmp(&b.start())
        .then_with(|| b.end().cmp(&a.end()))
        .then_with(|| a.source_id().cmp(b.source_id()))
}
