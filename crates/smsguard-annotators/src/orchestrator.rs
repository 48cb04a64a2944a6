//! Annotation orchestrator
//!
//! Runs the selection policy for each request, invokes the chosen sources
//! under a per-provider timeout, records failures, and merges what
//! succeeded. Two execution modes are supported:
//!
//! - **Sequential** (default): candidates are tried one at a time in policy
//!   order; the first success wins, even if it returned no spans.
//! - **Tiered**: every candidate runs concurrently and all successes are
//!   merged by provider rank.
//!
//! Provider errors never escape a request. They become
//! [`ProviderFailureRecord`]s on the returned [`AnnotationResult`].

use crate::config::AnnotatorConfig;
use crate::environment::{Connectivity, Environment, ModelLifecycle, PreferencesStore};
use crate::merge::{MergeConfig, SpanBatch, SpanMerger};
use crate::policy::{Candidate, ProviderMode, SelectionPolicy};
use crate::registry::ProviderRegistry;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use smsguard_core::{
    AnnotationResult, AnnotationSpan, Error, FailureKind, Outcome, ProviderFailureRecord, Result,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How selected candidates are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One at a time, first success wins
    #[default]
    Sequential,
    /// All at once, successes merged by rank
    Tiered,
}

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Bound on each provider call
    pub timeout: Duration,
    pub execution: ExecutionMode,
    pub merge: MergeConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            execution: ExecutionMode::default(),
            merge: MergeConfig::default(),
        }
    }
}

/// Entry point for annotation requests
pub struct Orchestrator {
    policy: Arc<SelectionPolicy>,
    preferences: Arc<dyn PreferencesStore>,
    merger: SpanMerger,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        policy: Arc<SelectionPolicy>,
        preferences: Arc<dyn PreferencesStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            merger: SpanMerger::new(config.merge.clone()),
            policy,
            preferences,
            config,
        }
    }

    /// Wire an orchestrator to a registry and a shared environment
    pub fn from_environment(
        config: &AnnotatorConfig,
        registry: Arc<ProviderRegistry>,
        environment: Arc<Environment>,
    ) -> Self {
        let policy = SelectionPolicy::new(
            registry,
            Arc::clone(&environment) as Arc<dyn ModelLifecycle>,
            Arc::clone(&environment) as Arc<dyn Connectivity>,
        )
        .with_priority_order(config.priority_order);

        Self::new(
            Arc::new(policy),
            environment,
            config.to_orchestrator_config(),
        )
    }

    pub fn policy(&self) -> &Arc<SelectionPolicy> {
        &self.policy
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Annotate `text` using the mode currently held by the preferences store
    pub async fn resolve_annotations(&self, text: &str) -> AnnotationResult {
        let mode = self.preferences.selected_mode();
        self.resolve_with_mode(text, &mode).await
    }

    /// Annotate `text` with an explicit mode, bypassing the preferences store
    pub async fn resolve_with_mode(&self, text: &str, mode: &ProviderMode) -> AnnotationResult {
        let start = Instant::now();

        let result = match self.policy.select(mode) {
            Err(e) => {
                let reason = match e {
                    Error::Configuration(reason) => reason,
                    other => other.to_string(),
                };
                warn!(%mode, %reason, "annotation mode cannot be honoured");
                AnnotationResult::misconfigured(reason)
            }
            Ok(candidates) if candidates.is_empty() => {
                debug!(%mode, "no annotation sources selected");
                AnnotationResult::skipped()
            }
            Ok(candidates) => match self.config.execution {
                ExecutionMode::Sequential => self.run_sequential(text, &candidates).await,
                ExecutionMode::Tiered => self.run_tiered(text, &candidates).await,
            },
        };

        metrics::counter!("smsguard_requests_total", "outcome" => outcome_label(&result.outcome))
            .increment(1);
        debug!(
            %mode,
            spans = result.spans.len(),
            failures = result.failures.len(),
            latency_us = start.elapsed().as_micros() as u64,
            "annotation request complete"
        );

        result
    }

    /// Like [`resolve_annotations`](Self::resolve_annotations), abandoning the
    /// in-flight provider call once `cancel` fires
    pub async fn resolve_cancellable(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<AnnotationResult> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("annotation request cancelled");
                Err(Error::Cancelled)
            }
            result = self.resolve_annotations(text) => Ok(result),
        }
    }

    async fn run_sequential(&self, text: &str, candidates: &[Candidate]) -> AnnotationResult {
        let mut failures = Vec::new();

        for candidate in candidates {
            match self.attempt(text, candidate).await {
                Ok(spans) => {
                    let spans = self
                        .merger
                        .merge(text, vec![SpanBatch::new(candidate.rank, spans)]);
                    return AnnotationResult::annotated(
                        spans,
                        vec![candidate.source_id().to_string()],
                        failures,
                    );
                }
                Err(record) => failures.push(record),
            }
        }

        warn!(attempts = failures.len(), "all annotation providers failed");
        AnnotationResult::all_failed(failures)
    }

    async fn run_tiered(&self, text: &str, candidates: &[Candidate]) -> AnnotationResult {
        let attempts = join_all(candidates.iter().map(|candidate| async move {
            (candidate, self.attempt(text, candidate).await)
        }))
        .await;

        let mut batches = Vec::new();
        let mut sources = Vec::new();
        let mut failures = Vec::new();
        for (candidate, outcome) in attempts {
            match outcome {
                Ok(spans) => {
                    sources.push(candidate.source_id().to_string());
                    batches.push(SpanBatch::new(candidate.rank, spans));
                }
                Err(record) => failures.push(record),
            }
        }

        if batches.is_empty() {
            warn!(attempts = failures.len(), "all annotation providers failed");
            return AnnotationResult::all_failed(failures);
        }

        AnnotationResult::annotated(self.merger.merge(text, batches), sources, failures)
    }

    /// One bounded provider call. Failures are attributed to the candidate.
    async fn attempt(
        &self,
        text: &str,
        candidate: &Candidate,
    ) -> std::result::Result<Vec<AnnotationSpan>, ProviderFailureRecord> {
        let source_id = candidate.source_id();
        let start = Instant::now();

        let outcome = match tokio::time::timeout(self.config.timeout, candidate.source.annotate(text))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(source_id, self.config.timeout)),
        };

        let latency_us = start.elapsed().as_micros() as u64;
        metrics::histogram!("smsguard_provider_latency_us", "source" => source_id.to_string())
            .record(latency_us as f64);

        match outcome {
            Ok(spans) => {
                debug!(source = source_id, spans = spans.len(), latency_us, "provider succeeded");
                Ok(spans)
            }
            Err(e) => {
                let mut record = e.to_failure_record(source_id);
                record.source_id = source_id.to_string();

                let kind = match record.kind {
                    FailureKind::Failure => "failure",
                    FailureKind::Timeout => "timeout",
                };
                metrics::counter!(
                    "smsguard_provider_failures_total",
                    "source" => source_id.to_string(),
                    "kind" => kind
                )
                .increment(1);
                warn!(source = source_id, kind, reason = %record.reason, "provider attempt failed");

                Err(record)
            }
        }
    }
}

fn outcome_label(outcome: &Outcome) -> &'static str {
    match outcome {
        Outcome::Skipped => "skipped",
        Outcome::Misconfigured { .. } => "misconfigured",
        Outcome::Annotated { .. } => "annotated",
        Outcome::AllProvidersFailed => "all_providers_failed",
    }
}
