//! Orchestrator integration tests
//!
//! Selection, fallback, timeout, merge and cancellation behaviour exercised
//! through the public API with mock sources.


use futures::future::join_all;
use mock_sources::{FailingSource, HangingSource, MockSource};
use smsguard_annotators::{
    build_registry_from_config, AnnotationSource, AnnotatorConfig, Environment, ExecutionMode,
    Orchestrator, ProviderMode, ProviderRegistry,
};
use smsguard_core::{AnnotationSpan, EntityType, Error, FailureKind, Outcome};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const CALL_TEXT: &str = "Call John at 555-1234 tomorrow";

fn registry(sources: Vec<Arc<dyn AnnotationSource>>) -> Arc<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    for source in sources {
        registry.register(source, true).unwrap();
    }
    Arc::new(registry)
}

fn orchestrator(
    sources: Vec<Arc<dyn AnnotationSource>>,
    environment: &Arc<Environment>,
    execution: ExecutionMode,
) -> Orchestrator {
    let config = AnnotatorConfig {
        execution,
        ..AnnotatorConfig::default()
    };
    Orchestrator::from_environment(&config, registry(sources), Arc::clone(environment))
}

fn summary(spans: &[AnnotationSpan]) -> Vec<(usize, usize, EntityType, &str)> {
    spans
        .iter()
        .map(|s| (s.start(), s.end(), s.entity_type(), s.source_id()))
        .collect()
}

#[tokio::test]
async fn test_off_mode_calls_nothing() {
    let env = Arc::new(Environment::new(ProviderMode::Off));
    let a = Arc::new(MockSource::new("a", 100).with_spans(vec![(5, 9, EntityType::Person)]));
    let orchestrator = orchestrator(vec![a.clone()], &env, ExecutionMode::Sequential);

    let result = orchestrator.resolve_annotations(CALL_TEXT).await;

    assert_eq!(result.outcome, Outcome::Skipped);
    assert!(result.spans.is_empty());
    assert!(!result.partial);
    assert_eq!(a.call_count(), 0);
}

#[tokio::test]
async fn test_auto_falls_back_in_priority_order() {
    let env = Arc::new(Environment::default());
    let first = Arc::new(FailingSource::new("first", 100).with_error("model crashed"));
    let second = Arc::new(MockSource::new("second", 200).with_spans(vec![(5, 9, EntityType::Person)]));
    let third = Arc::new(MockSource::new("third", 300).with_spans(vec![(13, 21, EntityType::Phone)]));
    let orchestrator = orchestrator(
        vec![third.clone(), first.clone(), second.clone()],
        &env,
        ExecutionMode::Sequential,
    );

    let result = orchestrator.resolve_annotations(CALL_TEXT).await;

    assert_eq!(first.call_count(), 1);
    assert_eq!(second.call_count(), 1);
    assert_eq!(third.call_count(), 0);
    assert_eq!(summary(&result.spans), vec![(5, 9, EntityType::Person, "second")]);
    assert_eq!(
        result.outcome,
        Outcome::Annotated {
            sources: vec!["second".to_string()]
        }
    );
    assert!(result.partial);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].source_id, "first");
    assert_eq!(result.failures[0].kind, FailureKind::Failure);
    assert_eq!(result.failures[0].reason, "model crashed");
}

#[tokio::test]
async fn test_empty_success_wins() {
    let env = Arc::new(Environment::default());
    let quiet = Arc::new(MockSource::new("quiet", 100));
    let chatty = Arc::new(MockSource::new("chatty", 200).with_spans(vec![(5, 9, EntityType::Person)]));
    let orchestrator = orchestrator(vec![quiet.clone(), chatty.clone()], &env, ExecutionMode::Sequential);

    let result = orchestrator.resolve_annotations(CALL_TEXT).await;

    assert!(result.spans.is_empty());
    assert!(!result.partial);
    assert_eq!(
        result.outcome,
        Outcome::Annotated {
            sources: vec!["quiet".to_string()]
        }
    );
    assert_eq!(chatty.call_count(), 0);
}

#[tokio::test]
async fn test_all_failing() {
    let env = Arc::new(Environment::default());
    let sources: Vec<Arc<dyn AnnotationSource>> = vec![
        Arc::new(FailingSource::new("a", 1)),
        Arc::new(FailingSource::new("b", 2)),
        Arc::new(FailingSource::new("c", 3)),
    ];

    for execution in [ExecutionMode::Sequential, ExecutionMode::Tiered] {
        let orchestrator = orchestrator(sources.clone(), &env, execution);

        let result = orchestrator.resolve_annotations(CALL_TEXT).await;

        assert_eq!(result.outcome, Outcome::AllProvidersFailed);
        assert!(result.spans.is_empty());
        assert!(result.partial);
        let failed: Vec<&str> = result.failures.iter().map(|f| f.source_id.as_str()).collect();
        assert_eq!(failed, vec!["a", "b", "c"]);

        match result.require_annotations() {
            Err(Error::AllProvidersFailed(records)) => assert_eq!(records.len(), 3),
            other => panic!("expected AllProvidersFailed, got {:?}", other),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_a_failure() {
    let env = Arc::new(Environment::default());
    let hanging = Arc::new(HangingSource::new("hanging", 100));
    let slow = Arc::new(
        MockSource::new("slow", 150)
            .with_latency(Duration::from_secs(10))
            .with_spans(vec![(0, 4, EntityType::Other)]),
    );
    let fallback = Arc::new(MockSource::new("fallback", 200).with_spans(vec![(5, 9, EntityType::Person)]));
    let orchestrator = orchestrator(
        vec![hanging.clone(), slow.clone(), fallback.clone()],
        &env,
        ExecutionMode::Sequential,
    );

    let started = tokio::time::Instant::now();
    let result = orchestrator.resolve_annotations(CALL_TEXT).await;

    // Two full timeouts, one after the other
    assert!(started.elapsed() >= Duration::from_secs(6));
    assert!(hanging.was_abandoned());
    assert_eq!(slow.call_count(), 1);
    assert_eq!(summary(&result.spans), vec![(5, 9, EntityType::Person, "fallback")]);
    let kinds: Vec<(&str, FailureKind)> = result
        .failures
        .iter()
        .map(|f| (f.source_id.as_str(), f.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![("hanging", FailureKind::Timeout), ("slow", FailureKind::Timeout)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_tiered_runs_concurrently() {
    let env = Arc::new(Environment::default());
    let a = Arc::new(
        MockSource::new("a", 100)
            .with_latency(Duration::from_secs(2))
            .with_spans(vec![(5, 9, EntityType::Person)]),
    );
    let b = Arc::new(
        MockSource::new("b", 200)
            .with_latency(Duration::from_secs(2))
            .with_spans(vec![(13, 21, EntityType::Phone)]),
    );
    let hanging = Arc::new(HangingSource::new("hanging", 300));
    let orchestrator = orchestrator(vec![a, b, hanging], &env, ExecutionMode::Tiered);

    let started = tokio::time::Instant::now();
    let result = orchestrator.resolve_annotations(CALL_TEXT).await;

    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(
        summary(&result.spans),
        vec![
            (5, 9, EntityType::Person, "a"),
            (13, 21, EntityType::Phone, "b"),
        ]
    );
    assert_eq!(
        result.outcome,
        Outcome::Annotated {
            sources: vec!["a".to_string(), "b".to_string()]
        }
    );
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].kind, FailureKind::Timeout);
}

#[tokio::test]
async fn test_cross_priority_containment() {
    let env = Arc::new(Environment::default());
    let high = Arc::new(MockSource::new("high", 100).with_spans(vec![(5, 21, EntityType::Other)]));
    let low = Arc::new(MockSource::new("low", 200).with_spans(vec![
        (5, 9, EntityType::Other),
        (22, 30, EntityType::Datetime),
    ]));
    let orchestrator = orchestrator(vec![low, high], &env, ExecutionMode::Tiered);

    let result = orchestrator.resolve_annotations(CALL_TEXT).await;

    assert_eq!(
        summary(&result.spans),
        vec![
            (5, 21, EntityType::Other, "high"),
            (22, 30, EntityType::Datetime, "low"),
        ]
    );
}

#[tokio::test]
async fn test_same_tier_overlap_and_different_types() {
    let env = Arc::new(Environment::default());
    let source = Arc::new(MockSource::new("one", 100).with_spans(vec![
        (13, 17, EntityType::Phone),
        (13, 21, EntityType::Phone),
        (13, 21, EntityType::Other),
    ]));
    let orchestrator = orchestrator(vec![source], &env, ExecutionMode::Sequential);

    let result = orchestrator.resolve_annotations(CALL_TEXT).await;

    assert_eq!(
        summary(&result.spans),
        vec![
            (13, 21, EntityType::Phone, "one"),
            (13, 21, EntityType::Other, "one"),
        ]
    );
}

#[tokio::test]
async fn test_malformed_provider_spans_dropped() {
    let env = Arc::new(Environment::default());
    let source = Arc::new(
        MockSource::new("sloppy", 100)
            .with_spans(vec![(5, 9, EntityType::Person)])
            .with_raw_spans(vec![
                AnnotationSpan::new(25, 99, EntityType::Datetime, "tomorrow", "sloppy"),
                AnnotationSpan::new(0, 4, EntityType::Person, "Jane", "sloppy"),
            ]),
    );
    let orchestrator = orchestrator(vec![source], &env, ExecutionMode::Sequential);

    let result = orchestrator.resolve_annotations(CALL_TEXT).await;

    assert_eq!(summary(&result.spans), vec![(5, 9, EntityType::Person, "sloppy")]);
    assert!(!result.partial);
}

#[tokio::test]
async fn test_call_scenario_with_default_sources() {
    let config = AnnotatorConfig::default();
    let registry = Arc::new(build_registry_from_config(&config, None).unwrap());
    let env = Arc::new(Environment::default());
    let orchestrator = Orchestrator::from_environment(&config, registry, env);

    let result = orchestrator.resolve_annotations(CALL_TEXT).await;

    let texts: Vec<(EntityType, &str)> = result
        .spans
        .iter()
        .map(|s| (s.entity_type(), s.text()))
        .collect();
    assert!(texts.contains(&(EntityType::Person, "John")));
    assert!(texts.contains(&(EntityType::Phone, "555-1234")));
    assert!(texts.contains(&(EntityType::Datetime, "tomorrow")));

    let phone = result.spans_of(EntityType::Phone).next().unwrap();
    assert_eq!((phone.start(), phone.end()), (13, 21));
    assert_eq!(
        result.outcome,
        Outcome::Annotated {
            sources: vec!["on-device".to_string()]
        }
    );
}

#[tokio::test]
async fn test_explicit_unready_source_is_misconfigured() {
    let env = Arc::new(Environment::new(ProviderMode::Explicit("cloud".to_string())));
    env.set_network_available(false);
    let cloud = Arc::new(MockSource::new("cloud", 200).with_network());
    let local = Arc::new(MockSource::new("local", 300).with_spans(vec![(5, 9, EntityType::Person)]));
    let orchestrator = orchestrator(vec![cloud.clone(), local.clone()], &env, ExecutionMode::Sequential);

    let result = orchestrator.resolve_annotations(CALL_TEXT).await;

    assert!(matches!(result.outcome, Outcome::Misconfigured { .. }));
    assert!(result.spans.is_empty());
    assert_eq!(cloud.call_count(), 0);
    assert_eq!(local.call_count(), 0);
    assert!(matches!(
        result.require_annotations(),
        Err(Error::Configuration(_))
    ));

    env.set_network_available(true);
    let result = orchestrator.resolve_annotations(CALL_TEXT).await;
    assert_eq!(
        result.outcome,
        Outcome::Annotated {
            sources: vec!["cloud".to_string()]
        }
    );
    assert_eq!(cloud.call_count(), 1);
}

#[tokio::test]
async fn test_mode_changes_apply_to_next_request() {
    let env = Arc::new(Environment::default());
    let a = Arc::new(MockSource::new("a", 100));
    let b = Arc::new(MockSource::new("b", 200));
    let orchestrator = orchestrator(vec![a.clone(), b.clone()], &env, ExecutionMode::Sequential);

    orchestrator.resolve_annotations(CALL_TEXT).await;
    env.set_mode(ProviderMode::Explicit("b".to_string()));
    orchestrator.resolve_annotations(CALL_TEXT).await;
    env.set_mode(ProviderMode::Off);
    orchestrator.resolve_annotations(CALL_TEXT).await;

    assert_eq!(a.call_count(), 1);
    assert_eq!(b.call_count(), 1);
}

#[tokio::test]
async fn test_model_readiness_gates_selection() {
    let env = Arc::new(Environment::default());
    let local = Arc::new(
        MockSource::new("local-model", 100)
            .with_model()
            .with_spans(vec![(5, 9, EntityType::Person)]),
    );
    let on_device = Arc::new(MockSource::new("on-device", 200));
    let orchestrator = orchestrator(vec![local.clone(), on_device.clone()], &env, ExecutionMode::Sequential);

    let before = orchestrator.resolve_annotations(CALL_TEXT).await;
    env.mark_model_ready("local-model", 1 << 20);
    let after = orchestrator.resolve_annotations(CALL_TEXT).await;

    assert!(before.spans.is_empty());
    assert_eq!(summary(&after.spans), vec![(5, 9, EntityType::Person, "local-model")]);
    assert_eq!(local.call_count(), 1);
    assert_eq!(on_device.call_count(), 1);
}

#[tokio::test]
async fn test_cancellation_abandons_provider() {
    let env = Arc::new(Environment::default());
    let hanging = Arc::new(HangingSource::new("hanging", 100));
    let orchestrator = orchestrator(vec![hanging.clone()], &env, ExecutionMode::Sequential);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let result = orchestrator.resolve_cancellable(CALL_TEXT, &cancel).await;

    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(hanging.call_count(), 1);
    assert!(hanging.was_abandoned());
}

#[tokio::test]
async fn test_uncancelled_request_completes() {
    let env = Arc::new(Environment::default());
    let a = Arc::new(MockSource::new("a", 100).with_spans(vec![(5, 9, EntityType::Person)]));
    let orchestrator = orchestrator(vec![a], &env, ExecutionMode::Sequential);

    let result = orchestrator
        .resolve_cancellable(CALL_TEXT, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.spans.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_are_independent() {
    let env = Arc::new(Environment::default());
    let source = Arc::new(
        MockSource::new("shared", 100)
            .with_latency(Duration::from_millis(5))
            .with_spans(vec![(0, 4, EntityType::Person)]),
    );
    let orchestrator = Arc::new(orchestrator(vec![source.clone()], &env, ExecutionMode::Sequential));

    let messages: Vec<String> = (0..32).map(|i| format!("N{:03} says hi", i)).collect();
    let results = join_all(messages.iter().map(|message| {
        let orchestrator = Arc::clone(&orchestrator);
        let message = message.clone();
        tokio::spawn(async move { orchestrator.resolve_annotations(&message).await })
    }))
    .await;

    assert_eq!(source.call_count(), 32);
    for (message, result) in messages.iter().zip(results) {
        let result = result.unwrap();
        assert_eq!(result.spans.len(), 1);
        assert_eq!(result.spans[0].text(), &message[..4]);
    }
}
