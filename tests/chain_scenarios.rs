//! End-to-end delivery chain scenarios

use cdchain::prelude::*;
use cdchain::services::StageDeps;
use cdchain::{EventHistory, RepositoryService};
use futures::FutureExt;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::Arc;

const REPO: &str = "https://git.example.com/my-org/my-app";
const SHA: &str = "abc123def456";

fn orchestrator(outcome: ScanOutcome) -> PipelineOrchestrator {
    let config = Config::default()
        .without_delays()
        .with_scan_outcome(outcome);
    PipelineOrchestrator::with_id_generator(config, Arc::new(SequentialIdGenerator::new("evt")))
}

fn types_of(history: &EventHistory, chain_id: &str) -> Vec<String> {
    history
        .for_chain(chain_id)
        .iter()
        .map(|e| e.event_type().to_string())
        .collect()
}

#[tokio::test]
async fn happy_path_emits_four_events_on_one_chain() {
    let orchestrator = orchestrator(ScanOutcome::Pass);
    let report = orchestrator.run_pipeline(REPO, SHA).await.unwrap();

    let history = orchestrator.history();
    assert_eq!(history.len(), 4);
    assert_eq!(
        types_of(history, &report.chain_id),
        vec![
            REPOSITORY_MODIFIED,
            BUILD_FINISHED,
            TESTSUITERUN_FINISHED,
            SERVICE_DEPLOYED
        ]
    );

    let events = history.snapshot();
    assert!(events.iter().all(|e| e.chain_id() == report.chain_id));
    let ids: HashSet<&str> = events.iter().map(|e| e.id()).collect();
    assert_eq!(ids.len(), 4);

    let built = report.content_of(BUILD_FINISHED, "artifactId").unwrap();
    assert_eq!(report.content_of(SERVICE_DEPLOYED, "artifactId"), Some(built));
    assert_eq!(
        report
            .content_of(SERVICE_DEPLOYED, "environment")
            .and_then(|env| env.get("id")),
        Some(&serde_json::json!("staging"))
    );
    assert_eq!(
        report.content_of(TESTSUITERUN_FINISHED, "outcome"),
        Some(&serde_json::json!("pass"))
    );
    assert!(report.is_deployed());
}

#[tokio::test]
async fn failed_scan_halts_after_three_events() {
    let orchestrator = orchestrator(ScanOutcome::Fail);
    let report = orchestrator.run_pipeline(REPO, SHA).await.unwrap();

    assert_eq!(
        types_of(orchestrator.history(), &report.chain_id),
        vec![REPOSITORY_MODIFIED, BUILD_FINISHED, TESTSUITERUN_FINISHED]
    );
    assert!(
        orchestrator
            .history()
            .snapshot()
            .iter()
            .all(|e| e.event_type() != SERVICE_DEPLOYED)
    );
    assert!(report.is_halted_at_scan());
    assert_eq!(
        orchestrator.monitor().state(&report.chain_id),
        Some(ChainState::Scanned(ScanOutcome::Fail))
    );
}

#[tokio::test]
async fn concurrent_chains_keep_their_own_chain_id() {
    let mut config = Config::default().with_scan_outcome(ScanOutcome::Pass);
    config.delays.build_ms = 5;
    config.delays.scan_ms = 5;
    config.delays.deploy_ms = 5;
    let orchestrator = PipelineOrchestrator::new(config);

    let pushes = vec![
        (REPO.to_string(), "aaa111".to_string()),
        ("https://git.example.com/my-org/other-app".to_string(), "bbb222".to_string()),
    ];
    let reports: Vec<ChainReport> = orchestrator
        .run_chains(&pushes)
        .await
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(reports.len(), 2);
    assert_ne!(reports[0].chain_id, reports[1].chain_id);
    assert_eq!(orchestrator.history().len(), 8);

    for report in &reports {
        assert!(report.is_deployed());
        assert_eq!(report.events.len(), 4);
        assert!(report.events.iter().all(|e| e.chain_id() == report.chain_id));
    }

    let first_push = &reports[0].events[0];
    assert_eq!(first_push.subject().id(), "repo/aaa111");
    let other_artifact = reports[1]
        .content_of(SERVICE_DEPLOYED, "artifactId")
        .and_then(|v| v.as_str())
        .unwrap();
    assert!(other_artifact.starts_with("pkg:oci/other-app@sha256:"));
    assert_eq!(orchestrator.metrics().deployed_count(), 2);
}

#[tokio::test]
async fn late_wildcard_sees_nested_events_deepest_first() {
    let orchestrator = orchestrator(ScanOutcome::Pass);
    orchestrator.initialize();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let only_builds = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        orchestrator.broker().subscribe(
            &[WILDCARD],
            handler_fn("recorder", move |event| {
                seen.lock().push(event.id().to_string());
                async { Ok::<(), HandlerError>(()) }.boxed()
            }),
        );
    }
    {
        let only_builds = Arc::clone(&only_builds);
        orchestrator.broker().subscribe(
            &[BUILD_FINISHED],
            handler_fn("build-only", move |event| {
                only_builds.lock().push(event.event_type().to_string());
                async { Ok::<(), HandlerError>(()) }.boxed()
            }),
        );
    }

    let report = orchestrator.run_pipeline(REPO, SHA).await.unwrap();
    assert!(report.is_deployed());

    // The stages publish nested, so a late wildcard sees the deepest event first
    let mut expected: Vec<String> = orchestrator
        .history()
        .snapshot()
        .iter()
        .map(|e| e.id().to_string())
        .collect();
    expected.reverse();
    assert_eq!(*seen.lock(), expected);
    assert_eq!(*only_builds.lock(), vec![BUILD_FINISHED.to_string()]);
}

#[tokio::test]
async fn monitor_observes_events_in_publish_order() {
    let orchestrator = orchestrator(ScanOutcome::Pass);
    let report = orchestrator.run_pipeline(REPO, SHA).await.unwrap();

    assert_eq!(
        orchestrator.monitor().state(&report.chain_id),
        Some(ChainState::Deployed)
    );
    let metrics = orchestrator.metrics().get(&report.chain_id).unwrap();
    assert_eq!(metrics.event_count, 4);
}

#[tokio::test]
async fn standalone_wildcard_receives_all_types_in_order() {
    let broker = Arc::new(InMemoryEventBroker::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        broker.subscribe(
            &[WILDCARD],
            handler_fn("recorder", move |event| {
                seen.lock().push(event.event_type().to_string());
                async { Ok::<(), HandlerError>(()) }.boxed()
            }),
        );
    }

    let ids = SequentialIdGenerator::new("w");
    for event_type in [SERVICE_DEPLOYED, REPOSITORY_MODIFIED, "dev.cdevents.incident.detected.0.1.0"] {
        let context = Context::builder("/test", event_type)
            .build(&ids)
            .unwrap();
        let subject = Subject::new("s/1", "/test", SubjectType::Incident, Content::new());
        broker
            .publish(CdEvent::new(context, subject).unwrap())
            .await
            .unwrap();
    }

    assert_eq!(
        *seen.lock(),
        vec![
            SERVICE_DEPLOYED.to_string(),
            REPOSITORY_MODIFIED.to_string(),
            "dev.cdevents.incident.detected.0.1.0".to_string()
        ]
    );
}

#[tokio::test]
async fn failing_subscriber_surfaces_to_the_trigger() {
    let orchestrator = orchestrator(ScanOutcome::Pass);
    orchestrator.initialize();
    orchestrator.broker().subscribe(
        &[TESTSUITERUN_FINISHED],
        handler_fn("broken", |_| {
            async { Err::<(), _>(HandlerError::Failed("boom".to_string())) }.boxed()
        }),
    );

    let err = orchestrator.trigger(REPO, SHA).await.unwrap_err();
    assert!(matches!(err, PipelineError::ChainFailed { .. }));
    // Deployment ran before the broken handler was reached
    assert_eq!(orchestrator.history().len(), 4);
}

#[tokio::test]
async fn isolate_policy_keeps_the_chain_going() {
    let mut config = Config::default().without_delays();
    config.dispatch_policy = DispatchPolicy::Isolate;
    let orchestrator = PipelineOrchestrator::new(config);
    orchestrator.initialize();
    orchestrator.broker().subscribe(
        &[REPOSITORY_MODIFIED],
        handler_fn("broken", |_| {
            async { Err::<(), _>(HandlerError::Failed("boom".to_string())) }.boxed()
        }),
    );

    let report = orchestrator.run_pipeline(REPO, SHA).await.unwrap();
    assert!(report.is_deployed());
}

#[tokio::test]
async fn history_distinguishes_never_left_pushed() {
    // Only the repository stage: the push is recorded and nothing follows
    let broker = Arc::new(InMemoryEventBroker::new());
    let deps = StageDeps::new(
        Arc::clone(&broker) as Arc<dyn EventBroker>,
        Arc::new(SequentialIdGenerator::new("p")),
    );
    let chain_id = RepositoryService::new(deps)
        .simulate_code_push(REPO, SHA)
        .await
        .unwrap();

    let report = ChainReport::new(chain_id.as_str(), broker.history().for_chain(&chain_id));
    assert_eq!(report.state, Some(ChainState::Pushed));
    assert!(!report.is_terminal());
    assert!(!report.is_deployed());
    assert!(!report.is_halted_at_scan());
}
