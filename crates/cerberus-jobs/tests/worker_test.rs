//! Trigger worker: event path, reconciliation poll, and shutdown.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value as JsonValue;

use cerberus_core::{ArtifactEvent, ArtifactRepository, EventBus, EventEnvelope, ProcessingStatus};
use cerberus_inference::mock::MockAnalysisBackend;
use cerberus_jobs::{ExtractorRegistry, TextExtractor, TriggerWorker, WorkerBuilder, WorkerConfig, WorkerEvent};

use common::{wait_for_event, Harness};

const WAIT: Duration = Duration::from_secs(5);

fn worker(h: &Harness, analysis: MockAnalysisBackend, config: WorkerConfig) -> TriggerWorker {
    let mut registry = ExtractorRegistry::new();
    registry.register(Arc::new(TextExtractor));
    WorkerBuilder::new(h.orchestrator(registry, analysis), h.bus.clone())
        .with_config(config)
        .build()
}

fn quiet_poll() -> WorkerConfig {
    WorkerConfig::default().with_poll_interval(Duration::from_secs(3600))
}

fn uploaded(h: &Harness, artifact_id: uuid::Uuid, correlation_id: &str) -> EventEnvelope {
    EventEnvelope::from_event(&ArtifactEvent::Uploaded {
        artifact_id,
        program_id: h.program_id,
    })
    .unwrap()
    .with_source("api")
    .with_correlation_id(Some(correlation_id.to_string()))
}

#[tokio::test]
async fn test_event_path_processes_upload() {
    let h = Harness::new();
    let worker = worker(&h, MockAnalysisBackend::new(), quiet_poll());
    let mut events = worker.events();
    let mut tap = h.bus.tap();

    let handle = worker.start().await.unwrap();
    // The first poll runs immediately and finds nothing.
    wait_for_event(&mut events, WAIT, |e| {
        matches!(e, WorkerEvent::PollTick { pending: 0 })
    })
    .await;

    let artifact = h.add_artifact("memo.txt", "text/plain", b"Board memo: approve budget.");
    h.bus
        .publish(uploaded(&h, artifact.artifact_id, "req-77"))
        .await
        .unwrap();

    let claimed = wait_for_event(&mut events, WAIT, |e| {
        matches!(e, WorkerEvent::ArtifactClaimed { .. })
    })
    .await;
    assert_eq!(
        claimed,
        WorkerEvent::ArtifactClaimed {
            artifact_id: artifact.artifact_id,
            trigger: "event",
        }
    );
    wait_for_event(&mut events, WAIT, |e| {
        *e == WorkerEvent::ArtifactCompleted {
            artifact_id: artifact.artifact_id,
        }
    })
    .await;
    assert_eq!(
        h.store.status(artifact.artifact_id),
        ProcessingStatus::Completed
    );

    // The analyzed event carries the upload's correlation ID.
    let analyzed = tokio::time::timeout(WAIT, async {
        loop {
            let envelope = tap.recv().await.unwrap();
            if envelope.event_type == "artifact.analyzed" {
                return envelope;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(analyzed.correlation_id.as_deref(), Some("req-77"));

    let mut after = handle.events();
    handle.shutdown().await;
    wait_for_event(&mut after, WAIT, |e| *e == WorkerEvent::WorkerStopped).await;
}

#[tokio::test]
async fn test_poll_path_processes_without_events() {
    let h = Harness::new();
    let first = h.add_artifact_aged("a.txt", "text/plain", b"first", 20);
    let second = h.add_artifact_aged("b.txt", "text/plain", b"second", 10);

    let worker = worker(
        &h,
        MockAnalysisBackend::new(),
        WorkerConfig::default().with_poll_interval(Duration::from_millis(50)),
    );
    let mut events = worker.events();
    let handle = worker.start().await.unwrap();

    let mut done = HashSet::new();
    while done.len() < 2 {
        match wait_for_event(&mut events, WAIT, |e| {
            matches!(
                e,
                WorkerEvent::ArtifactClaimed { .. } | WorkerEvent::ArtifactCompleted { .. }
            )
        })
        .await
        {
            WorkerEvent::ArtifactClaimed { trigger, .. } => assert_eq!(trigger, "poll"),
            WorkerEvent::ArtifactCompleted { artifact_id } => {
                done.insert(artifact_id);
            }
            _ => unreachable!(),
        }
    }
    handle.shutdown().await;

    assert!(done.contains(&first.artifact_id));
    assert!(done.contains(&second.artifact_id));
    assert_eq!(h.store.count_with_status(ProcessingStatus::Completed), 2);
}

#[tokio::test]
async fn test_poll_once_respects_batch_size() {
    let h = Harness::new();
    for i in 0..25 {
        h.add_artifact_aged(
            &format!("doc-{}.txt", i),
            "text/plain",
            format!("document number {}", i).as_bytes(),
            100 - i,
        );
    }

    let analysis = MockAnalysisBackend::new();
    let worker = worker(
        &h,
        analysis.clone(),
        WorkerConfig::default()
            .with_poll_batch_size(10)
            .with_max_concurrent(3),
    );

    assert_eq!(worker.poll_once().await.unwrap(), 10);
    assert_eq!(analysis.call_count(), 10);
    assert_eq!(h.store.count_with_status(ProcessingStatus::Completed), 10);
    assert_eq!(h.store.count_with_status(ProcessingStatus::Pending), 15);

    // Oldest uploads go first.
    let analyzed: HashSet<String> = analysis.get_calls().into_iter().map(|c| c.input).collect();
    for i in 0..10 {
        assert!(analyzed.contains(&format!("document number {}", i)));
    }

    assert_eq!(worker.poll_once().await.unwrap(), 10);
    assert_eq!(worker.poll_once().await.unwrap(), 5);
    assert_eq!(worker.poll_once().await.unwrap(), 0);
    assert_eq!(h.store.count_with_status(ProcessingStatus::Completed), 25);
}

#[tokio::test]
async fn test_malformed_event_does_not_stop_dispatch() {
    let h = Harness::new();
    let worker = worker(&h, MockAnalysisBackend::new(), quiet_poll());
    let mut events = worker.events();
    let handle = worker.start().await.unwrap();

    let artifact = h.add_artifact("ok.txt", "text/plain", b"valid upload");

    let mut garbage = uploaded(&h, artifact.artifact_id, "req-bad");
    garbage
        .payload
        .insert("artifact_id".into(), JsonValue::String("not-a-uuid".into()));
    h.bus.publish(garbage).await.unwrap();

    // Unknown artifact: handler errors, dispatch continues.
    h.bus
        .publish(uploaded(&h, uuid::Uuid::new_v4(), "req-ghost"))
        .await
        .unwrap();

    h.bus
        .publish(uploaded(&h, artifact.artifact_id, "req-good"))
        .await
        .unwrap();

    wait_for_event(&mut events, WAIT, |e| {
        *e == WorkerEvent::ArtifactCompleted {
            artifact_id: artifact.artifact_id,
        }
    })
    .await;
    handle.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_event_and_poll_analyze_once() {
    let h = Harness::new();
    let artifact = h.add_artifact("dup.txt", "text/plain", b"delivered twice");
    let analysis = MockAnalysisBackend::new().with_latency(Duration::from_millis(50));
    let worker = worker(
        &h,
        analysis.clone(),
        WorkerConfig::default().with_poll_interval(Duration::from_millis(20)),
    );
    let mut events = worker.events();

    h.bus
        .publish(uploaded(&h, artifact.artifact_id, "req-1"))
        .await
        .unwrap();
    h.bus
        .publish(uploaded(&h, artifact.artifact_id, "req-1"))
        .await
        .unwrap();
    let handle = worker.start().await.unwrap();

    wait_for_event(&mut events, WAIT, |e| {
        *e == WorkerEvent::ArtifactCompleted {
            artifact_id: artifact.artifact_id,
        }
    })
    .await;
    // Let the remaining trigger attempts run into the claim.
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.shutdown().await;

    assert_eq!(analysis.call_count(), 1);
    assert_eq!(h.store.replace_calls(), 1);
}

#[tokio::test]
async fn test_shutdown_is_bounded_by_grace() {
    let h = Harness::new();
    let artifact = h.add_artifact("slow.txt", "text/plain", b"takes forever");
    let worker = worker(
        &h,
        MockAnalysisBackend::new().with_latency(Duration::from_secs(60)),
        WorkerConfig::default()
            .with_poll_interval(Duration::from_millis(10))
            .with_shutdown_grace(Duration::from_millis(200)),
    );
    let mut events = worker.events();
    let handle = worker.start().await.unwrap();

    wait_for_event(&mut events, WAIT, |e| {
        matches!(e, WorkerEvent::ArtifactClaimed { .. })
    })
    .await;

    let mut after = handle.events();
    let started = Instant::now();
    handle.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(2));

    // Abandoned mid-analysis: failed, not left processing.
    let stored = h.store.artifact(artifact.artifact_id);
    assert_eq!(stored.processing_status, ProcessingStatus::Failed);
    assert_eq!(stored.processing_error.as_deref(), Some("interrupted by shutdown"));
    assert!(h.store.analysis(artifact.artifact_id).is_none());
    assert!(worker.orchestrator().in_flight().is_empty());
    wait_for_event(&mut after, WAIT, |e| {
        matches!(e, WorkerEvent::ArtifactFailed { artifact_id, .. } if *artifact_id == artifact.artifact_id)
    })
    .await;

    // Reanalysis recovers it for the next poll.
    assert!(worker
        .orchestrator()
        .request_reanalysis(artifact.artifact_id)
        .await
        .unwrap());
    let pending = h.store.list_pending(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].artifact_id, artifact.artifact_id);
}

#[tokio::test]
async fn test_shutdown_within_grace_fails_nothing() {
    let h = Harness::new();
    let artifact = h.add_artifact("quick.txt", "text/plain", b"done in time");
    let worker = worker(
        &h,
        MockAnalysisBackend::new().with_latency(Duration::from_millis(50)),
        WorkerConfig::default()
            .with_poll_interval(Duration::from_millis(10))
            .with_shutdown_grace(Duration::from_secs(5)),
    );
    let mut events = worker.events();
    let handle = worker.start().await.unwrap();

    wait_for_event(&mut events, WAIT, |e| {
        matches!(e, WorkerEvent::ArtifactClaimed { .. })
    })
    .await;
    handle.shutdown().await;

    // The poll batch finished inside the grace period.
    assert_eq!(
        h.store.status(artifact.artifact_id),
        ProcessingStatus::Completed
    );
    assert!(worker.orchestrator().in_flight().is_empty());
}

#[tokio::test]
async fn test_event_path_respects_max_concurrent() {
    let h = Harness::new();
    let analysis = MockAnalysisBackend::new().with_latency(Duration::from_millis(100));
    let worker = worker(&h, analysis.clone(), quiet_poll().with_max_concurrent(2));
    let mut events = worker.events();
    let handle = worker.start().await.unwrap();
    wait_for_event(&mut events, WAIT, |e| {
        matches!(e, WorkerEvent::PollTick { pending: 0 })
    })
    .await;

    let started = Instant::now();
    let mut ids = HashSet::new();
    for i in 0..6 {
        let artifact = h.add_artifact(
            &format!("burst-{}.txt", i),
            "text/plain",
            format!("burst upload {}", i).as_bytes(),
        );
        ids.insert(artifact.artifact_id);
        h.bus
            .publish(uploaded(&h, artifact.artifact_id, "req-burst"))
            .await
            .unwrap();
    }

    let mut done = HashSet::new();
    while done.len() < ids.len() {
        if let WorkerEvent::ArtifactCompleted { artifact_id } = wait_for_event(&mut events, WAIT, |e| {
            matches!(e, WorkerEvent::ArtifactCompleted { .. })
        })
        .await
        {
            done.insert(artifact_id);
        }
    }
    // Six runs of 100ms, two at a time.
    assert!(started.elapsed() >= Duration::from_millis(280));
    assert_eq!(done, ids);
    assert_eq!(analysis.call_count(), 6);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_disabled_worker_does_nothing() {
    let h = Harness::new();
    let artifact = h.add_artifact("idle.txt", "text/plain", b"left alone");
    let analysis = MockAnalysisBackend::new();
    let worker = worker(
        &h,
        analysis.clone(),
        WorkerConfig::default()
            .with_enabled(false)
            .with_poll_interval(Duration::from_millis(10)),
    );

    let handle = worker.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.shutdown().await;

    assert_eq!(analysis.call_count(), 0);
    assert_eq!(
        h.store.status(artifact.artifact_id),
        ProcessingStatus::Pending
    );
}
