//! Behavioural guarantees of the instrumented pipeline.

use std::time::Duration;

use weather_telemetry::observability::metrics::names;
use weather_telemetry::observability::{LabelSet, SpanStatus, TagValue};
use weather_telemetry::resilience::{FaultInjector, FaultProfile};
use weather_telemetry::Error;

mod common;

fn labels() -> LabelSet {
    LabelSet::request("GET", "/x")
}

async fn explode() -> Result<(), Error> {
    panic!("work exploded")
}

#[tokio::test]
async fn test_success_scenario() {
    let (pipeline, buffer) = common::pipeline(common::no_faults());

    let result: Result<_, Error> = pipeline.run("op", &labels(), || async { Ok(5) }).await;
    assert_eq!(result.unwrap(), 5);

    let spans = buffer.finished();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].name, "op");
    assert_eq!(spans[0].status, SpanStatus::Ok);
    assert_eq!(spans[0].tag("count"), Some(&TagValue::Int(5)));

    let metrics = pipeline.metrics();
    assert_eq!(metrics.counter(names::REQUESTS_TOTAL, &labels()).get(), 1);
    let durations = metrics.histogram(names::REQUEST_DURATION_SECONDS, &LabelSet::new());
    assert_eq!(durations.count(), 1);
    assert!(durations.sum() >= 0.0);
    assert_eq!(metrics.gauge(names::ACTIVE_REQUESTS, &LabelSet::new()).get(), 0);
}

#[tokio::test]
async fn test_injected_failure_scenario() {
    let (pipeline, buffer) = common::pipeline(common::always_fail());
    let ran = std::sync::atomic::AtomicBool::new(false);

    let result: Result<u64, Error> = pipeline
        .run("op", &labels(), || async {
            ran.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(5)
        })
        .await;

    let err = result.unwrap_err();
    assert!(err.is_injected_fault());
    assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));

    let spans = buffer.finished();
    assert_eq!(spans.len(), 1);
    assert!(spans[0].status.is_error());

    let metrics = pipeline.metrics();
    assert_eq!(metrics.counter(names::REQUESTS_TOTAL, &labels()).get(), 1);
    assert_eq!(metrics.counter(names::REQUEST_ERRORS_TOTAL, &labels()).get(), 1);
    assert_eq!(metrics.gauge(names::ACTIVE_REQUESTS, &LabelSet::new()).get(), 0);
}

#[tokio::test]
async fn test_one_span_per_run_including_failures() {
    let (pipeline, buffer) = common::pipeline(common::no_faults());

    let ok: Result<(), Error> = pipeline.run("ok", &labels(), || async { Ok(()) }).await;
    let failed: Result<(), Error> = pipeline
        .run("failed", &labels(), || async {
            Err(Error::Io(std::io::Error::other("disk")))
        })
        .await;
    assert!(ok.is_ok());
    assert!(failed.is_err());

    let stats = pipeline.spans().stats();
    assert_eq!(stats.opened, 2);
    assert_eq!(stats.closed, 2);
    assert_eq!(buffer.named("ok").len(), 1);
    assert_eq!(buffer.named("failed").len(), 1);
    assert_eq!(buffer.named("failed")[0].status, SpanStatus::Error("I/O error: disk".into()));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_during_delay_balances_gauge() {
    let slow = FaultProfile {
        min_latency_ms: 10_000,
        max_latency_ms: 10_000,
        failure_probability: 0.0,
        ..FaultProfile::default()
    };
    let (pipeline, buffer) = common::pipeline(slow);

    let labels = labels();
    let run = pipeline.run("op", &labels, || async { Ok::<_, Error>(()) });
    let outcome = tokio::time::timeout(Duration::from_millis(50), run).await;
    assert!(outcome.is_err(), "the injected delay outlasts the timeout");

    let metrics = pipeline.metrics();
    assert_eq!(metrics.gauge(names::ACTIVE_REQUESTS, &LabelSet::new()).get(), 0);
    assert_eq!(
        metrics.histogram(names::REQUEST_DURATION_SECONDS, &LabelSet::new()).count(),
        1
    );

    let stats = pipeline.spans().stats();
    assert_eq!(stats.opened, stats.closed);
    assert_eq!(buffer.finished()[0].status, SpanStatus::Error("cancelled".into()));
}

#[tokio::test]
async fn test_panicking_work_balances_gauge() {
    let (pipeline, buffer) = common::pipeline(common::no_faults());

    let task_pipeline = pipeline.clone();
    let joined = tokio::spawn(async move {
        let _: Result<(), Error> = task_pipeline
            .run("op", &labels(), explode)
            .await;
    })
    .await;
    assert!(joined.unwrap_err().is_panic());

    let metrics = pipeline.metrics();
    assert_eq!(metrics.gauge(names::ACTIVE_REQUESTS, &LabelSet::new()).get(), 0);
    assert_eq!(buffer.finished()[0].status, SpanStatus::Error("panicked".into()));
}

#[tokio::test]
async fn test_zero_probability_never_faults() {
    let (pipeline, _buffer) = common::pipeline(common::no_faults());
    for _ in 0..200 {
        let result: Result<(), Error> = pipeline.run("op", &labels(), || async { Ok(()) }).await;
        assert!(result.is_ok());
    }
    assert_eq!(pipeline.metrics().counter(names::REQUEST_ERRORS_TOTAL, &labels()).get(), 0);
}

#[tokio::test]
async fn test_certain_probability_always_faults() {
    let (pipeline, _buffer) = common::pipeline(common::always_fail());
    for _ in 0..200 {
        let result: Result<(), Error> = pipeline.run("op", &labels(), || async { Ok(()) }).await;
        assert!(result.unwrap_err().is_injected_fault());
    }
    assert_eq!(pipeline.metrics().counter(names::REQUEST_ERRORS_TOTAL, &labels()).get(), 200);
}

#[test]
fn test_seeded_decisions_are_reproducible() {
    let a = FaultInjector::seeded(FaultProfile::default(), 1234).unwrap();
    let b = FaultInjector::seeded(FaultProfile::default(), 1234).unwrap();

    let first: Vec<_> = (0..50).map(|_| a.decide()).collect();
    let second: Vec<_> = (0..50).map(|_| b.decide()).collect();
    assert_eq!(first, second);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_runs_count_exactly() {
    let (pipeline, buffer) = common::pipeline(common::no_faults());

    let tasks: Vec<_> = (0..100)
        .map(|i| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                pipeline
                    .run("op", &labels(), || async move {
                        tokio::task::yield_now().await;
                        Ok::<_, Error>(i as u64)
                    })
                    .await
            })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }

    let metrics = pipeline.metrics();
    assert_eq!(metrics.counter(names::REQUESTS_TOTAL, &labels()).get(), 100);
    assert_eq!(metrics.counter(names::SECONDARY_REQUESTS_TOTAL, &labels()).get(), 100);
    assert_eq!(metrics.gauge(names::ACTIVE_REQUESTS, &LabelSet::new()).get(), 0);
    assert_eq!(buffer.len(), 100);

    let stats = pipeline.spans().stats();
    assert_eq!(stats.opened, 100);
    assert_eq!(stats.closed, 100);
}
