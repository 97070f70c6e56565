use crate::support::{init_tracing, RecordingSink, ScriptedSource};
use pagedrain::{CapabilityStage, DrainPipeline, FetchOptions, QueueOptions, RunError};
use std::time::Duration;

#[tokio::test(flavor = "multi_thread")]
async fn sink_failure_aborts_the_run() {
    init_tracing();

    let fetch_options = FetchOptions::builder().limit(5).build().unwrap();
    let pipeline = DrainPipeline::new(fetch_options, QueueOptions::default());

    let sink = RecordingSink::new().failing_at(7);
    let seen = sink.seen();

    let failure = pipeline
        .run(ScriptedSource::new(20), sink)
        .await
        .unwrap_err();

    assert_eq!(failure.processed, 7);
    assert_eq!(*seen.lock().unwrap(), (0..7).collect::<Vec<u64>>());

    match failure.error {
        RunError::Capability(err) => {
            assert_eq!(err.stage(), CapabilityStage::Process);
            let payload = err.into_source();
            assert!(
                payload.to_string().contains("scripted process failure at item 7"),
                "sink errors must reach the caller verbatim: {payload}"
            );
        }
        other => panic!("expected a process capability error, got {other}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn fetch_failure_aborts_the_run() {
    init_tracing();

    let fetch_options = FetchOptions::builder().limit(5).build().unwrap();
    let pipeline = DrainPipeline::new(fetch_options, QueueOptions::default());
    let telemetry = pipeline.telemetry();

    let source = ScriptedSource::new(20).failing_at(5);

    let failure = pipeline
        .run(source, RecordingSink::new())
        .await
        .unwrap_err();

    match &failure.error {
        RunError::Capability(err) => assert_eq!(err.stage(), CapabilityStage::Fetch),
        other => panic!("expected a fetch capability error, got {other}"),
    }
    assert_eq!(telemetry.snapshot().fetch_errors, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_source_is_fatal() {
    init_tracing();

    let pipeline = DrainPipeline::default();

    let failure = pipeline
        .run(ScriptedSource::new(0), RecordingSink::new())
        .await
        .unwrap_err();

    assert!(
        matches!(failure.error, RunError::SourceEmpty),
        "got {}",
        failure.error
    );
    assert_eq!(failure.fetched, 0);
    assert_eq!(failure.processed, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn runtime_budget_times_the_run_out() {
    init_tracing();

    let fetch_options = FetchOptions::builder().limit(10).build().unwrap();
    let queue_options = QueueOptions::builder()
        .max_runtime(Duration::from_millis(200))
        .process_delay(Duration::from_millis(20))
        .build()
        .unwrap();
    let pipeline = DrainPipeline::new(fetch_options, queue_options);

    let sink = RecordingSink::new();
    let failure = pipeline
        .run(ScriptedSource::new(100), sink)
        .await
        .unwrap_err();

    match failure.error {
        RunError::Timeout { budget } => assert_eq!(budget, Duration::from_millis(200)),
        other => panic!("expected a timeout, got {other}"),
    }
    assert!(
        failure.processed < 100,
        "run should not have completed: processed {}",
        failure.processed
    );
}
