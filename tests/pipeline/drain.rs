use crate::support::{init_tracing, PagedScriptedSource, RecordingSink, ScriptedSource};
use pagedrain::{DrainPipeline, FetchFuture, FetchOptions, FetchedPage, QueueOptions};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread")]
async fn sequential_run_drains_the_whole_source() {
    init_tracing();

    let fetch_options = FetchOptions::builder().limit(5).build().unwrap();
    let queue_options = QueueOptions::builder().build().unwrap();
    let mut pipeline = DrainPipeline::new(fetch_options, queue_options);
    let mut progress = pipeline.progress_channel();

    let source = ScriptedSource::new(10);
    let cursors = source.cursors();
    let sink = RecordingSink::new();
    let seen = sink.seen();

    let report = pipeline.run(source, sink).await.unwrap();
    assert_eq!(report.fetched, 10);
    assert_eq!(report.processed, 10);

    assert_eq!(*cursors.lock().unwrap(), vec![0, 5]);
    assert_eq!(*seen.lock().unwrap(), (0..10).collect::<Vec<u64>>());

    let mut processed_counts = Vec::new();
    while let Ok(update) = progress.try_recv() {
        processed_counts.push(update.processed);
    }
    assert_eq!(processed_counts, (1..=10).collect::<Vec<u64>>());
}

#[tokio::test(flavor = "multi_thread")]
async fn array_mode_never_fetches() {
    init_tracing();

    let pipeline = DrainPipeline::default();
    let sink = RecordingSink::new();
    let seen = sink.seen();

    let report = pipeline
        .run_items(vec![3, 1, 4, 1, 5, 9, 2], sink)
        .await
        .unwrap();
    assert_eq!(report.fetched, 7);
    assert_eq!(report.processed, 7);
    assert_eq!(*seen.lock().unwrap(), vec![3, 1, 4, 1, 5, 9, 2]);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_array_resolves_immediately() {
    init_tracing();

    let mut pipeline = DrainPipeline::default();
    let mut progress = pipeline.progress_channel();

    let report = pipeline
        .run_items(Vec::<u64>::new(), RecordingSink::new())
        .await
        .unwrap();
    assert_eq!(report.fetched, 0);
    assert_eq!(report.processed, 0);
    assert_eq!(report.elapsed, Duration::ZERO);
    assert!(progress.try_recv().is_err(), "no items, no progress");
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_fetches_cover_every_cursor_once() {
    init_tracing();

    let fetch_options = FetchOptions::builder().limit(5).build().unwrap();
    let queue_options = QueueOptions::builder().request_limit(3).build().unwrap();
    let pipeline = DrainPipeline::new(fetch_options, queue_options);

    let source = ScriptedSource::new(30).with_latency(Duration::from_millis(20));
    let cursors = source.cursors();
    let sink = RecordingSink::new();
    let seen = sink.seen();

    let report = pipeline.run(source, sink).await.unwrap();
    assert_eq!(report.processed, 30);

    let mut issued = cursors.lock().unwrap().clone();
    issued.sort_unstable();
    assert_eq!(issued, vec![0, 5, 10, 15, 20, 25]);

    let mut items = seen.lock().unwrap().clone();
    items.sort_unstable();
    assert_eq!(items, (0..30).collect::<Vec<u64>>());
}

#[tokio::test(flavor = "multi_thread")]
async fn paged_mode_walks_page_indices() {
    init_tracing();

    let fetch_options = FetchOptions::builder()
        .limit(4)
        .paged(true)
        .build()
        .unwrap();
    let pipeline = DrainPipeline::new(fetch_options, QueueOptions::default());

    let source = PagedScriptedSource::new(3, 4);
    let cursors = source.cursors();
    let sink = RecordingSink::new();
    let seen = sink.seen();

    let report = pipeline.run(source, sink).await.unwrap();
    // Page-index cursors, with one probe past the last page.
    assert_eq!(*cursors.lock().unwrap(), vec![0, 1, 2, 3]);
    assert_eq!(report.fetched, 3);
    assert_eq!(report.processed, 12);
    assert_eq!(*seen.lock().unwrap(), (0..12).collect::<Vec<u64>>());
}

#[tokio::test(flavor = "multi_thread")]
async fn max_limit_caps_a_larger_source() {
    init_tracing();

    let fetch_options = FetchOptions::builder()
        .limit(10)
        .max_limit(30)
        .build()
        .unwrap();
    let pipeline = DrainPipeline::new(fetch_options, QueueOptions::default());

    let source = ScriptedSource::new(100);
    let cursors = source.cursors();
    let sink = RecordingSink::new();
    let seen = sink.seen();

    let report = pipeline.run(source, sink).await.unwrap();
    assert_eq!(report.processed, 30);
    assert_eq!(*cursors.lock().unwrap(), vec![0, 10, 20]);
    assert_eq!(*seen.lock().unwrap(), (0..30).collect::<Vec<u64>>());
}

#[tokio::test(flavor = "multi_thread")]
async fn forced_total_skips_discovery() {
    init_tracing();

    let fetch_options = FetchOptions::builder()
        .limit(5)
        .total(10)
        .build()
        .unwrap();
    let pipeline = DrainPipeline::new(fetch_options, QueueOptions::default());

    // The source believes it holds 100 items; the forced total wins.
    let source = ScriptedSource::new(100);
    let cursors = source.cursors();
    let sink = RecordingSink::new();

    let report = pipeline.run(source, sink).await.unwrap();
    assert_eq!(report.fetched, 10);
    assert_eq!(report.processed, 10);
    assert_eq!(*cursors.lock().unwrap(), vec![0, 5]);
}

#[tokio::test(flavor = "multi_thread")]
async fn shrinking_total_finishes_at_the_new_target() {
    init_tracing();

    let fetch_options = FetchOptions::builder().limit(10).build().unwrap();
    let queue_options = QueueOptions::builder().processing_limit(10).build().unwrap();
    let mut pipeline = DrainPipeline::new(fetch_options, queue_options);
    let mut progress = pipeline.progress_channel();

    // The first page claims 20 items; the next response revises the total
    // down to 5 while all ten delivered items are still in flight.
    let calls = Arc::new(AtomicU64::new(0));
    let source = {
        let calls = Arc::clone(&calls);
        move |limit: usize, cursor: u64| -> FetchFuture<u64> {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if call == 0 {
                    Ok(FetchedPage::new(20, (cursor..cursor + limit as u64).collect()))
                } else {
                    Ok(FetchedPage::new(5, Vec::new()))
                }
            })
        }
    };
    let sink = RecordingSink::new().with_latency(Duration::from_millis(50));

    let report = pipeline.run(source, sink).await.unwrap();
    assert_eq!(report.fetched, 5);
    assert_eq!(
        report.processed, 5,
        "completions past the revised target must be discarded"
    );

    let mut max_processed = 0;
    while let Ok(update) = progress.try_recv() {
        max_processed = max_processed.max(update.processed);
    }
    assert_eq!(max_processed, 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn queue_limit_keeps_the_backlog_bounded() {
    init_tracing();

    let fetch_options = FetchOptions::builder().limit(4).build().unwrap();
    let queue_options = QueueOptions::builder()
        .request_limit(2)
        .queue_limit(12)
        .build()
        .unwrap();
    let mut pipeline = DrainPipeline::new(fetch_options, queue_options);
    let mut progress = pipeline.progress_channel();

    let source = ScriptedSource::new(40);
    let sink = RecordingSink::new().with_latency(Duration::from_millis(2));

    let report = pipeline.run(source, sink).await.unwrap();
    assert_eq!(report.processed, 40);

    let mut max_queue = 0;
    while let Ok(update) = progress.try_recv() {
        max_queue = max_queue.max(update.queue_size);
    }
    assert!(
        max_queue <= 12,
        "backlog grew past the advisory bound: {max_queue}"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn telemetry_counts_the_run() {
    init_tracing();

    let fetch_options = FetchOptions::builder().limit(5).build().unwrap();
    let pipeline = DrainPipeline::new(fetch_options, QueueOptions::default());
    let telemetry = pipeline.telemetry();

    let report = pipeline
        .run(ScriptedSource::new(20), RecordingSink::new())
        .await
        .unwrap();
    assert_eq!(report.processed, 20);

    let snapshot = telemetry.snapshot();
    assert_eq!(snapshot.pages_fetched, 4);
    assert_eq!(snapshot.items_fetched, 20);
    assert_eq!(snapshot.items_processed, 20);
    assert_eq!(snapshot.fetch_errors, 0);
    assert_eq!(snapshot.process_errors, 0);
}
