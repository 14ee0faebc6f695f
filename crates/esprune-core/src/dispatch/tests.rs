use super::*;
use crate::{
    aggregate::{ResultAggregator, RunStatus},
    chunk::{ChunkLimits, JsonLines, chunk_actions},
    executor::ChunkExecutor,
    testing::{FailAtExecutor, FlakyIdExecutor, LatencyExecutor, RecordingExecutor},
    types::{BulkOptions, DeleteAction},
};
use core::time::Duration;
use portable_atomic::{AtomicUsize, Ordering};
use tokio::{sync::mpsc, time::Instant};

fn actions(n: usize) -> impl Stream<Item = Result<DeleteAction>> {
    stream::iter((0..n).map(|i| Ok(DeleteAction::new("logs", None, i.to_string(), None))))
}

fn chunks(n: usize, chunk_size: usize) -> impl Stream<Item = Result<Chunk>> {
    chunk_actions(
        actions(n),
        ChunkLimits::new(chunk_size, usize::MAX).unwrap(),
        JsonLines,
    )
}

fn pool<E: ChunkExecutor + 'static>(workers: usize, executor: E) -> Arc<WorkerPool> {
    Arc::new(
        WorkerPool::spawn(
            workers,
            Arc::new(executor),
            BulkOptions::default(),
            Duration::from_secs(1),
        )
        .unwrap(),
    )
}

fn ids(records: &[ResultRecord]) -> Vec<usize> {
    records.iter().map(|r| r.info.id.parse().unwrap()).collect()
}

#[tokio::test(start_paused = true)]
async fn window_never_exceeds_workers_plus_one() {
    let executor = RecordingExecutor::with_delay(Duration::from_millis(10));
    let mut dispatcher = Dispatcher::new(chunks(25, 10), pool(2, executor), CancellationToken::new());
    assert_eq!(dispatcher.capacity(), 3);
    assert_eq!(dispatcher.state(), DispatchState::Filling);

    let mut sizes = Vec::new();
    while let Some(batch) = dispatcher.next_batch().await {
        assert!(dispatcher.window_len() <= dispatcher.capacity());
        sizes.push(batch.unwrap().len());
    }

    assert_eq!(sizes, vec![10, 10, 5]);
    assert!(dispatcher.peak_window() <= 3);
    assert_eq!(dispatcher.submitted(), 3);
    assert_eq!(dispatcher.state(), DispatchState::Done);
    assert!(!dispatcher.was_cancelled());
}

#[tokio::test(start_paused = true)]
async fn results_follow_submission_not_completion_order() {
    let executor = LatencyExecutor::new(&[300, 200, 10]);
    let completed = Arc::clone(&executor.completed);
    let dispatcher = Dispatcher::new(chunks(6, 2), pool(3, executor), CancellationToken::new());

    let records: Vec<_> = dispatcher.into_stream().try_collect().await.unwrap();

    assert_eq!(*completed.lock().unwrap(), vec![2, 1, 0]);
    assert_eq!(ids(&records), vec![0, 1, 2, 3, 4, 5]);
}

#[tokio::test(start_paused = true)]
async fn free_worker_starts_the_chunk_behind_a_slow_one() {
    let executor = LatencyExecutor::new(&[300, 10, 10]);
    let started = Arc::clone(&executor.started);
    let origin = Instant::now();
    let dispatcher = Dispatcher::new(chunks(3, 1), pool(2, executor), CancellationToken::new());

    let records: Vec<_> = dispatcher.into_stream().try_collect().await.unwrap();
    assert_eq!(ids(&records), vec![0, 1, 2]);

    let started = started.lock().unwrap();
    let (_, third) = started.iter().find(|(seq, _)| *seq == 2).unwrap();
    assert!(third.duration_since(origin) < Duration::from_millis(100));
}

#[tokio::test]
async fn million_actions_stay_within_the_window() {
    const WORKERS: usize = 4;
    const CAPACITY: usize = WORKERS + 1;

    let produced = Arc::new(AtomicUsize::new(0));
    let consumed = Arc::new(AtomicUsize::new(0));

    let source = {
        let produced = Arc::clone(&produced);
        let consumed = Arc::clone(&consumed);
        chunks(1_000_000, 500).inspect(move |_| {
            let alive = produced.fetch_add(1, Ordering::SeqCst) + 1 - consumed.load(Ordering::SeqCst);
            assert!(alive <= CAPACITY, "{alive} chunks alive");
        })
    };

    let mut dispatcher = Dispatcher::new(
        source,
        pool(WORKERS, RecordingExecutor::default()),
        CancellationToken::new(),
    );

    let mut total = 0;
    let mut next_id = 0;
    while let Some(batch) = dispatcher.next_batch().await {
        let batch = batch.unwrap();
        assert_eq!(batch.len(), 500);
        assert_eq!(ids(&batch)[0], next_id);
        next_id += batch.len();
        total += batch.len();
        consumed.fetch_add(1, Ordering::SeqCst);
    }

    assert_eq!(total, 1_000_000);
    assert_eq!(produced.load(Ordering::SeqCst), 2_000);
    assert!(dispatcher.peak_window() <= CAPACITY);
}

#[tokio::test]
async fn failed_items_are_counted_not_raised() {
    let mut dispatcher = Dispatcher::new(chunks(100, 10), pool(4, FlakyIdExecutor), CancellationToken::new());
    let mut aggregator = ResultAggregator::new("logs");

    let status = aggregator.consume(&mut dispatcher).await.unwrap();
    let summary = aggregator.finish(status);

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.deleted, 90);
    assert_eq!(summary.failed, 10);
    assert_eq!(summary.processed(), 100);
}

#[tokio::test(start_paused = true)]
async fn task_error_aborts_after_draining_in_flight() {
    let completed = Arc::new(AtomicUsize::new(0));
    let executor = FailAtExecutor {
        sequence: 1,
        delay: Duration::from_millis(20),
        completed: Arc::clone(&completed),
    };
    let mut dispatcher = Dispatcher::new(chunks(100, 10), pool(2, executor), CancellationToken::new());

    let first = dispatcher.next_batch().await.unwrap().unwrap();
    assert_eq!(ids(&first)[0], 0);

    let err = dispatcher.next_batch().await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Transport { .. }));

    // Chunks 0..=3 were submitted; every one of them ran to completion.
    assert_eq!(dispatcher.submitted(), 4);
    assert_eq!(completed.load(Ordering::SeqCst), 4);
    assert_eq!(dispatcher.window_len(), 0);
    assert!(dispatcher.next_batch().await.is_none());
    assert_eq!(dispatcher.state(), DispatchState::Done);
}

#[tokio::test(start_paused = true)]
async fn chunk_stream_error_aborts_the_run() {
    let source = chunks(30, 10).chain(stream::iter(vec![Err(Error::MalformedHandle {
        reason: "hit without _id".into(),
    })]));
    let mut dispatcher = Dispatcher::new(
        source,
        pool(4, RecordingExecutor::default()),
        CancellationToken::new(),
    );
    let mut aggregator = ResultAggregator::new("logs");

    let err = aggregator.consume(&mut dispatcher).await.unwrap_err();
    assert!(matches!(err, Error::MalformedHandle { .. }));
    assert_eq!(dispatcher.window_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_drains_in_flight_and_stops() {
    let cancel = CancellationToken::new();
    let executor = RecordingExecutor::with_delay(Duration::from_millis(5));
    let mut dispatcher = Dispatcher::new(chunks(100, 10), pool(2, executor), cancel.clone());

    let first = dispatcher.next_batch().await.unwrap().unwrap();
    assert_eq!(ids(&first)[0], 0);
    cancel.cancel();

    let mut rest = Vec::new();
    while let Some(batch) = dispatcher.next_batch().await {
        rest.extend(batch.unwrap());
    }

    // The two chunks still in the window were delivered, nothing else.
    assert_eq!(rest.len(), 20);
    assert_eq!(ids(&rest)[0], 10);
    assert_eq!(dispatcher.submitted(), 3);
    assert!(dispatcher.was_cancelled());
    assert_eq!(dispatcher.state(), DispatchState::Done);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_a_blocked_submission() {
    // Nobody serves this queue, so the second chunk can never be queued.
    let (queue, _unserved) = mpsc::channel(1);
    let pool = Arc::new(WorkerPool::new(
        queue,
        1,
        CancellationToken::new(),
        Duration::from_secs(1),
    ));
    let cancel = CancellationToken::new();
    let mut dispatcher = Dispatcher::new(chunks(30, 10), pool, cancel.clone());

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    tokio::time::timeout(Duration::from_secs(1), dispatcher.fill())
        .await
        .expect("submission ignored cancellation")
        .unwrap();

    assert!(dispatcher.was_cancelled());
    assert_eq!(dispatcher.submitted(), 1);
    assert_eq!(dispatcher.window_len(), 1);
    assert_eq!(dispatcher.state(), DispatchState::Draining);
}

#[tokio::test]
async fn cancelled_run_reports_cancelled_status() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut dispatcher = Dispatcher::new(
        chunks(100, 10),
        pool(2, RecordingExecutor::default()),
        cancel,
    );
    let mut aggregator = ResultAggregator::new("logs");

    let status = aggregator.consume(&mut dispatcher).await.unwrap();
    assert_eq!(status, RunStatus::Cancelled);
    assert_eq!(aggregator.deleted(), 0);
    assert_eq!(dispatcher.submitted(), 0);
}

#[tokio::test]
async fn empty_input_is_done_immediately() {
    let mut dispatcher = Dispatcher::new(
        chunks(0, 10),
        pool(2, RecordingExecutor::default()),
        CancellationToken::new(),
    );

    assert!(dispatcher.next_batch().await.is_none());
    assert_eq!(dispatcher.state(), DispatchState::Done);
    assert_eq!(dispatcher.submitted(), 0);
}

#[tokio::test(start_paused = true)]
async fn runs_up_to_worker_count_chunks_concurrently() {
    let executor = RecordingExecutor::with_delay(Duration::from_millis(50));
    let peak = Arc::clone(&executor.peak);
    let dispatcher = Dispatcher::new(chunks(200, 10), pool(3, executor), CancellationToken::new());

    let records: Vec<_> = dispatcher.into_stream().try_collect().await.unwrap();

    assert_eq!(records.len(), 200);
    assert_eq!(peak.load(Ordering::SeqCst), 3);
}
