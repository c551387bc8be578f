//! # Test Runner
//!
//! Runs one test at one load level: composes the per-test recorder
//! stack, calls the tester's per-test hooks, drives the scheduler and
//! drains the event bus, then renders the latency histogram.
//!
//! The recorder stack is always `[log sink, user recorders…, histogram,
//! progress]`, in that order; user recorders registered on the options
//! (typically by metrics) persist across the tests of a search, while
//! the log, histogram and progress recorders are rebuilt per test.

use std::sync::Arc;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::events::{self, Recorder};
use crate::histogram::LatencyHistogram;
use crate::input::RequestGenerator;
use crate::options::{Options, OutputFormat};
use crate::recorders::{HistogramRecorder, LogRecorder, ProgressRecorder};
use crate::scheduler;
use crate::semaphore::WorkerSemaphore;
use crate::tester::{Qps, Tester, Workers};

/// Concurrency-mode progress advances on wall-clock ticks of this size,
/// since the total request count is unknown a priori.
const PROGRESS_TICK_MILLIS: u64 = 100;

/// Runs a single throughput-mode test at `qps`. A zero load level is a
/// no-op.
pub async fn run_throughput_test<T: Tester>(
    tester: &mut T,
    generator: &RequestGenerator<T::Request>,
    qps: Qps,
    options: &mut Options<T::Request, T::Response>,
) -> Result<()> {
    if qps == 0 {
        return Ok(());
    }
    info!("Running test: {qps} QPS");

    tester.before_each(options).await?;
    let result = throughput_test(tester, generator, qps, options).await;
    tester.after_each(options).await;
    result
}

async fn throughput_test<T: Tester>(
    tester: &mut T,
    generator: &RequestGenerator<T::Request>,
    qps: Qps,
    options: &mut Options<T::Request, T::Response>,
) -> Result<()> {
    let executor = tester.request_executor(options).await?;

    // The stream length fixes the test: floor(qps * duration) requests,
    // materialised by a dedicated producer.
    let count = (qps as f64 * options.duration.as_secs_f64()) as u64;
    let intervals = options.distribution.generator(qps as f64);
    let buffer = options.buffer.max(1);

    let (request_tx, request_rx) = tokio::sync::mpsc::channel(buffer);
    let producer_generator = Arc::clone(generator);
    let producer = tokio::spawn(async move {
        for i in 0..count as usize {
            if request_tx.send(producer_generator(i)).await.is_err() {
                break;
            }
        }
    });

    let (event_tx, event_rx) = events::bus(buffer);
    let histogram = new_histogram(options)?;
    let bar = progress_bar(count);

    let mut log = LogRecorder::new(qps);
    let mut histogram_recorder = histogram.as_ref().map(|h| HistogramRecorder::new(Arc::clone(h)));
    let mut progress = ProgressRecorder::new(bar.clone());

    let mut active: Vec<&mut dyn Recorder<T::Request, T::Response>> = vec![&mut log];
    for recorder in options.recorders.iter_mut() {
        active.push(recorder.as_mut());
    }
    if let Some(recorder) = histogram_recorder.as_mut() {
        active.push(recorder);
    }
    active.push(&mut progress);

    tokio::join!(
        scheduler::run_throughput(intervals, request_rx, executor, event_tx),
        events::record(event_rx, &mut active),
    );
    producer.await.ok();
    bar.finish();

    print_histogram(histogram.as_deref(), options.format);
    Ok(())
}

/// Runs a single concurrency-mode test with `workers` in-flight slots.
/// A zero load level is a no-op.
pub async fn run_concurrency_test<T: Tester>(
    tester: &mut T,
    generator: &RequestGenerator<T::Request>,
    workers: Workers,
    options: &mut Options<T::Request, T::Response>,
) -> Result<()> {
    if workers == 0 {
        return Ok(());
    }
    info!("Running test: {workers} workers");

    tester.before_each(options).await?;
    let result = concurrency_test(tester, generator, workers, options).await;
    tester.after_each(options).await;
    result
}

async fn concurrency_test<T: Tester>(
    tester: &mut T,
    generator: &RequestGenerator<T::Request>,
    workers: Workers,
    options: &mut Options<T::Request, T::Response>,
) -> Result<()> {
    let executor = tester.request_executor(options).await?;

    let semaphore = WorkerSemaphore::new();
    semaphore.signal(workers as usize);

    // Unbounded request stream; the producer re-checks the cancellation
    // token before every emission and closes the stream on expiry.
    let (request_tx, request_rx) = tokio::sync::mpsc::channel(1);
    let token = CancellationToken::new();
    let producer_token = token.clone();
    let producer_generator = Arc::clone(generator);
    let producer = tokio::spawn(async move {
        for i in 0.. {
            if producer_token.is_cancelled() {
                break;
            }
            if request_tx.send(producer_generator(i)).await.is_err() {
                break;
            }
        }
    });

    // The progress bar measures elapsed time, not completed requests.
    let ticks = options.duration.as_millis() as u64 / PROGRESS_TICK_MILLIS;
    let bar = progress_bar(ticks);
    let timer_bar = bar.clone();
    let timer = tokio::spawn(async move {
        let tick = std::time::Duration::from_millis(PROGRESS_TICK_MILLIS);
        for _ in 0..ticks {
            tokio::time::sleep(tick).await;
            timer_bar.inc(1);
        }
        token.cancel();
    });

    let (event_tx, event_rx) = events::bus(options.buffer.max(1));
    let histogram = new_histogram(options)?;

    let mut log = LogRecorder::new(workers);
    let mut histogram_recorder = histogram.as_ref().map(|h| HistogramRecorder::new(Arc::clone(h)));

    let mut active: Vec<&mut dyn Recorder<T::Request, T::Response>> = vec![&mut log];
    for recorder in options.recorders.iter_mut() {
        active.push(recorder.as_mut());
    }
    if let Some(recorder) = histogram_recorder.as_mut() {
        active.push(recorder);
    }

    tokio::join!(
        scheduler::run_concurrency(semaphore, request_rx, executor, event_tx),
        events::record(event_rx, &mut active),
    );
    timer.await.ok();
    producer.await.ok();
    bar.finish();

    print_histogram(histogram.as_deref(), options.format);
    Ok(())
}

fn new_histogram<R, S>(
    options: &Options<R, S>,
) -> Result<Option<Arc<Mutex<LatencyHistogram>>>> {
    if options.no_stats {
        return Ok(None);
    }
    let histogram = LatencyHistogram::new(options.timeout, options.unit)?;
    Ok(Some(Arc::new(Mutex::new(histogram))))
}

fn print_histogram(histogram: Option<&Mutex<LatencyHistogram>>, format: OutputFormat) {
    let Some(histogram) = histogram else {
        return;
    };
    let histogram = histogram.lock();
    match format {
        OutputFormat::Text => println!("{}", histogram.render()),
        OutputFormat::Json => match serde_json::to_string(&histogram.summary()) {
            Ok(json) => println!("{json}"),
            Err(err) => tracing::error!(%err, "failed to serialize histogram summary"),
        },
    }
}

fn progress_bar(len: u64) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::with_template(
            "{elapsed_precise} [{bar:40.cyan/blue}] {pos}/{len} {percent:>3}%",
        )
        .unwrap()
        .progress_chars("=> "),
    );
    bar
}
