//! End-to-end throughput test: a fixed-rate run against a stub executor
//! dispatches exactly `qps * duration` requests and tallies their
//! latencies.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use loadbench::controller;
use loadbench::events::Nanos;
use loadbench::histogram::LatencyHistogram;
use loadbench::options::Options;
use loadbench::recorders::{HistogramRecorder, Statistics, StatisticsRecorder};
use loadbench::tester::{Executor, RequestError, RequestExecutor, Tester};

/// Succeeds after a fixed delay.
struct SleepingExecutor {
    delay: Duration,
}

#[async_trait]
impl RequestExecutor<u64, u64> for SleepingExecutor {
    async fn execute(&self, _timestamp: Nanos, request: u64) -> Result<u64, RequestError> {
        tokio::time::sleep(self.delay).await;
        Ok(request)
    }
}

struct StubTester {
    delay: Duration,
}

#[async_trait]
impl Tester for StubTester {
    type Request = u64;
    type Response = u64;

    async fn request_executor(
        &mut self,
        _options: &Options<u64, u64>,
    ) -> anyhow::Result<Executor<u64, u64>> {
        Ok(Arc::new(SleepingExecutor { delay: self.delay }))
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn fixed_throughput_dispatches_the_exact_request_count() {
    let mut options: Options<u64, u64> = Options::new("stub");
    options.duration = Duration::from_secs(1);
    options.no_stats = true;
    options.tests = vec![100];

    let statistics = Statistics::new();
    options
        .recorders
        .push(Box::new(StatisticsRecorder::new(Arc::clone(&statistics))));

    let histogram = Arc::new(Mutex::new(
        LatencyHistogram::new(options.timeout, options.unit).unwrap(),
    ));
    options
        .recorders
        .push(Box::new(HistogramRecorder::new(Arc::clone(&histogram))));

    let mut tester = StubTester {
        delay: Duration::from_millis(1),
    };
    let generator: loadbench::input::RequestGenerator<u64> = Arc::new(|i| i as u64);

    controller::load_test_throughput_fixed(&mut tester, &generator, &mut options)
        .await
        .unwrap();

    assert_eq!(statistics.requests(), 100);
    assert_eq!(statistics.errors(), 0);

    let histogram = histogram.lock();
    assert_eq!(histogram.len(), 100);
    let summary = histogram.summary();
    // The executor sleeps 1ms, so no sample can be faster than one unit.
    assert!(summary.min >= 1, "min {} below the sleep floor", summary.min);
    assert!(summary.mean < 100.0, "mean {} implausibly slow", summary.mean);
}

#[tokio::test(flavor = "multi_thread")]
async fn errors_are_counted_but_do_not_abort_the_test() {
    struct FlakyExecutor;

    #[async_trait]
    impl RequestExecutor<u64, u64> for FlakyExecutor {
        async fn execute(&self, _timestamp: Nanos, request: u64) -> Result<u64, RequestError> {
            if request % 2 == 0 {
                Err(RequestError::Other("even request".to_string()))
            } else {
                Ok(request)
            }
        }
    }

    struct FlakyTester;

    #[async_trait]
    impl Tester for FlakyTester {
        type Request = u64;
        type Response = u64;

        async fn request_executor(
            &mut self,
            _options: &Options<u64, u64>,
        ) -> anyhow::Result<Executor<u64, u64>> {
            Ok(Arc::new(FlakyExecutor))
        }
    }

    let mut options: Options<u64, u64> = Options::new("stub");
    options.duration = Duration::from_secs(1);
    options.no_stats = true;
    options.tests = vec![50];

    let statistics = Statistics::new();
    options
        .recorders
        .push(Box::new(StatisticsRecorder::new(Arc::clone(&statistics))));

    let mut tester = FlakyTester;
    let generator: loadbench::input::RequestGenerator<u64> = Arc::new(|i| i as u64);

    controller::load_test_throughput_fixed(&mut tester, &generator, &mut options)
        .await
        .unwrap();

    assert_eq!(statistics.requests(), 50);
    assert_eq!(statistics.errors(), 25);
    assert!(statistics.errors() <= statistics.requests());
}
