//! # Built-In Recorders
//!
//! Recorders consume the per-test event stream: atomic request/error
//! counters, a structured log sink and progress-bar drivers. The latency
//! histogram recorder lives in [`crate::histogram`]; the metric-owned
//! recorders (latency buffer, statistics attachment) are installed by
//! [`crate::metrics`] during constraint setup.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indicatif::ProgressBar;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::events::{Event, Recorder};
use crate::histogram::LatencyHistogram;

/// Request and error counters for one test.
///
/// Counters are reset on `StartTest` and mutated with atomic adds only,
/// so the recorder can run while metric readers hold clones of the
/// handle. Readers are only consulted after the event bus has drained.
#[derive(Debug, Default)]
pub struct Statistics {
    requests: AtomicU64,
    errors: AtomicU64,
}

/// A point-in-time copy of [`Statistics`].
#[derive(Clone, Copy, Debug, Serialize)]
pub struct StatisticsSnapshot {
    pub requests: u64,
    pub errors: u64,
}

impl Statistics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Zeroes both counters.
    pub fn reset(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            requests: self.requests(),
            errors: self.errors(),
        }
    }
}

/// Tallies completed requests and errors into a shared [`Statistics`].
pub struct StatisticsRecorder {
    statistics: Arc<Statistics>,
}

impl StatisticsRecorder {
    pub fn new(statistics: Arc<Statistics>) -> Self {
        Self { statistics }
    }
}

impl<R, S> Recorder<R, S> for StatisticsRecorder {
    fn record(&mut self, event: &Event<R, S>) {
        match event {
            Event::StartTest => self.statistics.reset(),
            Event::EndRequest { outcome, .. } => {
                self.statistics.requests.fetch_add(1, Ordering::Relaxed);
                if outcome.is_err() {
                    self.statistics.errors.fetch_add(1, Ordering::Relaxed);
                }
            }
            _ => {}
        }
    }
}

/// Emits a structured record per request: `start` at debug, `success`
/// at info and `fail` at warn, tagged with the test's load level.
pub struct LogRecorder {
    test: u64,
}

impl LogRecorder {
    pub fn new(test: u64) -> Self {
        Self { test }
    }
}

impl<R, S> Recorder<R, S> for LogRecorder
where
    R: std::fmt::Debug,
    S: std::fmt::Debug,
{
    fn record(&mut self, event: &Event<R, S>) {
        match event {
            Event::StartRequest { time, request } => {
                debug!(test = self.test, start = time, request = ?request, "start");
            }
            Event::EndRequest {
                start,
                end,
                outcome,
            } => {
                let elapsed = end - start;
                match outcome {
                    Ok(response) => {
                        info!(
                            test = self.test,
                            start, end, elapsed, response = ?response, "success"
                        );
                    }
                    Err(error) => {
                        warn!(
                            test = self.test,
                            start, end, elapsed, error = %error, "fail"
                        );
                    }
                }
            }
            _ => {}
        }
    }
}

/// Feeds each completed request's latency into a shared histogram.
///
/// The runner holds the other handle and renders the tally after the
/// bus has drained.
pub struct HistogramRecorder {
    histogram: Arc<Mutex<LatencyHistogram>>,
}

impl HistogramRecorder {
    pub fn new(histogram: Arc<Mutex<LatencyHistogram>>) -> Self {
        Self { histogram }
    }
}

impl<R, S> Recorder<R, S> for HistogramRecorder {
    fn record(&mut self, event: &Event<R, S>) {
        if let Event::EndRequest { start, end, .. } = event {
            self.histogram.lock().record(end - start);
        }
    }
}

/// Advances a progress bar once per completed request (throughput mode,
/// where the total request count is known up front).
pub struct ProgressRecorder {
    bar: ProgressBar,
}

impl ProgressRecorder {
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl<R, S> Recorder<R, S> for ProgressRecorder {
    fn record(&mut self, event: &Event<R, S>) {
        if matches!(event, Event::EndRequest { .. }) {
            self.bar.inc(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tester::RequestError;

    fn end_request(failed: bool) -> Event<u32, u32> {
        Event::EndRequest {
            start: 0,
            end: 1,
            outcome: if failed {
                Err(RequestError::Timeout)
            } else {
                Ok(0)
            },
        }
    }

    #[test]
    fn statistics_recorder_counts_requests_and_errors() {
        let statistics = Statistics::new();
        let mut recorder = StatisticsRecorder::new(Arc::clone(&statistics));

        Recorder::<u32, u32>::record(&mut recorder, &Event::StartTest);
        recorder.record(&end_request(false));
        recorder.record(&end_request(false));
        recorder.record(&end_request(true));

        assert_eq!(statistics.requests(), 3);
        assert_eq!(statistics.errors(), 1);
    }

    #[test]
    fn statistics_reset_on_start_test() {
        let statistics = Statistics::new();
        let mut recorder = StatisticsRecorder::new(Arc::clone(&statistics));

        recorder.record(&end_request(true));
        Recorder::<u32, u32>::record(&mut recorder, &Event::StartTest);

        assert_eq!(statistics.requests(), 0);
        assert_eq!(statistics.errors(), 0);
    }

    #[test]
    fn snapshot_copies_the_live_counters() {
        let statistics = Statistics::new();
        let mut recorder = StatisticsRecorder::new(Arc::clone(&statistics));

        recorder.record(&end_request(false));
        recorder.record(&end_request(true));

        let snapshot = statistics.snapshot();
        assert_eq!(snapshot.requests, 2);
        assert_eq!(snapshot.errors, 1);
    }

    #[test]
    fn errors_never_exceed_requests() {
        let statistics = Statistics::new();
        let mut recorder = StatisticsRecorder::new(Arc::clone(&statistics));

        for failed in [true, false, true, true, false] {
            recorder.record(&end_request(failed));
        }
        assert!(statistics.errors() <= statistics.requests());
    }

    #[test]
    fn progress_recorder_ticks_on_end_request_only() {
        let bar = ProgressBar::hidden();
        bar.set_length(10);
        let mut recorder = ProgressRecorder::new(bar.clone());

        Recorder::<u32, u32>::record(&mut recorder, &Event::StartTest);
        Recorder::<u32, u32>::record(
            &mut recorder,
            &Event::StartRequest {
                time: 0,
                request: 1,
            },
        );
        assert_eq!(bar.position(), 0);

        recorder.record(&end_request(false));
        assert_eq!(bar.position(), 1);
    }
}
