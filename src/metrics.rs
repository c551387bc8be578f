//! # Metrics
//!
//! A [`Metric`] is a named source of [`DataPoint`]s over the last test's
//! time window. Metrics self-install: during constraint setup each one
//! registers whatever recorder it needs on the options, then after the
//! test the constraint evaluator pulls its data points with
//! [`Metric::fetch`].
//!
//! Two built-ins exist:
//!
//! - `errors` — the error percentage over all requests, observed through
//!   a [`Statistics`] recorder. Yields a single data point; with zero
//!   requests the value is NaN, which no comparator accepts.
//! - `latency` — one data point per request, valued in `--unit`
//!   multiples, buffered by a mutex-guarded recorder.
//!
//! Metric names are resolved through an ordered chain of parsers; the
//! first parser that recognises the name wins.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::events::{Event, Nanos};
use crate::options::MetricOptions;
use crate::recorders::{Statistics, StatisticsRecorder};

/// A single metric sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DataPoint {
    /// Nanoseconds from the test epoch.
    pub time: Nanos,
    pub value: f64,
}

/// Raised when a metric cannot produce data points.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetricError {
    #[error("no data points")]
    NoDataPoints,
}

/// Raised when a metric name cannot be resolved.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseMetricError {
    #[error("unknown metric: {0}")]
    UnknownMetric(String),
}

/// A named source of data points for the constraint evaluator.
pub trait Metric<R, S>: Send {
    /// Stable name used in constraint expressions.
    fn name(&self) -> &str;

    /// Attaches whatever recorder this metric needs to observe the test.
    /// Called once, before the controller starts.
    fn setup(&mut self, options: &mut dyn MetricOptions<R, S>);

    /// Returns the data points collected over the last test, whose total
    /// elapsed time was `window`.
    fn fetch(&self, window: Duration) -> Result<Vec<DataPoint>, MetricError>;
}

/// Resolves a metric name into a metric instance.
pub type MetricParser<R, S> = fn(&str) -> Result<Box<dyn Metric<R, S>>, ParseMetricError>;

/// Parser for the built-in `errors` and `latency` metrics.
pub fn standard_metrics<R, S>(name: &str) -> Result<Box<dyn Metric<R, S>>, ParseMetricError>
where
    R: Send + 'static,
    S: Send + 'static,
{
    match name {
        "errors" => Ok(Box::new(ErrorsMetric::new())),
        "latency" => Ok(Box::new(LatencyMetric::new())),
        _ => Err(ParseMetricError::UnknownMetric(name.to_string())),
    }
}

/// Aggregates a list of data points into a single value.
///
/// The empty list aggregates to 0. A NaN sample poisons the result,
/// which in turn fails every comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregator {
    Min,
    Max,
    Avg,
}

/// Raised when an aggregator name cannot be resolved.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid aggregator: {0}")]
pub struct ParseAggregatorError(String);

impl Aggregator {
    pub fn aggregate(self, points: &[DataPoint]) -> f64 {
        let Some(first) = points.first() else {
            return 0.0;
        };
        match self {
            Aggregator::Min => points.iter().fold(first.value, |min, point| {
                if point.value < min {
                    point.value
                } else {
                    min
                }
            }),
            Aggregator::Max => points.iter().fold(first.value, |max, point| {
                if point.value > max {
                    point.value
                } else {
                    max
                }
            }),
            Aggregator::Avg => {
                points.iter().map(|point| point.value).sum::<f64>() / points.len() as f64
            }
        }
    }
}

impl std::fmt::Display for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Aggregator::Min => write!(f, "MIN"),
            Aggregator::Max => write!(f, "MAX"),
            Aggregator::Avg => write!(f, "AVG"),
        }
    }
}

impl std::str::FromStr for Aggregator {
    type Err = ParseAggregatorError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "MIN" => Ok(Aggregator::Min),
            "MAX" => Ok(Aggregator::Max),
            "AVG" => Ok(Aggregator::Avg),
            _ => Err(ParseAggregatorError(name.to_string())),
        }
    }
}

/// The `errors` metric: error percentage over all requests.
pub struct ErrorsMetric {
    statistics: Arc<Statistics>,
}

impl ErrorsMetric {
    pub fn new() -> Self {
        Self {
            statistics: Statistics::new(),
        }
    }
}

impl Default for ErrorsMetric {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, S> Metric<R, S> for ErrorsMetric
where
    R: Send + 'static,
    S: Send + 'static,
{
    fn name(&self) -> &str {
        "errors"
    }

    fn setup(&mut self, options: &mut dyn MetricOptions<R, S>) {
        options.add_recorder(Box::new(StatisticsRecorder::new(Arc::clone(
            &self.statistics,
        ))));
    }

    fn fetch(&self, window: Duration) -> Result<Vec<DataPoint>, MetricError> {
        // 0/0 yields NaN, which fails every comparison downstream.
        let percentage =
            self.statistics.errors() as f64 / self.statistics.requests() as f64 * 100.0;
        Ok(vec![DataPoint {
            time: window.as_nanos() as Nanos,
            value: percentage,
        }])
    }
}

/// The `latency` metric: one sample per request, in `--unit` multiples.
pub struct LatencyMetric {
    points: Arc<Mutex<Option<Vec<DataPoint>>>>,
}

impl LatencyMetric {
    pub fn new() -> Self {
        Self {
            points: Arc::new(Mutex::new(None)),
        }
    }
}

impl Default for LatencyMetric {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, S> Metric<R, S> for LatencyMetric
where
    R: Send + 'static,
    S: Send + 'static,
{
    fn name(&self) -> &str {
        "latency"
    }

    fn setup(&mut self, options: &mut dyn MetricOptions<R, S>) {
        let unit = options.unit().as_nanos().max(1) as f64;
        let points = Arc::clone(&self.points);
        options.add_recorder(Box::new(move |event: &Event<R, S>| match event {
            Event::StartTest => {
                *points.lock() = Some(Vec::new());
            }
            Event::EndRequest { start, end, .. } => {
                if let Some(buffer) = points.lock().as_mut() {
                    buffer.push(DataPoint {
                        time: *start,
                        value: (end - start) as f64 / unit,
                    });
                }
            }
            _ => {}
        }));
    }

    fn fetch(&self, _window: Duration) -> Result<Vec<DataPoint>, MetricError> {
        match self.points.lock().as_ref() {
            Some(points) => Ok(points.clone()),
            None => Err(MetricError::NoDataPoints),
        }
    }
}
