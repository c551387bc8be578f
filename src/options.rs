//! # Per-Controller Options
//!
//! One [`Options`] value configures a whole controller run: the target,
//! timing knobs, the load values or search parameters, and the recorder
//! list that every test's event stream fans out to.
//!
//! Metrics never see the full record. During setup they narrow the
//! options to [`MetricOptions`], which exposes exactly the two things a
//! metric may touch: the latency unit and recorder registration. The
//! recorder list is append-only before the first test and read-only
//! afterwards.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::constraint::Constraint;
use crate::events::BoxRecorder;
use crate::growth::Growth;
use crate::intervals::Distribution;

/// Output rendering for the end-of-test summaries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Common options shared by every test of a controller run.
pub struct Options<R, S> {
    /// The endpoint under test, protocol-specific host or host:port.
    pub target: String,
    /// Wall-clock length of a single test.
    pub duration: Duration,
    /// Per-request timeout honoured by the executors.
    pub timeout: Duration,
    /// Capacity of the event bus and the request stream.
    pub buffer: usize,
    /// Inter-arrival distribution for throughput-mode dispatch.
    pub distribution: Distribution,
    /// Latency scaling unit for histograms and the latency metric.
    pub unit: Duration,
    /// Suppresses the per-test histogram when set.
    pub no_stats: bool,
    /// Input file with one request per line; stdin when unset.
    pub input: Option<PathBuf>,
    /// Load levels for a fixed search, in execution order.
    pub tests: Vec<u64>,
    /// Seed load level for a constraints search.
    pub start: u64,
    /// Constraints every test of a constraints search must satisfy.
    pub constraints: Vec<Constraint<R, S>>,
    /// Strategy choosing the next load level between tests.
    pub growth: Growth,
    /// Rendering of the end-of-test summaries.
    pub format: OutputFormat,
    /// Recorders observing every test's event stream, in order.
    pub recorders: Vec<BoxRecorder<R, S>>,
}

impl<R, S> fmt::Debug for Options<R, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("target", &self.target)
            .field("duration", &self.duration)
            .field("timeout", &self.timeout)
            .field("buffer", &self.buffer)
            .field("distribution", &self.distribution)
            .field("unit", &self.unit)
            .field("no_stats", &self.no_stats)
            .field("input", &self.input)
            .field("tests", &self.tests)
            .field("start", &self.start)
            .field("constraints", &self.constraints)
            .field("growth", &self.growth)
            .field("format", &self.format)
            .field("recorders", &self.recorders.len())
            .finish()
    }
}

impl<R, S> Options<R, S> {
    /// Options with library defaults and no search configuration; the
    /// CLI layer populates targets, tests and constraints.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            duration: crate::defaults::DURATION,
            timeout: crate::defaults::TIMEOUT,
            buffer: crate::defaults::BUFFER,
            distribution: Distribution::Uniform,
            unit: crate::defaults::UNIT,
            no_stats: false,
            input: None,
            tests: Vec::new(),
            start: 0,
            constraints: Vec::new(),
            growth: Growth::percentage(100.0),
            format: OutputFormat::Text,
            recorders: Vec::new(),
        }
    }
}

/// The narrow view of [`Options`] a metric is allowed to touch during
/// its setup.
pub trait MetricOptions<R, S> {
    /// The latency scaling unit.
    fn unit(&self) -> Duration;

    /// Registers a recorder; it observes every subsequent test.
    fn add_recorder(&mut self, recorder: BoxRecorder<R, S>);
}

impl<R, S> MetricOptions<R, S> for Options<R, S> {
    fn unit(&self) -> Duration {
        self.unit
    }

    fn add_recorder(&mut self, recorder: BoxRecorder<R, S>) {
        self.recorders.push(recorder);
    }
}
