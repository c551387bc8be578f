//! # Unit-Scaled Latency Histogram
//!
//! Latencies are tallied in multiples of the `--unit` duration (1 ms by
//! default) into a bounded HDR histogram covering `[1, 2·timeout/unit]`.
//! Samples beyond the range clamp into the last bucket, so a stream of
//! timeouts shows up as a spike at the top of the histogram instead of a
//! recording failure.

use anyhow::{Context, Result};
use hdrhistogram::Histogram;
use serde::Serialize;
use std::time::Duration;

use crate::events::Nanos;

/// Significant figures kept by the underlying HDR histogram.
const SIGNIFICANT_FIGURES: u8 = 3;

/// Percentiles reported by the rendered summary.
const PERCENTILES: [f64; 6] = [50.0, 75.0, 90.0, 95.0, 99.0, 99.9];

/// A latency tally for one test, scaled by the configured unit.
pub struct LatencyHistogram {
    histogram: Histogram<u64>,
    unit: Duration,
}

/// Summary statistics extracted from a [`LatencyHistogram`], in units.
#[derive(Debug, Serialize)]
pub struct HistogramSummary {
    pub unit: String,
    pub count: u64,
    pub min: u64,
    pub mean: f64,
    pub max: u64,
    pub percentiles: Vec<PercentileValue>,
}

/// A percentile paired with its latency value in units.
#[derive(Debug, Serialize)]
pub struct PercentileValue {
    pub percentile: f64,
    pub value: u64,
}

impl LatencyHistogram {
    /// Creates a histogram sized for the given test timeout and unit.
    pub fn new(timeout: Duration, unit: Duration) -> Result<Self> {
        let buckets = (2 * timeout.as_nanos() / unit.as_nanos().max(1)) as u64;
        let histogram = Histogram::new_with_bounds(1, buckets.max(2), SIGNIFICANT_FIGURES)
            .context("failed to size the latency histogram")?;
        Ok(Self { histogram, unit })
    }

    /// Records one latency, given in nanoseconds. Out-of-range samples
    /// clamp to the closest bound.
    pub fn record(&mut self, elapsed: Nanos) {
        let value = elapsed / self.unit.as_nanos().max(1) as u64;
        self.histogram.saturating_record(value);
    }

    /// Number of recorded samples.
    pub fn len(&self) -> u64 {
        self.histogram.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histogram.is_empty()
    }

    /// Count of samples recorded at `value` units, after quantization.
    pub fn count_at(&self, value: u64) -> u64 {
        self.histogram.count_at(value)
    }

    pub fn summary(&self) -> HistogramSummary {
        HistogramSummary {
            unit: format!("{:?}", self.unit),
            count: self.histogram.len(),
            min: self.histogram.min(),
            mean: self.histogram.mean(),
            max: self.histogram.max(),
            percentiles: PERCENTILES
                .iter()
                .map(|&percentile| PercentileValue {
                    percentile,
                    value: self.histogram.value_at_quantile(percentile / 100.0),
                })
                .collect(),
        }
    }

    /// Renders a human-readable summary table.
    pub fn render(&self) -> String {
        let summary = self.summary();
        let mut out = String::new();
        out.push_str(&format!(
            "Latency histogram ({} samples, unit = {}):\n",
            summary.count, summary.unit
        ));
        out.push_str(&format!(
            "  min = {}  mean = {:.2}  max = {}\n",
            summary.min, summary.mean, summary.max
        ));
        for entry in &summary.percentiles {
            out.push_str(&format!(
                "  p{:<5} {:>8}\n",
                entry.percentile, entry.value
            ));
        }
        out
    }
}
