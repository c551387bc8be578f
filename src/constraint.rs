//! # Constraint Grammar and Evaluation
//!
//! A constraint is a predicate over the last test's metric samples:
//!
//! ```text
//! Constraint ::= Aggregator '(' Metric ')' Comparator Threshold
//! Aggregator ::= "MIN" | "MAX" | "AVG"
//! Metric     ::= any metric name
//! Comparator ::= "<" | ">"
//! Threshold  ::= signed decimal float
//! ```
//!
//! e.g. `MAX(latency) < 30` or `AVG(errors) < 2.5`. After each test in a
//! constraints-mode search the controller checks every constraint; any
//! violation drives the growth's failure branch. Multiple constraints
//! are ANDed and checking short-circuits on the first failure.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

use crate::metrics::{
    Aggregator, Metric, MetricError, MetricParser, ParseAggregatorError, ParseMetricError,
};

/// Compares an aggregated metric value against the threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparator {
    LessThan,
    GreaterThan,
}

/// Raised when a comparator symbol cannot be resolved.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid comparator format: {0:?}, want \"<\" or \">\"")]
pub struct ParseComparatorError(String);

impl Comparator {
    /// True when `value` satisfies the comparison against `threshold`.
    /// NaN on either side satisfies nothing.
    pub fn compare(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::LessThan => value < threshold,
            Comparator::GreaterThan => value > threshold,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparator::LessThan => write!(f, "<"),
            Comparator::GreaterThan => write!(f, ">"),
        }
    }
}

impl FromStr for Comparator {
    type Err = ParseComparatorError;

    fn from_str(symbol: &str) -> Result<Self, Self::Err> {
        match symbol {
            "<" => Ok(Comparator::LessThan),
            ">" => Ok(Comparator::GreaterThan),
            _ => Err(ParseComparatorError(symbol.to_string())),
        }
    }
}

/// Raised when a constraint expression cannot be parsed.
#[derive(Debug, Error)]
pub enum ParseConstraintError {
    #[error("invalid constraint format")]
    InvalidFormat,
    #[error(transparent)]
    Aggregator(#[from] ParseAggregatorError),
    #[error(transparent)]
    Comparator(#[from] ParseComparatorError),
    #[error(transparent)]
    Metric(#[from] ParseMetricError),
    #[error("invalid threshold: {0}")]
    Threshold(String),
}

/// Raised when a constraint check does not pass.
#[derive(Debug, Error)]
pub enum ConstraintError {
    #[error(transparent)]
    Metric(#[from] MetricError),
    #[error("unsatisfied condition: {value:.4} {comparator} {threshold:.4}")]
    Unsatisfied {
        value: f64,
        comparator: Comparator,
        threshold: f64,
    },
}

/// A predicate a test must satisfy to count as a success.
pub struct Constraint<R, S> {
    pub metric: Box<dyn Metric<R, S>>,
    pub aggregator: Aggregator,
    pub comparator: Comparator,
    pub threshold: f64,
}

impl<R, S> fmt::Debug for Constraint<R, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constraint")
            .field("metric", &self.metric.name())
            .field("aggregator", &self.aggregator)
            .field("comparator", &self.comparator)
            .field("threshold", &self.threshold)
            .finish()
    }
}

fn grammar() -> &'static Regex {
    static GRAMMAR: OnceLock<Regex> = OnceLock::new();
    GRAMMAR.get_or_init(|| {
        Regex::new(
            r"^\s*(?P<aggregator>\w+)\((?P<metric>[^)]+)\)\s*(?P<comparator>[<>=~!@#$%^&?]+)\s*(?P<threshold>[-+]?\d*\.?\d+)\s*$",
        )
        .expect("constraint grammar is a valid regex")
    })
}

impl<R, S> Constraint<R, S> {
    /// Parses a constraint expression, resolving the metric name through
    /// the given parser chain: the first parser that recognises the name
    /// wins, and an unknown name is reported once no parser accepted it.
    pub fn parse(
        expression: &str,
        parsers: &[MetricParser<R, S>],
    ) -> Result<Self, ParseConstraintError> {
        let captures = grammar()
            .captures(expression)
            .ok_or(ParseConstraintError::InvalidFormat)?;

        let aggregator: Aggregator = captures["aggregator"].parse()?;
        let comparator: Comparator = captures["comparator"].parse()?;
        let threshold: f64 = captures["threshold"]
            .parse()
            .map_err(|_| ParseConstraintError::Threshold(captures["threshold"].to_string()))?;
        let metric = resolve_metric(&captures["metric"], parsers)?;

        Ok(Self {
            metric,
            aggregator,
            comparator,
            threshold,
        })
    }

    /// Fetches the metric for the last test's window and evaluates the
    /// predicate. A failure carries both sides of the comparison.
    pub fn check(&self, window: Duration) -> Result<(), ConstraintError> {
        let points = self.metric.fetch(window)?;
        let value = self.aggregator.aggregate(&points);
        if self.comparator.compare(value, self.threshold) {
            Ok(())
        } else {
            Err(ConstraintError::Unsatisfied {
                value,
                comparator: self.comparator,
                threshold: self.threshold,
            })
        }
    }
}

fn resolve_metric<R, S>(
    name: &str,
    parsers: &[MetricParser<R, S>],
) -> Result<Box<dyn Metric<R, S>>, ParseConstraintError> {
    for parser in parsers {
        match parser(name) {
            Ok(metric) => return Ok(metric),
            Err(ParseMetricError::UnknownMetric(_)) => continue,
        }
    }
    Err(ParseMetricError::UnknownMetric(name.to_string()).into())
}

impl<R, S> fmt::Display for Constraint<R, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}) {} {:.2}",
            self.aggregator,
            self.metric.name(),
            self.comparator,
            self.threshold
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{standard_metrics, DataPoint};
    use crate::options::MetricOptions;

    /// A metric returning a fixed set of samples, for evaluator tests.
    struct FixedMetric {
        points: Vec<DataPoint>,
    }

    impl Metric<u32, u32> for FixedMetric {
        fn name(&self) -> &str {
            "fixed"
        }

        fn setup(&mut self, _options: &mut dyn MetricOptions<u32, u32>) {}

        fn fetch(&self, _window: Duration) -> Result<Vec<DataPoint>, MetricError> {
            Ok(self.points.clone())
        }
    }

    fn fixed_constraint(
        values: &[f64],
        aggregator: Aggregator,
        comparator: Comparator,
        threshold: f64,
    ) -> Constraint<u32, u32> {
        Constraint {
            metric: Box::new(FixedMetric {
                points: values
                    .iter()
                    .map(|&value| DataPoint { time: 0, value })
                    .collect(),
            }),
            aggregator,
            comparator,
            threshold,
        }
    }

    const PARSERS: &[MetricParser<u32, u32>] = &[standard_metrics::<u32, u32>];

    #[test]
    fn parse_accepts_the_canonical_form() {
        let constraint = Constraint::parse("MAX(latency) < 30", PARSERS).unwrap();
        assert_eq!(constraint.aggregator, Aggregator::Max);
        assert_eq!(constraint.comparator, Comparator::LessThan);
        assert_eq!(constraint.threshold, 30.0);
        assert_eq!(constraint.metric.name(), "latency");
    }

    #[test]
    fn parse_is_whitespace_insensitive_outside_tokens() {
        for expression in ["MIN(errors)>0.5", "  MIN(errors)  >  0.5  "] {
            let constraint = Constraint::parse(expression, PARSERS).unwrap();
            assert_eq!(constraint.aggregator, Aggregator::Min);
            assert_eq!(constraint.threshold, 0.5);
        }
    }

    #[test]
    fn parse_accepts_signed_thresholds() {
        let constraint = Constraint::parse("AVG(latency) > -1.5", PARSERS).unwrap();
        assert_eq!(constraint.threshold, -1.5);
    }

    #[test]
    fn parse_rejects_malformed_expressions() {
        for expression in [
            "MAX(errors",
            "MAX errors < 10",
            "(errors) < 10",
            "MAX(errors) < ten",
            "MAX(errors) 10",
        ] {
            assert!(
                matches!(
                    Constraint::parse(expression, PARSERS),
                    Err(ParseConstraintError::InvalidFormat)
                ),
                "{expression:?} should be an invalid format"
            );
        }
    }

    #[test]
    fn parse_rejects_unknown_comparators_with_a_specific_error() {
        assert!(matches!(
            Constraint::parse("MAX(errors) ?? 10", PARSERS),
            Err(ParseConstraintError::Comparator(_))
        ));
    }

    #[test]
    fn parse_rejects_unknown_aggregators_and_metrics() {
        assert!(matches!(
            Constraint::parse("SUM(errors) < 10", PARSERS),
            Err(ParseConstraintError::Aggregator(_))
        ));
        assert!(matches!(
            Constraint::parse("MAX(cpu) < 10", PARSERS),
            Err(ParseConstraintError::Metric(_))
        ));
    }

    /// parse ∘ format is stable on the canonical rendering.
    #[test]
    fn display_round_trips_through_parse() {
        let constraint = Constraint::parse("MAX(latency)<30.00", PARSERS).unwrap();
        let canonical = constraint.to_string();
        assert_eq!(canonical, "MAX(latency) < 30.00");
        let reparsed = Constraint::parse(&canonical, PARSERS).unwrap();
        assert_eq!(reparsed.to_string(), canonical);
    }

    #[test]
    fn check_passes_when_the_comparison_holds() {
        let constraint =
            fixed_constraint(&[1.0, 5.0], Aggregator::Max, Comparator::LessThan, 10.0);
        assert!(constraint.check(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn check_reports_both_sides_on_failure() {
        let constraint =
            fixed_constraint(&[1.0, 25.0], Aggregator::Max, Comparator::LessThan, 10.0);
        let err = constraint.check(Duration::from_secs(1)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unsatisfied condition: 25.0000 < 10.0000"
        );
    }

    #[test]
    fn check_fails_on_nan() {
        let constraint =
            fixed_constraint(&[f64::NAN], Aggregator::Max, Comparator::LessThan, 10.0);
        assert!(constraint.check(Duration::from_secs(1)).is_err());
    }

    #[test]
    fn check_propagates_missing_data() {
        let constraint = Constraint::<u32, u32> {
            metric: Box::new(crate::metrics::LatencyMetric::new()),
            aggregator: Aggregator::Max,
            comparator: Comparator::LessThan,
            threshold: 10.0,
        };
        assert!(matches!(
            constraint.check(Duration::from_secs(1)),
            Err(ConstraintError::Metric(MetricError::NoDataPoints))
        ));
    }
}
