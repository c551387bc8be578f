//! # Load Growth Strategies
//!
//! Between tests the search controller asks a [`Growth`] for the next
//! load level, feeding it the previous level and whether its constraints
//! held. Returning 0 terminates the search.
//!
//! Three strategies exist, parsed from a leading sigil:
//!
//! - `+N` — linear: add `N` after each success, stop on the first failure.
//! - `%F` — percentage: grow by `F` percent after each success, stop on
//!   the first failure.
//! - `^N` — exponential: double until the first failure bounds the
//!   breakpoint, then binary-search the bracket down to width `N`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Raised when a growth specification cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseGrowthError {
    #[error("unknown growth {0:?}, want +int, %float or ^int")]
    UnknownGrowth(String),
    #[error("invalid growth amount {0:?}")]
    InvalidAmount(String),
}

/// Chooses the next load level from the previous test's outcome.
///
/// The exponential case carries the binary-search bracket between
/// calls, which is why growths are owned per controller run rather
/// than shared.
#[derive(Clone, Debug, PartialEq)]
pub enum Growth {
    /// Adds a fixed amount after each success.
    Linear { increase: u64 },
    /// Grows by a fixed percentage after each success.
    Percentage { increase: f64 },
    /// Doubles until bounded, then binary-searches to `precision`.
    Exponential {
        precision: u64,
        left: u64,
        right: u64,
        bound: bool,
    },
}

impl Growth {
    pub fn linear(increase: u64) -> Self {
        Growth::Linear { increase }
    }

    pub fn percentage(increase: f64) -> Self {
        Growth::Percentage { increase }
    }

    pub fn exponential(precision: u64) -> Self {
        Growth::Exponential {
            precision,
            left: 0,
            right: 0,
            bound: false,
        }
    }

    /// Next load after a test whose constraints all held.
    pub fn on_success(&mut self, test: u64) -> u64 {
        match self {
            Growth::Linear { increase } => test + *increase,
            Growth::Percentage { increase } => {
                ((100.0 + *increase) / 100.0 * test as f64) as u64
            }
            Growth::Exponential {
                precision,
                left,
                right,
                bound,
            } => {
                *left = test;
                if !*bound {
                    return test * 2;
                }
                if *right - *left <= *precision {
                    return 0;
                }
                (*left + *right) / 2
            }
        }
    }

    /// Next load after a test that violated a constraint.
    pub fn on_fail(&mut self, test: u64) -> u64 {
        match self {
            Growth::Linear { .. } | Growth::Percentage { .. } => 0,
            Growth::Exponential {
                precision,
                left,
                right,
                bound,
            } => {
                *right = test;
                *bound = true;
                if *right - *left <= *precision {
                    return 0;
                }
                (*left + *right) / 2
            }
        }
    }
}

impl fmt::Display for Growth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Growth::Linear { increase } => write!(f, "+{increase}"),
            Growth::Percentage { increase } => write!(f, "%{increase:.2}"),
            Growth::Exponential { precision, .. } => write!(f, "^{precision}"),
        }
    }
}

impl FromStr for Growth {
    type Err = ParseGrowthError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if let Some(amount) = value.strip_prefix('+') {
            Ok(Growth::linear(amount.parse().map_err(|_| {
                ParseGrowthError::InvalidAmount(value.to_string())
            })?))
        } else if let Some(amount) = value.strip_prefix('%') {
            Ok(Growth::percentage(amount.parse().map_err(|_| {
                ParseGrowthError::InvalidAmount(value.to_string())
            })?))
        } else if let Some(amount) = value.strip_prefix('^') {
            Ok(Growth::exponential(amount.parse().map_err(|_| {
                ParseGrowthError::InvalidAmount(value.to_string())
            })?))
        } else {
            Err(ParseGrowthError::UnknownGrowth(value.to_string()))
        }
    }
}
