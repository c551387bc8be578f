//! # Inter-Arrival Interval Generation
//!
//! Throughput-mode dispatch timing is shaped by a [`Distribution`]: each
//! test opens an [`IntervalGenerator`] at the target rate and draws the
//! delay before every dispatch from it.
//!
//! Two distributions are supported:
//!
//! - **Uniform**: a constant `1/rate` delay, producing an evenly spaced
//!   request stream.
//! - **Exponential**: memoryless `Exp(rate)` draws, producing a Poisson
//!   arrival process that better resembles organic client traffic.
//!
//! The generator is thread-confined to the scheduler's dispatch loop and
//! never shared.

use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::Exp;

/// The shape of the inter-arrival delay distribution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Distribution {
    /// Constant `1/rate` delay between dispatches.
    Uniform,
    /// Memoryless exponential delays with mean `1/rate` (Poisson arrivals).
    Exponential,
}

impl Distribution {
    /// Opens an interval generator producing delays for `rate` requests
    /// per second. `rate` must be positive; the scheduler treats a zero
    /// load level as a no-op and never opens a generator for it.
    pub fn generator(self, rate: f64) -> IntervalGenerator {
        debug_assert!(rate > 0.0, "interval generator requires a positive rate");
        match self {
            Distribution::Uniform => IntervalGenerator::Uniform {
                interval: Duration::from_secs_f64(1.0 / rate),
            },
            Distribution::Exponential => IntervalGenerator::Exponential {
                rate,
                rng: SmallRng::from_entropy(),
            },
        }
    }
}

impl std::fmt::Display for Distribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Distribution::Uniform => write!(f, "uniform"),
            Distribution::Exponential => write!(f, "exponential"),
        }
    }
}

/// An infinite, lazy sequence of inter-arrival delays.
#[derive(Debug)]
pub enum IntervalGenerator {
    Uniform {
        interval: Duration,
    },
    Exponential {
        rate: f64,
        rng: SmallRng,
    },
}

impl IntervalGenerator {
    /// Draws the delay to sleep before the next dispatch.
    pub fn next_interval(&mut self) -> Duration {
        match self {
            IntervalGenerator::Uniform { interval } => *interval,
            IntervalGenerator::Exponential { rate, rng } => {
                // Inverse-CDF sampling; Exp::new only fails for a
                // non-positive lambda, which Distribution::generator
                // excludes.
                match Exp::new(*rate) {
                    Ok(exp) => Duration::from_secs_f64(rng.sample(exp)),
                    Err(_) => Duration::ZERO,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_draws_are_constant() {
        let mut generator = Distribution::Uniform.generator(100.0);
        for _ in 0..10 {
            assert_eq!(generator.next_interval(), Duration::from_millis(10));
        }
    }

    /// The sample mean of Exp(rate) draws converges on 1/rate.
    #[test]
    fn exponential_draws_match_the_target_rate() {
        let mut generator = Distribution::Exponential.generator(1000.0);
        let samples = 20_000;
        let total: f64 = (0..samples)
            .map(|_| generator.next_interval().as_secs_f64())
            .sum();
        let mean = total / f64::from(samples);
        // 1/rate = 1ms; allow a generous tolerance for sampling noise.
        assert!((mean - 0.001).abs() < 0.0002, "mean interval {mean}");
    }

    #[test]
    fn exponential_draws_vary() {
        let mut generator = Distribution::Exponential.generator(100.0);
        let first = generator.next_interval();
        let distinct = (0..100).any(|_| generator.next_interval() != first);
        assert!(distinct);
    }
}
