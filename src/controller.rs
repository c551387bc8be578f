//! # Search Controller
//!
//! Loops the test runner across load levels. Two search strategies:
//!
//! - **Fixed**: run one test per user-supplied load value, in order,
//!   short-circuiting on the first runner error.
//! - **Constraints**: seed the load from `start`, then after each test
//!   evaluate every constraint over the test's time window and ask the
//!   growth for the next level; a level of 0 terminates the search.
//!
//! The tester's `before` hook gates the whole run and `after` is
//! invoked on every exit path, including runner failures.

use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::info;

use crate::constraint::Constraint;
use crate::input::RequestGenerator;
use crate::options::Options;
use crate::runner;
use crate::tester::Tester;

/// Runs one throughput test per load value in `options.tests`.
pub async fn load_test_throughput_fixed<T: Tester>(
    tester: &mut T,
    generator: &RequestGenerator<T::Request>,
    options: &mut Options<T::Request, T::Response>,
) -> Result<()> {
    tester.before(options).await?;
    let result = throughput_fixed(tester, generator, options).await;
    tester.after(options).await;
    result
}

async fn throughput_fixed<T: Tester>(
    tester: &mut T,
    generator: &RequestGenerator<T::Request>,
    options: &mut Options<T::Request, T::Response>,
) -> Result<()> {
    for qps in options.tests.clone() {
        runner::run_throughput_test(tester, generator, qps, options).await?;
    }
    Ok(())
}

/// Searches for the throughput breakpoint under `options.constraints`,
/// growing the load with `options.growth`.
pub async fn load_test_throughput_constraints<T: Tester>(
    tester: &mut T,
    generator: &RequestGenerator<T::Request>,
    options: &mut Options<T::Request, T::Response>,
) -> Result<()> {
    tester.before(options).await?;
    let result = throughput_constraints(tester, generator, options).await;
    tester.after(options).await;
    result
}

async fn throughput_constraints<T: Tester>(
    tester: &mut T,
    generator: &RequestGenerator<T::Request>,
    options: &mut Options<T::Request, T::Response>,
) -> Result<()> {
    let mut growth = options.growth.clone();
    let mut qps = options.start;
    while qps > 0 {
        let started = Instant::now();
        runner::run_throughput_test(tester, generator, qps, options).await?;
        let window = started.elapsed();
        qps = if check_constraints(&options.constraints, window) {
            growth.on_success(qps)
        } else {
            growth.on_fail(qps)
        };
    }
    Ok(())
}

/// Runs one concurrency test per load value in `options.tests`.
pub async fn load_test_concurrency_fixed<T: Tester>(
    tester: &mut T,
    generator: &RequestGenerator<T::Request>,
    options: &mut Options<T::Request, T::Response>,
) -> Result<()> {
    tester.before(options).await?;
    let result = concurrency_fixed(tester, generator, options).await;
    tester.after(options).await;
    result
}

async fn concurrency_fixed<T: Tester>(
    tester: &mut T,
    generator: &RequestGenerator<T::Request>,
    options: &mut Options<T::Request, T::Response>,
) -> Result<()> {
    for workers in options.tests.clone() {
        runner::run_concurrency_test(tester, generator, workers, options).await?;
    }
    Ok(())
}

/// Searches for the concurrency breakpoint under `options.constraints`,
/// growing the load with `options.growth`.
pub async fn load_test_concurrency_constraints<T: Tester>(
    tester: &mut T,
    generator: &RequestGenerator<T::Request>,
    options: &mut Options<T::Request, T::Response>,
) -> Result<()> {
    tester.before(options).await?;
    let result = concurrency_constraints(tester, generator, options).await;
    tester.after(options).await;
    result
}

async fn concurrency_constraints<T: Tester>(
    tester: &mut T,
    generator: &RequestGenerator<T::Request>,
    options: &mut Options<T::Request, T::Response>,
) -> Result<()> {
    let mut growth = options.growth.clone();
    let mut workers = options.start;
    while workers > 0 {
        let started = Instant::now();
        runner::run_concurrency_test(tester, generator, workers, options).await?;
        let window = started.elapsed();
        workers = if check_constraints(&options.constraints, window) {
            growth.on_success(workers)
        } else {
            growth.on_fail(workers)
        };
    }
    Ok(())
}

/// ANDs all constraints over the last test's window, short-circuiting
/// on the first failure. Violations are expected outcomes of the
/// search, so they log under the `controller` target rather than as
/// errors.
fn check_constraints<R, S>(constraints: &[Constraint<R, S>], window: Duration) -> bool {
    for constraint in constraints {
        if let Err(err) = constraint.check(window) {
            info!(target: "controller", constraint = %constraint, %err, "constraint not satisfied");
            return false;
        }
    }
    true
}
