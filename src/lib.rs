//! # loadbench
//!
//! A multi-protocol load generator with adaptive breakpoint search.
//! The library drives a configurable offered load against a single
//! endpoint in two disciplines — rate-paced throughput and bounded
//! concurrency — and searches across load levels either over a fixed
//! list or by growing the load until a user constraint fails.
//!
//! Protocols plug in behind the [`tester::Tester`] seam; everything
//! else (scheduling, event fan-out, metrics, constraints, growth) is
//! protocol-agnostic.

pub mod cli;
pub mod constraint;
pub mod controller;
pub mod events;
pub mod growth;
pub mod histogram;
pub mod input;
pub mod intervals;
pub mod metrics;
pub mod options;
pub mod protocols;
pub mod recorders;
pub mod runner;
pub mod scheduler;
pub mod semaphore;
pub mod tester;
pub mod utils;

pub use constraint::{Comparator, Constraint};
pub use events::{Event, Recorder};
pub use growth::Growth;
pub use intervals::Distribution;
pub use metrics::{Aggregator, DataPoint, Metric};
pub use options::Options;
pub use tester::{RequestError, RequestExecutor, Tester};

/// The current version of loadbench.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values, mirrored by the CLI flag defaults.
pub mod defaults {
    use std::time::Duration;

    /// Default single-test duration.
    pub const DURATION: Duration = Duration::from_secs(60);

    /// Default per-request timeout.
    pub const TIMEOUT: Duration = Duration::from_secs(1);

    /// Default event-bus and request-stream capacity.
    pub const BUFFER: usize = 2048;

    /// Default latency scaling unit.
    pub const UNIT: Duration = Duration::from_millis(1);
}
