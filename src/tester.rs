//! # The Tester Seam
//!
//! Protocol implementations plug into the core through exactly two
//! contracts: a [`Tester`] providing setup/teardown hooks around a
//! controller run and each test, and a [`RequestExecutor`] that sends
//! one request and blocks until it has an outcome.
//!
//! The core treats requests and responses as opaque values; each tester
//! names its own `Request`/`Response` types and everything downstream
//! (events, recorders, options) is generic over them.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::events::Nanos;
use crate::options::Options;

/// A throughput-mode load level, in queries per second.
pub type Qps = u64;

/// A concurrency-mode load level, in simultaneous workers.
pub type Workers = u64;

/// An error produced while executing a single request.
///
/// Per-request errors are data, not failures of the core: they are
/// counted, logged and fed to metrics, and never abort a test.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request timed out")]
    Timeout,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("{0}")]
    Other(String),
}

/// Sends a single request to the endpoint under test.
///
/// `timestamp` is the dispatch time in nanoseconds from the test epoch.
/// The executor is expected to honour the test timeout internally; the
/// core never cancels an executor mid-flight.
#[async_trait]
pub trait RequestExecutor<R, S>: Send + Sync {
    async fn execute(&self, timestamp: Nanos, request: R) -> Result<S, RequestError>;
}

/// A shared executor handle, freshly obtained from the tester per test.
pub type Executor<R, S> = Arc<dyn RequestExecutor<R, S>>;

/// Setup and teardown hooks for a specific endpoint protocol.
///
/// `before`/`after` bracket a whole controller run; `before_each` /
/// `after_each` bracket every individual test. A failure in `before`,
/// `before_each` or `request_executor` aborts the controller, but the
/// matching teardown hooks still run where they were reached.
#[async_trait]
pub trait Tester: Send {
    type Request: Clone + fmt::Debug + Send + Sync + 'static;
    type Response: fmt::Debug + Send + Sync + 'static;

    /// Called once, before any tests.
    async fn before(
        &mut self,
        _options: &mut Options<Self::Request, Self::Response>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once, after all tests, even when one of them failed.
    async fn after(&mut self, _options: &mut Options<Self::Request, Self::Response>) {}

    /// Called before every test.
    async fn before_each(
        &mut self,
        _options: &mut Options<Self::Request, Self::Response>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after every test, even when the test failed.
    async fn after_each(&mut self, _options: &mut Options<Self::Request, Self::Response>) {}

    /// Returns a fresh executor for the next test.
    async fn request_executor(
        &mut self,
        options: &Options<Self::Request, Self::Response>,
    ) -> anyhow::Result<Executor<Self::Request, Self::Response>>;
}
